use axum::{routing::post, Router};

pub mod reports;
pub mod system;

pub fn router() -> Router {
    Router::new()
        .route(
            "/calculate-energy-consumption",
            post(reports::calculate_energy_consumption),
        )
        .route(
            "/calculate-carbon-footprint",
            post(reports::calculate_carbon_footprint),
        )
}
