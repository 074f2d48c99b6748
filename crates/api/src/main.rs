use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = efn_core::Config::from_env();
    efn_observability::init(&config.log);

    let services = Arc::new(efn_api::app::ApiServices::from_config(&config).await?);
    let app = efn_api::app::build_app(services);

    let listener = tokio::net::TcpListener::bind(&config.api.address).await?;
    tracing::info!(address = %listener.local_addr()?, "starting api server");

    axum::serve(listener, app).await?;
    Ok(())
}
