use axum::http::StatusCode;
use axum::response::IntoResponse;

use efn_core::ErrorInfo;

/// JSON error response `{code, message, status}` with the default code for
/// the status (its reason phrase).
pub fn json_error(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    let info = ErrorInfo::from_status(status.as_u16(), capitalize_first(message.into()));
    (status, axum::Json(info)).into_response()
}

/// Same shape with an explicit code string (e.g. `OUT_OF_RANGE`).
pub fn json_error_with_code(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    let info = ErrorInfo::new(status.as_u16(), code, capitalize_first(message.into()));
    (status, axum::Json(info)).into_response()
}

fn capitalize_first(s: String) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => s,
    }
}
