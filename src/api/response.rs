use serde::Serialize;
use axum::Json;
use axum::http::StatusCode;
use chrono::{SecondsFormat, Utc};

/// `{success, ...payload}` on success, `{success: false, error}` on failure.
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(flatten)]
    pub payload: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn success<T: Serialize>(payload: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (
        StatusCode::OK,
        Json(ApiResponse {
            success: true,
            payload: Some(payload),
            error: None,
            timestamp: None,
        }),
    )
}

/// Liveness-style success that also carries a timestamp.
pub fn success_stamped<T: Serialize>(payload: T) -> (StatusCode, Json<ApiResponse<T>>) {
    let (status, Json(mut body)) = success(payload);
    body.timestamp = Some(now_iso());
    (status, Json(body))
}

pub fn error(status: StatusCode, message: String) -> (StatusCode, Json<ApiResponse<()>>) {
    (
        status,
        Json(ApiResponse {
            success: false,
            payload: None,
            error: Some(message),
            timestamp: None,
        }),
    )
}
