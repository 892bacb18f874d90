//! HTTP helpers for the Lambda handlers.

use lambda_http::{Body, Response};
use serde::Serialize;

use crate::Error;

/// Standard API response envelope. Every endpoint, success or failure,
/// answers with this shape.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Create a JSON response with the given status code and data.
pub fn json_response<T: Serialize>(
    status: u16,
    data: &T,
) -> Result<Response<Body>, lambda_http::Error> {
    Ok(Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .header("access-control-allow-origin", "*")
        .body(Body::from(serde_json::to_string(data)?))?)
}

/// Create an error response with the given status code and message.
pub fn error_response(
    status: u16,
    message: impl Into<String>,
) -> Result<Response<Body>, lambda_http::Error> {
    json_response(status, &ApiResponse::<()>::error(message))
}

/// Map a pipeline error onto its status code and user-facing message.
pub fn from_error(err: &Error) -> Result<Response<Body>, lambda_http::Error> {
    error_response(err.status_code(), user_message(err))
}

/// Client errors carry their reason verbatim; server errors stay generic.
pub fn user_message(err: &Error) -> String {
    match err {
        Error::Validation(reason) | Error::NotFound(reason) => reason.clone(),
        Error::ExternalService { .. } => format!("检测失败: {}", err),
        _ => "服务内部错误，请稍后重试".to_string(),
    }
}
