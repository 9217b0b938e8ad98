use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
pub struct ApiResponse<T>
where
    T: Serialize,
{
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    /// Page the client should move to next, when the flow continues elsewhere.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
}

#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
    pub details: Option<Value>,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub success: bool,
    pub error: ApiErrorBody,
}

pub fn success<T>(data: T, message: impl Into<String>) -> Response
where
    T: Serialize,
{
    respond(StatusCode::OK, Some(data), message.into(), None)
}

pub fn success_then<T>(data: T, message: impl Into<String>, redirect_to: impl Into<String>) -> Response
where
    T: Serialize,
{
    respond(StatusCode::OK, Some(data), message.into(), Some(redirect_to.into()))
}

pub fn created_then<T>(data: T, message: impl Into<String>, redirect_to: impl Into<String>) -> Response
where
    T: Serialize,
{
    respond(
        StatusCode::CREATED,
        Some(data),
        message.into(),
        Some(redirect_to.into()),
    )
}

pub fn empty_success_then(message: impl Into<String>, redirect_to: impl Into<String>) -> Response {
    respond::<()>(StatusCode::OK, None, message.into(), Some(redirect_to.into()))
}

fn respond<T>(
    status: StatusCode,
    data: Option<T>,
    message: String,
    redirect_to: Option<String>,
) -> Response
where
    T: Serialize,
{
    let body = ApiResponse {
        success: true,
        data,
        message: Some(message),
        redirect_to,
    };
    (status, Json(body)).into_response()
}

pub fn error(
    code: &str,
    message: impl Into<String>,
    details: Option<Value>,
    status: StatusCode,
) -> Response {
    let body = ApiErrorResponse {
        success: false,
        error: ApiErrorBody {
            code: code.to_string(),
            message: message.into(),
            details,
        },
    };

    (status, Json(body)).into_response()
}
