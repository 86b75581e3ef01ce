use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

/// 错误类型枚举，用于确定HTTP状态码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// 客户端错误 - 400 Bad Request
    BadRequest,
    /// 服务器内部错误 - 500 Internal Server Error
    InternalServerError,
    /// 服务不可用 - 503 Service Unavailable
    ServiceUnavailable,
}

impl ErrorType {
    /// 获取对应的HTTP状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorType::BadRequest => StatusCode::BAD_REQUEST,
            ErrorType::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorType::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// 错误响应体：`error` 为面向调用方的消息，`details` 为可选的诊断信息
pub fn create_error_json(error_type: ErrorType, message: &str, details: Option<String>) -> Value {
    json!({
        "error": message,
        "type": format!("{:?}", error_type),
        "status": error_type.status_code().as_u16(),
        "details": details,
    })
}

/// 创建带有正确HTTP状态码的错误响应
pub fn create_error_response(
    error_type: ErrorType,
    message: &str,
    details: Option<String>,
) -> Response {
    (
        error_type.status_code(),
        Json(create_error_json(error_type, message, details)),
    )
        .into_response()
}
