use serde::Serialize;

use expenseflow_core::errors::InterfaceError;

/// The envelope existing clients unwrap: `success` plus either `data` or a
/// user-safe `message`. Internal detail stays in the logs, keyed by the
/// correlation id.
#[derive(Clone, Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), message: None }
    }

    pub fn error(error: &InterfaceError) -> Self {
        Self { success: false, data: None, message: Some(error.user_message().to_owned()) }
    }
}
