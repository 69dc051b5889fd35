//! JSON envelope returned by every route.

use crate::error::{ChatError, SettingsError, StoreError};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

pub type Reply<T> = (StatusCode, Json<ApiResponse<T>>);

pub fn ok<T>(data: T) -> Reply<T> {
    (StatusCode::OK, Json(ApiResponse::ok(data)))
}

pub fn fail<T>(status: StatusCode, msg: impl Into<String>) -> Reply<T> {
    (status, Json(ApiResponse::err(msg)))
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Conflict(_) => StatusCode::CONFLICT,
        StoreError::Backend(_) | StoreError::Decode(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Visitors get a fixed sentence for backend and configuration failures.
pub fn chat_error<T>(err: &ChatError) -> Reply<T> {
    let status = match err {
        ChatError::AgentNotFound(_) | ChatError::AgentInactive(_) => StatusCode::NOT_FOUND,
        ChatError::EmptyInput => StatusCode::BAD_REQUEST,
        ChatError::PaymentPending | ChatError::NoPaymentRequired | ChatError::Busy => {
            StatusCode::CONFLICT
        }
        ChatError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
        ChatError::Store(e) => store_status(e),
    };
    match err {
        ChatError::AgentInactive(slug) => fail(status, format!("agent '{slug}' not found")),
        ChatError::Configuration(_) | ChatError::Store(_) => {
            fail(status, "Sorry, something went wrong. Please try again.")
        }
        other => fail(status, other.to_string()),
    }
}

pub fn settings_error<T>(err: &SettingsError) -> Reply<T> {
    let status = match err {
        SettingsError::NotOwner => StatusCode::FORBIDDEN,
        SettingsError::Validation(_) => StatusCode::BAD_REQUEST,
        SettingsError::Store(e) => store_status(e),
    };
    fail(status, err.to_string())
}
