use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::agents::AgentError;

/// Error returned by handlers, rendered as `{"error": message}`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Maps a repository error string; "not found" becomes 404
    pub fn from_repository(message: String) -> Self {
        let lowered = message.to_lowercase();
        if lowered.contains("not found") {
            Self::not_found(message)
        } else if lowered.contains("duplicate") || lowered.contains("already exists") {
            Self::conflict(message)
        } else {
            Self::internal_server_error(message)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, message = %self.message, "Request failed");
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::UnsupportedTask { .. } | AgentError::InvalidInput(_) => {
                Self::bad_request(err.to_string())
            }
            AgentError::NotFound(_) => Self::not_found(err.to_string()),
            other => Self::internal_server_error(other.to_string()),
        }
    }
}

impl From<String> for ApiError {
    fn from(message: String) -> Self {
        Self::from_repository(message)
    }
}

impl From<&str> for ApiError {
    fn from(message: &str) -> Self {
        Self::from_repository(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::AgentRole;

    #[test]
    fn agent_errors_map_to_client_and_server_statuses() {
        let unsupported = ApiError::from(AgentError::UnsupportedTask {
            role: AgentRole::Qa,
            task_type: "deploy".to_string(),
        });
        assert_eq!(unsupported.status, StatusCode::BAD_REQUEST);

        let missing = ApiError::from(AgentError::NotFound("dev-009".to_string()));
        assert_eq!(missing.status, StatusCode::NOT_FOUND);

        let failed = ApiError::from(AgentError::PhaseFailed {
            phase: "planning".to_string(),
            reason: "no output".to_string(),
        });
        assert_eq!(failed.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn repository_strings_are_classified() {
        assert_eq!(
            ApiError::from("Project not found".to_string()).status,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from("duplicate key value".to_string()).status,
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from("connection reset").status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
