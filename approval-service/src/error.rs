use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::{error, info, warn};
use thiserror::Error;

use approval_shared::{error::StoreError, models::ErrorResponse};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Profile incomplete: {0}")]
    ProfileIncomplete(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Remote failure: {0}")]
    RemoteFailure(String),
}

impl WorkflowError {
    /// The caller acted on stale state and must re-fetch before doing anything else
    pub fn requires_refresh(&self) -> bool {
        matches!(
            self,
            WorkflowError::InvalidTransition(_)
                | WorkflowError::NotFound(_)
                | WorkflowError::Conflict(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            WorkflowError::ProfileIncomplete(_) => StatusCode::UNPROCESSABLE_ENTITY,
            WorkflowError::InvalidTransition(_) | WorkflowError::Conflict(_) => {
                StatusCode::CONFLICT
            }
            WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
            WorkflowError::Forbidden(_) => StatusCode::FORBIDDEN,
            WorkflowError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            WorkflowError::RemoteFailure(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => WorkflowError::NotFound(msg),
            StoreError::Conflict(msg) => WorkflowError::Conflict(msg),
            StoreError::ValidationError(msg) => WorkflowError::InvalidInput(msg),
            StoreError::AuthError(msg) => WorkflowError::Forbidden(msg),
            StoreError::InternalError(msg) => WorkflowError::RemoteFailure(msg),
        }
    }
}

impl IntoResponse for WorkflowError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            WorkflowError::RemoteFailure(msg) => {
                error!("Remote failure: {}", msg);
                // Store internals stay in the logs
                "The request could not be completed, please try again".to_string()
            }
            WorkflowError::Forbidden(msg) => {
                warn!("Forbidden: {}", msg);
                msg.clone()
            }
            WorkflowError::ProfileIncomplete(msg)
            | WorkflowError::InvalidTransition(msg)
            | WorkflowError::NotFound(msg)
            | WorkflowError::Conflict(msg)
            | WorkflowError::InvalidInput(msg) => msg.clone(),
        };

        info!("Returning error response: status={}, message={}", status, message);
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
