use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::update_item::UpdateItemError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

// Helper function to map general DynamoDB errors
pub fn map_dynamo_error<E: std::fmt::Display>(operation: &str, err: E) -> StoreError {
    StoreError::InternalError(format!("DynamoDB {} error: {}", operation, err))
}

// A failed `attribute_exists(id)` condition means the item is gone
pub fn map_update_dynamo_error(err: SdkError<UpdateItemError>, id: &str) -> StoreError {
    match &err {
        SdkError::ServiceError(service_err)
            if service_err.err().is_conditional_check_failed_exception() =>
        {
            StoreError::NotFound(format!("Resource not found with ID: {}", id))
        }
        _ => StoreError::InternalError(format!("DynamoDB update_item error: {}", err)),
    }
}

impl From<serde_dynamo::Error> for StoreError {
    fn from(err: serde_dynamo::Error) -> Self {
        StoreError::InternalError(format!("DynamoDB serialization error: {}", err))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::InternalError(format!("JSON serialization error: {}", err))
    }
}
