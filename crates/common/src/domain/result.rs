use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Unknown device class: {0}")]
    UnknownDeviceClass(String),

    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    #[error("Batch commit failed: {0}")]
    CommitFailed(String),

    #[error("Store error: {0}")]
    StoreError(#[from] anyhow::Error),

    #[error("Bus error: {0}")]
    BusError(String),
}
