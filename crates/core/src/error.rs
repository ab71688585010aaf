use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("unknown stage: {0}")]
    UnknownStage(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}
