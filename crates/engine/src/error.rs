use dealtrack_core::CoreError;
use dealtrack_core::stage::Stage;
use dealtrack_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("opportunity not found: {0}")]
    OpportunityNotFound(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("transition denied: {from} -> {to}")]
    TransitionDenied { from: Stage, to: Stage },

    #[error("won status can only be set at Complete (stage is {0})")]
    WonStatusOutsideComplete(Stage),
}
