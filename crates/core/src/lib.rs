pub mod audit;
pub mod error;
pub mod field_value;
pub mod ids;
pub mod opportunity;
pub mod role;
pub mod stage;
pub mod time;
pub mod user;

pub use audit::{AuditAction, AuditEntry};
pub use error::CoreError;
pub use field_value::FieldValue;
pub use ids::*;
pub use opportunity::{Opportunity, PocRole, RecordSource};
pub use role::Role;
pub use stage::{Stage, WonStatus};
pub use user::User;
