use dealtrack_core::{
    audit::AuditEntry,
    ids::{OpportunityId, UserId},
    opportunity::Opportunity,
    user::User,
};

use crate::error::StorageError;

/// Persistence port for the tracker.
///
/// The collection-level `replace_opportunities` exists because the apply
/// phase of an import is a single read-modify-write over the whole
/// opportunity set; callers wrap it in a transaction together with the
/// audit appends.
pub trait Storage {
    fn load_opportunities(&self) -> Result<Vec<Opportunity>, StorageError>;

    fn get_opportunity(
        &self,
        id: OpportunityId,
    ) -> Result<Option<Opportunity>, StorageError>;

    fn upsert_opportunity(&mut self, opp: &Opportunity) -> Result<(), StorageError>;

    /// Replace the whole collection atomically.
    fn replace_opportunities(&mut self, opps: &[Opportunity]) -> Result<(), StorageError>;

    fn opportunity_count(&self) -> Result<u64, StorageError>;

    /// Append one entry to the audit log. The log is append-only; there
    /// is deliberately no update or delete.
    fn append_audit(&mut self, entry: &AuditEntry) -> Result<(), StorageError>;

    /// Audit entries for one opportunity, in append order.
    fn audit_for(&self, id: OpportunityId) -> Result<Vec<AuditEntry>, StorageError>;

    fn audit_count(&self) -> Result<u64, StorageError>;

    fn put_user(&mut self, user: &User) -> Result<(), StorageError>;

    fn get_user(&self, id: UserId) -> Result<Option<User>, StorageError>;

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError>;

    fn list_users(&self) -> Result<Vec<User>, StorageError>;
}
