pub mod error;
pub mod permissions;
pub mod reconcile;
pub mod transform;

pub use error::EngineError;
pub use permissions::{
    StageTarget, available_stages, can_change_stage, can_edit, can_import, can_manage_users,
};
pub use reconcile::{
    ApplyMode, FieldConflict, MATCH_PRIORITY, MatchKey, ReconcileReport, RecordConflict,
    apply_plan, merge_record, reconcile,
};
pub use transform::{ExternalRecord, IncomingRecord, transform};

use tracing::{debug, info};

use dealtrack_core::{
    audit::{AuditAction, AuditEntry},
    field_value::FieldValue,
    ids::{OpportunityId, UserId},
    opportunity::{Opportunity, PocRole},
    role::Role,
    stage::{Stage, WonStatus},
    time::now_ms,
    user::User,
};
use dealtrack_storage::{SqliteStorage, Storage, StorageError};

/// One typed field edit. Each applied edit that actually changes the
/// value appends exactly one audit entry.
#[derive(Debug, Clone)]
pub enum OpportunityEdit {
    Name(String),
    Client(String),
    Industry(String),
    Specialist(String),
    ClientAsk(String),
    Needs(String),
    WhyLaunch(String),
    Comments(String),
    AopValue(Option<f64>),
    EenuValue(Option<f64>),
    ProposalDueDate(Option<i64>),
    ExpectedCloseDate(Option<i64>),
}

fn swap_text(slot: &mut String, new: String) -> Option<(FieldValue, FieldValue)> {
    if *slot == new {
        return None;
    }
    let old = FieldValue::Text(std::mem::replace(slot, new));
    Some((old, FieldValue::Text(slot.clone())))
}

fn swap_number(slot: &mut Option<f64>, new: Option<f64>) -> Option<(FieldValue, FieldValue)> {
    if *slot == new {
        return None;
    }
    let old = FieldValue::from_opt_number(*slot);
    *slot = new;
    Some((old, FieldValue::from_opt_number(new)))
}

fn swap_date(slot: &mut Option<i64>, new: Option<i64>) -> Option<(FieldValue, FieldValue)> {
    if *slot == new {
        return None;
    }
    let to_value = |v: Option<i64>| v.map_or(FieldValue::Null, FieldValue::Timestamp);
    let old = to_value(*slot);
    *slot = new;
    Some((old, to_value(new)))
}

impl OpportunityEdit {
    fn field(&self) -> &'static str {
        match self {
            Self::Name(_) => "name",
            Self::Client(_) => "client",
            Self::Industry(_) => "industry",
            Self::Specialist(_) => "specialist",
            Self::ClientAsk(_) => "client_ask",
            Self::Needs(_) => "needs",
            Self::WhyLaunch(_) => "why_launch",
            Self::Comments(_) => "comments",
            Self::AopValue(_) => "aop_value",
            Self::EenuValue(_) => "eenu_value",
            Self::ProposalDueDate(_) => "proposal_due_date",
            Self::ExpectedCloseDate(_) => "expected_close_date",
        }
    }

    fn action(&self) -> AuditAction {
        match self {
            Self::Comments(_) => AuditAction::CommentUpdate,
            _ => AuditAction::Edit,
        }
    }

    /// Apply to the record; `None` means the value did not change and no
    /// audit entry is owed.
    fn apply(self, opp: &mut Opportunity) -> Option<(FieldValue, FieldValue)> {
        match self {
            Self::Name(v) => swap_text(&mut opp.name, v),
            Self::Client(v) => swap_text(&mut opp.client, v),
            Self::Industry(v) => swap_text(&mut opp.industry, v),
            Self::Specialist(v) => swap_text(&mut opp.specialist, v),
            Self::ClientAsk(v) => swap_text(&mut opp.client_ask, v),
            Self::Needs(v) => swap_text(&mut opp.needs, v),
            Self::WhyLaunch(v) => swap_text(&mut opp.why_launch, v),
            Self::Comments(v) => swap_text(&mut opp.comments, v),
            Self::AopValue(v) => swap_number(&mut opp.aop_value, v),
            Self::EenuValue(v) => swap_number(&mut opp.eenu_value, v),
            Self::ProposalDueDate(v) => swap_date(&mut opp.proposal_due_date, v),
            Self::ExpectedCloseDate(v) => swap_date(&mut opp.expected_close_date, v),
        }
    }
}

/// Counts from one applied import, for reporting to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub conflicts: usize,
    pub orphaned: usize,
}

impl From<&ReconcileReport> for ImportSummary {
    fn from(report: &ReconcileReport) -> Self {
        Self {
            created: report.new_records.len(),
            updated: report.updated.len(),
            unchanged: report.unchanged.len(),
            conflicts: report.conflicts.len(),
            orphaned: report.orphaned.len(),
        }
    }
}

/// The command surface of the tracker.
///
/// Every mutation is permission-checked against the acting user, applied
/// and audited inside one transaction, and stamps `last_modified` so the
/// next import knows the record carries human edits.
pub struct Tracker {
    storage: SqliteStorage,
}

impl Tracker {
    pub fn new(storage: SqliteStorage) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut SqliteStorage {
        &mut self.storage
    }

    fn exec_batch(&self, sql: &str) -> Result<(), EngineError> {
        self.storage
            .conn()
            .execute_batch(sql)
            .map_err(|e| EngineError::Storage(StorageError::Sqlite(e)))
    }

    fn require_user(&self, user_id: UserId) -> Result<User, EngineError> {
        self.storage
            .get_user(user_id)?
            .ok_or_else(|| EngineError::UserNotFound(user_id.to_string()))
    }

    fn require_opportunity(&self, id: OpportunityId) -> Result<Opportunity, EngineError> {
        self.storage
            .get_opportunity(id)?
            .ok_or_else(|| EngineError::OpportunityNotFound(id.to_string()))
    }

    /// Write the record and its audit entries as one transaction.
    fn commit_change(
        &mut self,
        opp: &Opportunity,
        entries: &[AuditEntry],
    ) -> Result<(), EngineError> {
        self.exec_batch("BEGIN IMMEDIATE")?;
        let result = (|| -> Result<(), EngineError> {
            self.storage.upsert_opportunity(opp)?;
            for entry in entries {
                self.storage.append_audit(entry)?;
            }
            Ok(())
        })();
        match result {
            Ok(()) => {
                self.exec_batch("COMMIT")?;
                Ok(())
            }
            Err(e) => {
                let _ = self.exec_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    // ========================================================================
    // Opportunity commands
    // ========================================================================

    /// Create a blank app-sourced record at stage `New`, owned by
    /// `specialist`.
    pub fn create_opportunity(
        &mut self,
        user_id: UserId,
        name: &str,
        client: &str,
        specialist: &str,
    ) -> Result<OpportunityId, EngineError> {
        let user = self.require_user(user_id)?;
        if !user.can_act() {
            return Err(EngineError::NotAuthorized(format!(
                "{} may not create records",
                user.name
            )));
        }

        let now = now_ms();
        let mut opp = Opportunity::new(name, client, specialist, now);
        opp.last_modified = Some(now);
        let entry = AuditEntry::new(opp.id, now, &user.name, AuditAction::Create);

        self.commit_change(&opp, std::slice::from_ref(&entry))?;
        debug!(id = %opp.id, name, "created opportunity");
        Ok(opp.id)
    }

    /// Apply a batch of field edits. Edits that change nothing are
    /// silently dropped; each effective edit appends one audit entry.
    pub fn apply_edits(
        &mut self,
        user_id: UserId,
        opp_id: OpportunityId,
        edits: Vec<OpportunityEdit>,
    ) -> Result<(), EngineError> {
        let user = self.require_user(user_id)?;
        let mut opp = self.require_opportunity(opp_id)?;
        if !permissions::can_edit(&user, &opp) {
            return Err(EngineError::NotAuthorized(format!(
                "{} may not edit {} at stage {}",
                user.name, opp.name, opp.stage
            )));
        }

        let now = now_ms();
        let mut entries = Vec::new();
        for edit in edits {
            let field = edit.field();
            let action = edit.action();
            if let Some((old, new)) = edit.apply(&mut opp) {
                entries.push(
                    AuditEntry::new(opp.id, now, &user.name, action)
                        .with_field(field, Some(old), Some(new)),
                );
            }
        }
        if entries.is_empty() {
            return Ok(());
        }

        opp.updated_date = now;
        opp.last_modified = Some(now);
        self.commit_change(&opp, &entries)
    }

    /// Move a record along the stage graph.
    ///
    /// A target that is not a graph edge is `TransitionDenied` for every
    /// role; an edge the role may not take is `NotAuthorized`.
    pub fn change_stage(
        &mut self,
        user_id: UserId,
        opp_id: OpportunityId,
        target: Stage,
    ) -> Result<(), EngineError> {
        let user = self.require_user(user_id)?;
        let mut opp = self.require_opportunity(opp_id)?;

        if !opp.stage.transitions().contains(&target) {
            return Err(EngineError::TransitionDenied {
                from: opp.stage,
                to: target,
            });
        }
        if !permissions::can_change_stage(&user, &opp, StageTarget::Stage(target)) {
            return Err(EngineError::NotAuthorized(format!(
                "{} may not move {} from {} to {}",
                user.name, opp.name, opp.stage, target
            )));
        }

        let now = now_ms();
        let entry = AuditEntry::new(opp.id, now, &user.name, AuditAction::StageChange).with_field(
            "stage",
            Some(FieldValue::Text(opp.stage.as_str().to_string())),
            Some(FieldValue::Text(target.as_str().to_string())),
        );
        debug!(id = %opp.id, from = %opp.stage, to = %target, "stage change");
        opp.stage = target;
        opp.updated_date = now;
        opp.last_modified = Some(now);

        self.commit_change(&opp, std::slice::from_ref(&entry))
    }

    /// Stage targets `user` may move this record to right now.
    pub fn stage_options(
        &self,
        user_id: UserId,
        opp_id: OpportunityId,
    ) -> Result<Vec<Stage>, EngineError> {
        let user = self.require_user(user_id)?;
        let opp = self.require_opportunity(opp_id)?;
        Ok(permissions::available_stages(&user, &opp))
    }

    /// Assign (or clear, with `None`) the person for one POC role.
    pub fn assign_resource(
        &mut self,
        user_id: UserId,
        opp_id: OpportunityId,
        role: PocRole,
        person: Option<&str>,
    ) -> Result<(), EngineError> {
        let user = self.require_user(user_id)?;
        let mut opp = self.require_opportunity(opp_id)?;
        if !permissions::can_edit(&user, &opp) {
            return Err(EngineError::NotAuthorized(format!(
                "{} may not assign on {}",
                user.name, opp.name
            )));
        }

        let to_value = |v: Option<&String>| match v {
            Some(name) => FieldValue::Text(name.clone()),
            None => FieldValue::Null,
        };
        let old = to_value(opp.assigned_resources.get(&role));
        match person {
            Some(name) => opp.assigned_resources.insert(role, name.to_string()),
            None => opp.assigned_resources.remove(&role),
        };
        let new = to_value(opp.assigned_resources.get(&role));
        if old == new {
            return Ok(());
        }

        let now = now_ms();
        let field = format!("poc_{}", role.as_str().to_lowercase());
        let entry = AuditEntry::new(opp.id, now, &user.name, AuditAction::Assignment)
            .with_field(&field, Some(old), Some(new));
        opp.updated_date = now;
        opp.last_modified = Some(now);

        self.commit_change(&opp, std::slice::from_ref(&entry))
    }

    /// Record the outcome of a finished deal. Only legal at `Complete`.
    pub fn set_won_status(
        &mut self,
        user_id: UserId,
        opp_id: OpportunityId,
        status: WonStatus,
    ) -> Result<(), EngineError> {
        let user = self.require_user(user_id)?;
        let mut opp = self.require_opportunity(opp_id)?;
        if !permissions::can_edit(&user, &opp) {
            return Err(EngineError::NotAuthorized(format!(
                "{} may not edit {}",
                user.name, opp.name
            )));
        }
        if opp.stage != Stage::Complete {
            return Err(EngineError::WonStatusOutsideComplete(opp.stage));
        }
        if opp.won_status == status {
            return Ok(());
        }

        let now = now_ms();
        let entry = AuditEntry::new(opp.id, now, &user.name, AuditAction::Edit).with_field(
            "won_status",
            Some(FieldValue::Text(opp.won_status.as_str().to_string())),
            Some(FieldValue::Text(status.as_str().to_string())),
        );
        opp.won_status = status;
        opp.updated_date = now;
        opp.last_modified = Some(now);

        self.commit_change(&opp, std::slice::from_ref(&entry))
    }

    // ========================================================================
    // Import pipeline
    // ========================================================================

    /// Classify a batch against the current local set. Read-only; nothing
    /// is persisted until the report is applied.
    pub fn plan_import(
        &self,
        user_id: UserId,
        batch: &[ExternalRecord],
    ) -> Result<ReconcileReport, EngineError> {
        let user = self.require_user(user_id)?;
        if !permissions::can_import(&user) {
            return Err(EngineError::NotAuthorized(format!(
                "{} may not import",
                user.name
            )));
        }
        let local = self.storage.load_opportunities()?;
        Ok(reconcile::reconcile(batch, &local, now_ms()))
    }

    /// Land an approved report. The whole apply is one transaction: the
    /// collection swap and every audit entry commit together or not at
    /// all. Conflicted records are untouched in both modes.
    pub fn apply_import(
        &mut self,
        user_id: UserId,
        report: &ReconcileReport,
        mode: ApplyMode,
    ) -> Result<ImportSummary, EngineError> {
        let user = self.require_user(user_id)?;
        if !permissions::can_import(&user) {
            return Err(EngineError::NotAuthorized(format!(
                "{} may not import",
                user.name
            )));
        }

        let now = now_ms();
        self.exec_batch("BEGIN IMMEDIATE")?;
        let result = (|| -> Result<(), EngineError> {
            let local = self.storage.load_opportunities()?;
            let final_set = reconcile::apply_plan(report, &local, mode);
            self.storage.replace_opportunities(&final_set)?;
            for opp in &report.new_records {
                self.storage
                    .append_audit(&AuditEntry::new(opp.id, now, &user.name, AuditAction::ImportCreate))?;
            }
            for opp in &report.updated {
                self.storage
                    .append_audit(&AuditEntry::new(opp.id, now, &user.name, AuditAction::ImportUpdate))?;
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                self.exec_batch("COMMIT")?;
                let summary = ImportSummary::from(report);
                info!(
                    created = summary.created,
                    updated = summary.updated,
                    unchanged = summary.unchanged,
                    conflicts = summary.conflicts,
                    orphaned = summary.orphaned,
                    mode = ?mode,
                    "import applied"
                );
                Ok(summary)
            }
            Err(e) => {
                let _ = self.exec_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    // ========================================================================
    // User management
    // ========================================================================

    /// Register a pending account. New accounts are active but not
    /// approved; every permission predicate fails until an admin
    /// approves them.
    pub fn register_user(
        &mut self,
        name: &str,
        email: &str,
        role: Role,
    ) -> Result<UserId, EngineError> {
        if self.storage.get_user_by_email(email)?.is_some() {
            return Err(EngineError::Storage(StorageError::ConstraintViolation(
                format!("email already registered: {email}"),
            )));
        }
        let user = User::new(name, email, role);
        self.storage.put_user(&user)?;
        debug!(id = %user.id, email, "registered user");
        Ok(user.id)
    }

    pub fn approve_user(&mut self, admin_id: UserId, target: UserId) -> Result<(), EngineError> {
        let admin = self.require_user(admin_id)?;
        if !permissions::can_manage_users(&admin) {
            return Err(EngineError::NotAuthorized(format!(
                "{} may not manage users",
                admin.name
            )));
        }
        let mut user = self.require_user(target)?;
        user.approved = true;
        self.storage.put_user(&user)?;
        Ok(())
    }

    pub fn set_user_active(
        &mut self,
        admin_id: UserId,
        target: UserId,
        active: bool,
    ) -> Result<(), EngineError> {
        let admin = self.require_user(admin_id)?;
        if !permissions::can_manage_users(&admin) {
            return Err(EngineError::NotAuthorized(format!(
                "{} may not manage users",
                admin.name
            )));
        }
        let mut user = self.require_user(target)?;
        user.active = active;
        self.storage.put_user(&user)?;
        Ok(())
    }

    pub fn set_user_role(
        &mut self,
        admin_id: UserId,
        target: UserId,
        role: Role,
    ) -> Result<(), EngineError> {
        let admin = self.require_user(admin_id)?;
        if !permissions::can_manage_users(&admin) {
            return Err(EngineError::NotAuthorized(format!(
                "{} may not manage users",
                admin.name
            )));
        }
        let mut user = self.require_user(target)?;
        user.role = role;
        self.storage.put_user(&user)?;
        Ok(())
    }

    /// Stamp a login. Pending accounts may log in; they just cannot do
    /// anything afterwards.
    pub fn record_login(&mut self, user_id: UserId) -> Result<User, EngineError> {
        let mut user = self.require_user(user_id)?;
        user.last_login = Some(now_ms());
        user.login_count += 1;
        self.storage.put_user(&user)?;
        Ok(user)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn opportunity(&self, id: OpportunityId) -> Result<Opportunity, EngineError> {
        self.require_opportunity(id)
    }

    pub fn opportunities(&self) -> Result<Vec<Opportunity>, EngineError> {
        Ok(self.storage.load_opportunities()?)
    }

    /// Full history for one record, oldest first.
    pub fn audit_trail(&self, id: OpportunityId) -> Result<Vec<AuditEntry>, EngineError> {
        Ok(self.storage.audit_for(id)?)
    }

    pub fn user(&self, id: UserId) -> Result<User, EngineError> {
        self.require_user(id)
    }

    pub fn user_by_email(&self, email: &str) -> Result<Option<User>, EngineError> {
        Ok(self.storage.get_user_by_email(email)?)
    }

    pub fn users(&self) -> Result<Vec<User>, EngineError> {
        Ok(self.storage.list_users()?)
    }
}
