use serde::{Deserialize, Serialize};

use crate::CoreError;
use crate::field_value::FieldValue;
use crate::ids::{EntryId, OpportunityId};

/// What kind of change an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    Create,
    Edit,
    StageChange,
    Assignment,
    CommentUpdate,
    ImportCreate,
    ImportUpdate,
}

impl AuditAction {
    /// String name for storage and indexing.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Edit => "edit",
            Self::StageChange => "stage_change",
            Self::Assignment => "assignment",
            Self::CommentUpdate => "comment_update",
            Self::ImportCreate => "import_create",
            Self::ImportUpdate => "import_update",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "create" => Ok(Self::Create),
            "edit" => Ok(Self::Edit),
            "stage_change" => Ok(Self::StageChange),
            "assignment" => Ok(Self::Assignment),
            "comment_update" => Ok(Self::CommentUpdate),
            "import_create" => Ok(Self::ImportCreate),
            "import_update" => Ok(Self::ImportUpdate),
            _ => Err(CoreError::InvalidData(format!("unknown audit action: {s}"))),
        }
    }
}

/// One append-only history entry. Entries are never mutated or reordered;
/// a stage change or a single field edit appends exactly one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: EntryId,
    pub opportunity_id: OpportunityId,
    pub timestamp: i64,
    pub user: String,
    pub action: AuditAction,
    pub field: Option<String>,
    pub old_value: Option<FieldValue>,
    pub new_value: Option<FieldValue>,
    pub notes: Option<String>,
}

impl AuditEntry {
    pub fn new(
        opportunity_id: OpportunityId,
        timestamp: i64,
        user: &str,
        action: AuditAction,
    ) -> Self {
        Self {
            entry_id: EntryId::new(),
            opportunity_id,
            timestamp,
            user: user.to_string(),
            action,
            field: None,
            old_value: None,
            new_value: None,
            notes: None,
        }
    }

    pub fn with_field(
        mut self,
        field: &str,
        old_value: Option<FieldValue>,
        new_value: Option<FieldValue>,
    ) -> Self {
        self.field = Some(field.to_string());
        self.old_value = old_value;
        self.new_value = new_value;
        self
    }

    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_string());
        self
    }
}
