use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ids::OpportunityId;
use crate::stage::{Stage, WonStatus};

/// The five fixed point-of-contact roles an opportunity can staff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PocRole {
    Practice,
    Solution,
    Delivery,
    Commercial,
    Compliance,
}

pub const ALL_POC_ROLES: [PocRole; 5] = [
    PocRole::Practice,
    PocRole::Solution,
    PocRole::Delivery,
    PocRole::Commercial,
    PocRole::Compliance,
];

impl PocRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Practice => "Practice",
            Self::Solution => "Solution",
            Self::Delivery => "Delivery",
            Self::Commercial => "Commercial",
            Self::Compliance => "Compliance",
        }
    }
}

/// Where a record originated. Salesforce-sourced records participate in
/// reconciliation and orphan detection; app-created records never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RecordSource {
    #[default]
    App,
    Salesforce,
}

impl RecordSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Salesforce => "salesforce",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "salesforce" => Self::Salesforce,
            _ => Self::App,
        }
    }
}

/// The central record of the pipeline.
///
/// All timestamps are epoch milliseconds. The audit history lives in a
/// separate append-only store keyed by `id`, not inside this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: OpportunityId,

    // External identity, present only on Salesforce-sourced records.
    pub sfdc_id: Option<String>,
    pub deal_id: Option<String>,

    pub name: String,
    pub client: String,
    pub stage: Stage,
    pub industry: String,
    pub offerings: BTreeSet<String>,

    // Ownership
    pub specialist: String,
    pub assigned_resources: BTreeMap<PocRole, String>,

    // Free-text content
    pub client_ask: String,
    pub needs: String,
    pub why_launch: String,
    pub comments: String,

    // Money (non-negative when present)
    pub aop_value: Option<f64>,
    pub eenu_value: Option<f64>,

    // Temporal
    pub created_date: i64,
    pub updated_date: i64,
    pub proposal_due_date: Option<i64>,
    pub expected_close_date: Option<i64>,

    pub won_status: WonStatus,

    // External-origin bookkeeping
    pub source: RecordSource,
    pub salesforce_stage: Option<String>,
    pub intake_status: Option<String>,
    pub last_sync_date: Option<i64>,
    pub last_modified: Option<i64>,
    pub compliance_flags: Vec<String>,
}

impl Opportunity {
    /// A blank record owned by `specialist`, created at `now_ms`.
    pub fn new(name: &str, client: &str, specialist: &str, now_ms: i64) -> Self {
        Self {
            id: OpportunityId::new(),
            sfdc_id: None,
            deal_id: None,
            name: name.to_string(),
            client: client.to_string(),
            stage: Stage::New,
            industry: String::new(),
            offerings: BTreeSet::new(),
            specialist: specialist.to_string(),
            assigned_resources: BTreeMap::new(),
            client_ask: String::new(),
            needs: String::new(),
            why_launch: String::new(),
            comments: String::new(),
            aop_value: None,
            eenu_value: None,
            created_date: now_ms,
            updated_date: now_ms,
            proposal_due_date: None,
            expected_close_date: None,
            won_status: WonStatus::Unknown,
            source: RecordSource::App,
            salesforce_stage: None,
            intake_status: None,
            last_sync_date: None,
            last_modified: None,
            compliance_flags: Vec::new(),
        }
    }

    /// Whether a human edited this record after its last external sync.
    ///
    /// Local edits with no sync on record count as modified (protects the
    /// edit); a record never edited counts as unmodified.
    pub fn modified_since_sync(&self) -> bool {
        match (self.last_modified, self.last_sync_date) {
            (Some(modified), Some(synced)) => modified > synced,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, crate::CoreError> {
        rmp_serde::to_vec(self).map_err(|e| crate::CoreError::Serialization(e.to_string()))
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, crate::CoreError> {
        rmp_serde::from_slice(bytes).map_err(|e| crate::CoreError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modified_since_sync_rules() {
        let mut opp = Opportunity::new("Rollout", "Acme", "Alice", 1_000);
        assert!(!opp.modified_since_sync());

        opp.last_modified = Some(2_000);
        assert!(opp.modified_since_sync(), "edit with no sync counts as modified");

        opp.last_sync_date = Some(3_000);
        assert!(!opp.modified_since_sync());

        opp.last_modified = Some(4_000);
        assert!(opp.modified_since_sync());

        // Edit exactly at the sync instant is not "after" it.
        opp.last_modified = Some(3_000);
        assert!(!opp.modified_since_sync());
    }

    #[test]
    fn msgpack_roundtrip() {
        let mut opp = Opportunity::new("Rollout", "Acme", "Alice", 1_000);
        opp.sfdc_id = Some("0061800000Cabc1AAA".into());
        opp.aop_value = Some(125_000.0);
        opp.assigned_resources.insert(PocRole::Delivery, "Bob".into());
        opp.offerings.insert("Platform".into());

        let bytes = opp.to_msgpack().unwrap();
        let back = Opportunity::from_msgpack(&bytes).unwrap();
        assert_eq!(opp, back);
    }
}
