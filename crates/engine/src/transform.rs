//! Field mapping from external (Salesforce export) columns onto the
//! local record shape.
//!
//! The column names and the intake-status translation are a compatibility
//! contract with the export format; changing them breaks matching against
//! previously synced data.

use std::collections::BTreeMap;

use dealtrack_core::{
    opportunity::{ALL_POC_ROLES, PocRole},
    stage::Stage,
    time::{parse_date_ms, parse_money},
};

/// External column names, verbatim from the export header row.
pub mod columns {
    pub const PRIMARY: &str = "Primary";
    pub const OPPORTUNITY_NAME: &str = "Opportunity Name";
    pub const OPPORTUNITY_ID18: &str = "Opportunity Id18";
    pub const DEAL_ID: &str = "Deal ID";
    pub const INTAKE_STATUS: &str = "Intake Status";
    pub const STAGE: &str = "Stage";
    pub const SERVICE_TCV: &str = "Service TCV (converted)";
    pub const SPECIALIST: &str = "Specialist";
    pub const CLIENT_ASK: &str = "Client Ask";
    pub const INDUSTRY: &str = "Industry";
    pub const COMMENTS: &str = "Comments";
    pub const EXPECTED_CLOSE_DATE: &str = "Expected Close Date";
    pub const PROPOSAL_DUE_DATE: &str = "Proposal Due Date";
    pub const COMPLIANCE: &str = "Compliance";
    pub const LAST_MODIFIED_DATE: &str = "Last Modified Date";
    /// POC columns are `"POC - "` followed by the role name.
    pub const POC_PREFIX: &str = "POC - ";
}

/// One already-parsed row of the external export: column name to raw
/// cell text. Parsing the tabular format itself is the host's job.
#[derive(Debug, Clone, Default)]
pub struct ExternalRecord {
    fields: BTreeMap<String, String>,
}

impl ExternalRecord {
    pub fn new(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }

    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            fields: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Trimmed cell value; missing and blank cells are both `None`.
    pub fn get(&self, column: &str) -> Option<&str> {
        match self.fields.get(column) {
            Some(v) if !v.trim().is_empty() => Some(v.trim()),
            _ => None,
        }
    }

    fn get_string(&self, column: &str) -> String {
        self.get(column).unwrap_or_default().to_string()
    }
}

/// An external row mapped onto the local field set, ready for matching
/// and classification.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingRecord {
    pub sfdc_id: Option<String>,
    pub deal_id: Option<String>,
    pub name: String,
    pub client: String,
    /// Local stage derived from the intake status. Defaults to `New`
    /// when the status column is missing or unrecognized.
    pub stage: Stage,
    /// Raw intake status, kept for the change check and the merged
    /// record. `None` when the column was empty.
    pub intake_status: Option<String>,
    pub salesforce_stage: Option<String>,
    pub specialist: String,
    pub client_ask: String,
    pub industry: String,
    pub comments: String,
    pub opportunity_value: Option<f64>,
    pub expected_close_date: Option<i64>,
    pub proposal_due_date: Option<i64>,
    pub assigned_resources: BTreeMap<PocRole, String>,
    pub compliance_flags: Vec<String>,
    pub last_modified: Option<i64>,
}

/// Map one external row through the field dictionary. Never fails:
/// malformed dates and money degrade to `None`, missing text to empty.
pub fn transform(record: &ExternalRecord) -> IncomingRecord {
    let intake_status = record.get(columns::INTAKE_STATUS).map(str::to_string);
    let stage = Stage::from_intake_status(intake_status.as_deref().unwrap_or(""));

    let mut assigned_resources = BTreeMap::new();
    for role in ALL_POC_ROLES {
        let column = format!("{}{}", columns::POC_PREFIX, role.as_str());
        if let Some(name) = record.get(&column) {
            assigned_resources.insert(role, name.to_string());
        }
    }

    let compliance_flags = record
        .get(columns::COMPLIANCE)
        .map(|raw| {
            raw.split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    IncomingRecord {
        sfdc_id: record.get(columns::OPPORTUNITY_ID18).map(str::to_string),
        deal_id: record.get(columns::DEAL_ID).map(str::to_string),
        name: record.get_string(columns::OPPORTUNITY_NAME),
        client: record.get_string(columns::PRIMARY),
        stage,
        intake_status,
        salesforce_stage: record.get(columns::STAGE).map(str::to_string),
        specialist: record.get_string(columns::SPECIALIST),
        client_ask: record.get_string(columns::CLIENT_ASK),
        industry: record.get_string(columns::INDUSTRY),
        comments: record.get_string(columns::COMMENTS),
        opportunity_value: record
            .get(columns::SERVICE_TCV)
            .and_then(parse_money),
        expected_close_date: record
            .get(columns::EXPECTED_CLOSE_DATE)
            .and_then(parse_date_ms),
        proposal_due_date: record
            .get(columns::PROPOSAL_DUE_DATE)
            .and_then(parse_date_ms),
        assigned_resources,
        compliance_flags,
        last_modified: record
            .get(columns::LAST_MODIFIED_DATE)
            .and_then(parse_date_ms),
    }
}
