//! Classification and merge planning for external record batches.
//!
//! Everything here is pure: the batch and the local set are read-only
//! inputs and the report is a fresh partition. Persistence happens only
//! in the apply phase, behind the `Tracker`.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use dealtrack_core::{
    ids::OpportunityId,
    opportunity::{Opportunity, RecordSource},
    stage::WonStatus,
};

use crate::transform::{ExternalRecord, IncomingRecord, transform};

/// Identity keys used to match an incoming record against the local
/// set, in priority order. The first key with a hit wins and matching
/// stops there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKey {
    SfdcId,
    DealId,
}

pub const MATCH_PRIORITY: [MatchKey; 2] = [MatchKey::SfdcId, MatchKey::DealId];

/// The four user-editable fields inspected for conflicts. Deliberately
/// narrower than the change-check set below; the asymmetry is inherited
/// behavior and kept as-is.
const CONFLICT_FIELD_STAGE: &str = "stage";
const CONFLICT_FIELD_SPECIALIST: &str = "specialist";
const CONFLICT_FIELD_CLIENT_ASK: &str = "client_ask";
const CONFLICT_FIELD_VALUE: &str = "opportunity_value";

#[derive(Debug, Clone, PartialEq)]
pub struct FieldConflict {
    pub field: &'static str,
    pub existing: String,
    pub incoming: String,
}

/// A matched pair where the local record carries human edits newer than
/// its last sync and the batch disagrees. Never auto-resolved; the local
/// record stays in place until a human decides.
#[derive(Debug, Clone)]
pub struct RecordConflict {
    pub local: Opportunity,
    pub incoming: IncomingRecord,
    pub fields: Vec<FieldConflict>,
}

/// Partitioned result of classifying one batch. Each external record
/// lands in exactly one of the first four buckets; `orphaned` covers
/// local records the batch no longer mentions.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub new_records: Vec<Opportunity>,
    pub updated: Vec<Opportunity>,
    pub unchanged: Vec<Opportunity>,
    pub conflicts: Vec<RecordConflict>,
    pub orphaned: Vec<Opportunity>,
}

struct LocalIndex<'a> {
    by_sfdc: HashMap<&'a str, usize>,
    by_deal: HashMap<&'a str, usize>,
}

impl<'a> LocalIndex<'a> {
    fn build(local: &'a [Opportunity]) -> Self {
        let mut by_sfdc = HashMap::new();
        let mut by_deal = HashMap::new();
        for (i, opp) in local.iter().enumerate() {
            if let Some(id) = opp.sfdc_id.as_deref() {
                by_sfdc.entry(id).or_insert(i);
            }
            if let Some(id) = opp.deal_id.as_deref() {
                by_deal.entry(id).or_insert(i);
            }
        }
        Self { by_sfdc, by_deal }
    }

    fn find(&self, incoming: &IncomingRecord) -> Option<usize> {
        for key in MATCH_PRIORITY {
            let hit = match key {
                MatchKey::SfdcId => incoming
                    .sfdc_id
                    .as_deref()
                    .and_then(|id| self.by_sfdc.get(id)),
                MatchKey::DealId => incoming
                    .deal_id
                    .as_deref()
                    .and_then(|id| self.by_deal.get(id)),
            };
            if let Some(&i) = hit {
                return Some(i);
            }
        }
        None
    }
}

fn fmt_value(v: Option<f64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_default()
}

/// Per-field conflict scan. A field conflicts iff the local record was
/// human-edited after its last sync, the incoming value differs, and the
/// incoming value is non-empty. An incoming stage that was defaulted
/// from a blank intake status counts as empty.
pub fn conflict_fields(local: &Opportunity, incoming: &IncomingRecord) -> Vec<FieldConflict> {
    if !local.modified_since_sync() {
        return Vec::new();
    }
    let mut fields = Vec::new();

    if incoming.intake_status.is_some() && incoming.stage != local.stage {
        fields.push(FieldConflict {
            field: CONFLICT_FIELD_STAGE,
            existing: local.stage.as_str().to_string(),
            incoming: incoming.stage.as_str().to_string(),
        });
    }
    if !incoming.specialist.is_empty() && incoming.specialist != local.specialist {
        fields.push(FieldConflict {
            field: CONFLICT_FIELD_SPECIALIST,
            existing: local.specialist.clone(),
            incoming: incoming.specialist.clone(),
        });
    }
    if !incoming.client_ask.is_empty() && incoming.client_ask != local.client_ask {
        fields.push(FieldConflict {
            field: CONFLICT_FIELD_CLIENT_ASK,
            existing: local.client_ask.clone(),
            incoming: incoming.client_ask.clone(),
        });
    }
    if incoming.opportunity_value.is_some() && incoming.opportunity_value != local.aop_value {
        fields.push(FieldConflict {
            field: CONFLICT_FIELD_VALUE,
            existing: fmt_value(local.aop_value),
            incoming: fmt_value(incoming.opportunity_value),
        });
    }

    fields
}

/// Change check over the five key fields (stage, specialist, value,
/// expected close date, intake status). Runs only on conflict-free
/// pairs; any difference means the pair is worth re-merging.
fn key_fields_changed(local: &Opportunity, incoming: &IncomingRecord) -> bool {
    if incoming.intake_status.is_some() && incoming.stage != local.stage {
        return true;
    }
    if !incoming.specialist.is_empty() && incoming.specialist != local.specialist {
        return true;
    }
    if incoming.opportunity_value != local.aop_value {
        return true;
    }
    if incoming.expected_close_date != local.expected_close_date {
        return true;
    }
    if incoming.intake_status != local.intake_status {
        return true;
    }
    false
}

/// Merge an incoming record into its local match.
///
/// Source-system fields always take the incoming value. `stage` and
/// `specialist` take the incoming value only when the local record has
/// no human edits newer than its last sync; local edits win over stale
/// imports. `needs` and `why_launch` are app-owned and never touched.
pub fn merge_record(local: &Opportunity, incoming: &IncomingRecord, now_ms: i64) -> Opportunity {
    let mut merged = local.clone();
    let locally_edited = local.modified_since_sync();

    merged.salesforce_stage = incoming.salesforce_stage.clone();
    merged.intake_status = incoming.intake_status.clone();
    merged.aop_value = incoming.opportunity_value;
    merged.expected_close_date = incoming.expected_close_date;
    merged.proposal_due_date = incoming.proposal_due_date;
    merged.assigned_resources = incoming.assigned_resources.clone();
    merged.comments = incoming.comments.clone();
    merged.compliance_flags = incoming.compliance_flags.clone();

    if !locally_edited && incoming.intake_status.is_some() {
        merged.stage = incoming.stage;
    }
    if !locally_edited && !incoming.specialist.is_empty() {
        merged.specialist = incoming.specialist.clone();
    }
    if !incoming.client_ask.is_empty() {
        merged.client_ask = incoming.client_ask.clone();
    }
    if !incoming.name.is_empty() {
        merged.name = incoming.name.clone();
    }
    if !incoming.client.is_empty() {
        merged.client = incoming.client.clone();
    }
    if !incoming.industry.is_empty() {
        merged.industry = incoming.industry.clone();
    }

    merged.last_sync_date = Some(now_ms);
    merged.updated_date = now_ms;
    merged
}

/// Build a fresh local record from an unmatched incoming record.
pub fn new_record(incoming: &IncomingRecord, now_ms: i64) -> Opportunity {
    let mut opp = Opportunity::new(&incoming.name, &incoming.client, &incoming.specialist, now_ms);
    opp.sfdc_id = incoming.sfdc_id.clone();
    opp.deal_id = incoming.deal_id.clone();
    opp.stage = incoming.stage;
    opp.industry = incoming.industry.clone();
    opp.client_ask = incoming.client_ask.clone();
    opp.comments = incoming.comments.clone();
    opp.aop_value = incoming.opportunity_value;
    opp.expected_close_date = incoming.expected_close_date;
    opp.proposal_due_date = incoming.proposal_due_date;
    opp.assigned_resources = incoming.assigned_resources.clone();
    opp.compliance_flags = incoming.compliance_flags.clone();
    opp.salesforce_stage = incoming.salesforce_stage.clone();
    opp.intake_status = incoming.intake_status.clone();
    opp.source = RecordSource::Salesforce;
    opp.won_status = WonStatus::Unknown;
    opp.last_sync_date = Some(now_ms);
    opp.last_modified = None;
    opp
}

/// Classify one external batch against the local set.
///
/// Inputs are never mutated. Every batch row lands in exactly one of
/// new/updated/unchanged/conflicts; Salesforce-sourced local records the
/// batch never touched are reported as orphaned (informational only).
pub fn reconcile(
    batch: &[ExternalRecord],
    local: &[Opportunity],
    now_ms: i64,
) -> ReconcileReport {
    let index = LocalIndex::build(local);
    let mut matched: HashSet<usize> = HashSet::new();
    let mut report = ReconcileReport::default();

    for row in batch {
        let incoming = transform(row);
        match index.find(&incoming) {
            None => report.new_records.push(new_record(&incoming, now_ms)),
            Some(i) => {
                matched.insert(i);
                let existing = &local[i];
                let fields = conflict_fields(existing, &incoming);
                if !fields.is_empty() {
                    report.conflicts.push(RecordConflict {
                        local: existing.clone(),
                        incoming,
                        fields,
                    });
                } else if key_fields_changed(existing, &incoming) {
                    report.updated.push(merge_record(existing, &incoming, now_ms));
                } else {
                    report.unchanged.push(existing.clone());
                }
            }
        }
    }

    for (i, opp) in local.iter().enumerate() {
        if opp.source == RecordSource::Salesforce && !matched.contains(&i) {
            report.orphaned.push(opp.clone());
        }
    }

    debug!(
        new = report.new_records.len(),
        updated = report.updated.len(),
        unchanged = report.unchanged.len(),
        conflicts = report.conflicts.len(),
        orphaned = report.orphaned.len(),
        "reconciled batch"
    );

    report
}

/// How an approved reconciliation plan lands in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Keep everything local; swap in merged versions of matched
    /// records and append new ones. Orphans and conflicted records
    /// stay untouched.
    Update,
    /// Mirror the export: records absent from the batch (orphans) are
    /// dropped. App-created records are always kept.
    Replace,
}

/// Compute the final opportunity set for a mode. Pure; the `Tracker`
/// owns the single atomic write.
pub fn apply_plan(
    report: &ReconcileReport,
    local: &[Opportunity],
    mode: ApplyMode,
) -> Vec<Opportunity> {
    let mut replacements: HashMap<OpportunityId, &Opportunity> = HashMap::new();
    for opp in report.updated.iter().chain(report.unchanged.iter()) {
        replacements.insert(opp.id, opp);
    }
    let orphaned: HashSet<OpportunityId> = report.orphaned.iter().map(|o| o.id).collect();

    let mut out: Vec<Opportunity> = local
        .iter()
        .filter(|o| mode == ApplyMode::Update || !orphaned.contains(&o.id))
        .map(|o| replacements.get(&o.id).map_or_else(|| o.clone(), |r| (*r).clone()))
        .collect();
    out.extend(report.new_records.iter().cloned());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::ExternalRecord;
    use dealtrack_core::stage::Stage;

    fn sf_local(sfdc_id: &str, stage: Stage) -> Opportunity {
        let mut opp = Opportunity::new("Rollout", "Acme", "Alice", 1_000);
        opp.sfdc_id = Some(sfdc_id.to_string());
        opp.stage = stage;
        opp.source = RecordSource::Salesforce;
        opp.last_sync_date = Some(1_000);
        opp
    }

    fn row(pairs: &[(&str, &str)]) -> ExternalRecord {
        ExternalRecord::from_pairs(pairs)
    }

    #[test]
    fn unmatched_records_are_new_and_nothing_else() {
        let local = vec![sf_local("SF-1", Stage::Intake)];
        let batch = vec![row(&[
            ("Opportunity Id18", "SF-99"),
            ("Opportunity Name", "Fresh"),
            ("Specialist", "Cara"),
        ])];

        let report = reconcile(&batch, &local, 5_000);
        assert_eq!(report.new_records.len(), 1);
        assert!(report.updated.is_empty());
        assert!(report.unchanged.is_empty());
        assert!(report.conflicts.is_empty());

        let created = &report.new_records[0];
        assert_eq!(created.sfdc_id.as_deref(), Some("SF-99"));
        assert_eq!(created.source, RecordSource::Salesforce);
        assert_eq!(created.last_sync_date, Some(5_000));
    }

    #[test]
    fn deal_id_matches_when_sfdc_id_misses() {
        let mut opp = sf_local("SF-1", Stage::Intake);
        opp.deal_id = Some("D-7".into());
        let local = vec![opp];

        let batch = vec![row(&[("Deal ID", "D-7"), ("Specialist", "Alice")])];
        let report = reconcile(&batch, &local, 5_000);
        assert!(report.new_records.is_empty());
        assert_eq!(report.unchanged.len(), 1);
    }

    #[test]
    fn sfdc_id_wins_over_deal_id() {
        let mut a = sf_local("SF-1", Stage::Intake);
        a.deal_id = Some("D-1".into());
        let mut b = sf_local("SF-2", Stage::Intake);
        b.deal_id = Some("D-2".into());
        let local = vec![a.clone(), b.clone()];

        // Row carries a's sfdc id but b's deal id; priority says a.
        let batch = vec![row(&[
            ("Opportunity Id18", "SF-1"),
            ("Deal ID", "D-2"),
            ("Specialist", "Alice"),
        ])];
        let report = reconcile(&batch, &local, 5_000);
        // b was never touched -> orphaned; a matched.
        assert_eq!(report.orphaned.len(), 1);
        assert_eq!(report.orphaned[0].id, b.id);
    }

    #[test]
    fn locally_edited_stage_difference_is_a_conflict() {
        // T2 > T1: human advanced the stage after the last sync.
        let mut opp = sf_local("SF-1", Stage::Shaping);
        opp.last_sync_date = Some(1_000);
        opp.last_modified = Some(2_000);
        let local = vec![opp];

        let batch = vec![row(&[
            ("Opportunity Id18", "SF-1"),
            ("Intake Status", "In Proposal"),
            ("Specialist", "Alice"),
        ])];

        let report = reconcile(&batch, &local, 5_000);
        assert!(report.updated.is_empty(), "conflicts never land in updated");
        assert_eq!(report.conflicts.len(), 1);
        let conflict = &report.conflicts[0];
        assert_eq!(conflict.fields.len(), 1);
        assert_eq!(conflict.fields[0].field, "stage");
        assert_eq!(conflict.fields[0].existing, "Shaping");
        assert_eq!(conflict.fields[0].incoming, "Proposal");
    }

    #[test]
    fn empty_incoming_values_never_conflict() {
        let mut opp = sf_local("SF-1", Stage::Shaping);
        opp.last_modified = Some(2_000);
        opp.client_ask = "locally written ask".into();
        let local = vec![opp];

        // No intake status, no specialist, no client ask in the row.
        let batch = vec![row(&[("Opportunity Id18", "SF-1")])];
        let report = reconcile(&batch, &local, 5_000);
        assert!(report.conflicts.is_empty());
    }

    #[test]
    fn merge_preserves_locally_edited_stage() {
        let mut opp = sf_local("SF-1", Stage::Shaping);
        opp.last_sync_date = Some(1_000);
        opp.last_modified = Some(2_000);

        let incoming = crate::transform::transform(&row(&[
            ("Opportunity Id18", "SF-1"),
            ("Intake Status", "In Proposal"),
        ]));
        let merged = merge_record(&opp, &incoming, 5_000);
        assert_eq!(merged.stage, Stage::Shaping, "local stage wins over stale import");
        assert_eq!(merged.last_sync_date, Some(5_000));
    }

    #[test]
    fn merge_takes_incoming_stage_when_not_locally_edited() {
        let opp = sf_local("SF-1", Stage::Intake);
        let incoming = crate::transform::transform(&row(&[
            ("Opportunity Id18", "SF-1"),
            ("Intake Status", "In Research"),
        ]));
        let merged = merge_record(&opp, &incoming, 5_000);
        assert_eq!(merged.stage, Stage::InResearch);
    }

    #[test]
    fn merge_never_touches_app_owned_fields() {
        let mut opp = sf_local("SF-1", Stage::Intake);
        opp.needs = "three data engineers".into();
        opp.why_launch = "existing platform EOL".into();
        let incoming = crate::transform::transform(&row(&[
            ("Opportunity Id18", "SF-1"),
            ("Comments", "updated from SF"),
        ]));
        let merged = merge_record(&opp, &incoming, 5_000);
        assert_eq!(merged.needs, "three data engineers");
        assert_eq!(merged.why_launch, "existing platform EOL");
        assert_eq!(merged.comments, "updated from SF");
    }

    #[test]
    fn second_pass_over_same_batch_is_unchanged() {
        let local = vec![sf_local("SF-1", Stage::Intake)];
        let batch = vec![row(&[
            ("Opportunity Id18", "SF-1"),
            ("Intake Status", "In Research"),
            ("Specialist", "Alice"),
            ("Service TCV (converted)", "$10,000"),
        ])];

        let first = reconcile(&batch, &local, 5_000);
        assert_eq!(first.updated.len(), 1);

        let after_apply = apply_plan(&first, &local, ApplyMode::Update);
        let second = reconcile(&batch, &after_apply, 6_000);
        assert!(second.updated.is_empty(), "same batch twice must be a no-op");
        assert_eq!(second.unchanged.len(), 1);
        assert!(second.new_records.is_empty());
    }

    #[test]
    fn untouched_salesforce_records_are_orphaned() {
        let kept = sf_local("SF-1", Stage::Intake);
        let gone = sf_local("SF-2", Stage::Intake);
        let mut app_owned = Opportunity::new("Local", "Acme", "Alice", 1_000);
        app_owned.stage = Stage::Shaping;
        let local = vec![kept.clone(), gone.clone(), app_owned];

        let batch = vec![row(&[("Opportunity Id18", "SF-1"), ("Specialist", "Alice")])];
        let report = reconcile(&batch, &local, 5_000);

        assert_eq!(report.orphaned.len(), 1);
        assert_eq!(report.orphaned[0].id, gone.id);
        // Orphans never appear as new or updated.
        assert!(report.new_records.iter().all(|o| o.id != gone.id));
        assert!(report.updated.iter().all(|o| o.id != gone.id));
    }

    #[test]
    fn update_mode_keeps_orphans_and_app_records() {
        let gone = sf_local("SF-2", Stage::Intake);
        let app_owned = Opportunity::new("Local", "Acme", "Alice", 1_000);
        let local = vec![gone.clone(), app_owned.clone()];

        let batch = vec![row(&[("Opportunity Id18", "SF-9"), ("Specialist", "Cara")])];
        let report = reconcile(&batch, &local, 5_000);

        let merged = apply_plan(&report, &local, ApplyMode::Update);
        assert_eq!(merged.len(), 3);
        assert!(merged.iter().any(|o| o.id == gone.id));
        assert!(merged.iter().any(|o| o.id == app_owned.id));
    }

    #[test]
    fn replace_mode_drops_orphans_but_keeps_app_records() {
        let gone = sf_local("SF-2", Stage::Intake);
        let app_owned = Opportunity::new("Local", "Acme", "Alice", 1_000);
        let local = vec![gone.clone(), app_owned.clone()];

        let batch = vec![row(&[("Opportunity Id18", "SF-9"), ("Specialist", "Cara")])];
        let report = reconcile(&batch, &local, 5_000);

        let replaced = apply_plan(&report, &local, ApplyMode::Replace);
        assert_eq!(replaced.len(), 2);
        assert!(!replaced.iter().any(|o| o.id == gone.id), "orphan dropped");
        assert!(replaced.iter().any(|o| o.id == app_owned.id));
    }

    #[test]
    fn inputs_are_not_mutated() {
        let local = vec![sf_local("SF-1", Stage::Intake)];
        let snapshot = local.clone();
        let batch = vec![row(&[
            ("Opportunity Id18", "SF-1"),
            ("Intake Status", "In Research"),
        ])];
        let _ = reconcile(&batch, &local, 5_000);
        assert_eq!(local, snapshot);
    }
}
