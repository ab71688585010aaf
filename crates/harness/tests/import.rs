use dealtrack_core::{
    audit::AuditAction,
    opportunity::RecordSource,
    stage::Stage,
};
use dealtrack_engine::{ApplyMode, EngineError, OpportunityEdit};
use dealtrack_harness::{TestDesk, row};
use dealtrack_storage::Storage;

// ============================================================================
// Batch classification through the tracker
// ============================================================================

#[test]
fn fresh_batch_creates_salesforce_records() -> Result<(), Box<dyn std::error::Error>> {
    let mut desk = TestDesk::new()?;
    let batch = vec![
        row(&[
            ("Opportunity Id18", "SF-1"),
            ("Opportunity Name", "Platform Rollout"),
            ("Primary", "Acme"),
            ("Intake Status", "In Research"),
            ("Specialist", "Sasha"),
            ("Service TCV (converted)", "$250,000"),
        ]),
        row(&[
            ("Deal ID", "D-2"),
            ("Opportunity Name", "Managed Services"),
            ("Primary", "Bix"),
        ]),
    ];

    let report = desk.tracker.plan_import(desk.gtm_lead, &batch)?;
    assert_eq!(report.new_records.len(), 2);

    let summary = desk.tracker.apply_import(desk.gtm_lead, &report, ApplyMode::Update)?;
    assert_eq!(summary.created, 2);

    let opps = desk.tracker.opportunities()?;
    assert_eq!(opps.len(), 2);
    for opp in &opps {
        assert_eq!(opp.source, RecordSource::Salesforce);
        assert!(opp.last_sync_date.is_some());
        let trail = desk.tracker.audit_trail(opp.id)?;
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, AuditAction::ImportCreate);
    }

    // Missing intake status defaults the stage to New, not an error.
    let managed = opps.iter().find(|o| o.deal_id.as_deref() == Some("D-2"));
    assert_eq!(managed.map(|o| o.stage), Some(Stage::New));
    Ok(())
}

#[test]
fn locally_advanced_stage_conflicts_with_the_export() -> Result<(), Box<dyn std::error::Error>> {
    let mut desk = TestDesk::new()?;
    let synced = desk.seed_synced("SF-1", Stage::Shaping)?;

    // Human edit after the sync marks the record as locally modified.
    desk.tracker.apply_edits(
        desk.gtm_lead,
        synced.id,
        vec![OpportunityEdit::Comments("shaping call done".into())],
    )?;
    assert!(
        desk.tracker.opportunity(synced.id)?.modified_since_sync(),
        "edit must land strictly after the seeded sync stamp"
    );

    let batch = vec![row(&[
        ("Opportunity Id18", "SF-1"),
        ("Intake Status", "In Proposal"),
        ("Specialist", "Sasha"),
    ])];
    let report = desk.tracker.plan_import(desk.gtm_lead, &batch)?;

    assert!(report.updated.is_empty());
    assert_eq!(report.conflicts.len(), 1);
    let conflict = &report.conflicts[0];
    assert_eq!(conflict.fields.len(), 1);
    assert_eq!(conflict.fields[0].field, "stage");
    assert_eq!(conflict.fields[0].existing, "Shaping");
    assert_eq!(conflict.fields[0].incoming, "Proposal");

    // Applying the report leaves the conflicted record exactly as it was.
    desk.tracker.apply_import(desk.gtm_lead, &report, ApplyMode::Update)?;
    let after = desk.tracker.opportunity(synced.id)?;
    assert_eq!(after.stage, Stage::Shaping);
    assert_eq!(after.comments, "shaping call done");
    Ok(())
}

#[test]
fn merge_keeps_local_stage_but_takes_source_fields() -> Result<(), Box<dyn std::error::Error>> {
    let mut desk = TestDesk::new()?;
    let synced = desk.seed_synced("SF-1", Stage::Shaping)?;
    desk.tracker.apply_edits(
        desk.gtm_lead,
        synced.id,
        vec![OpportunityEdit::Needs("data platform team".into())],
    )?;
    assert!(desk.tracker.opportunity(synced.id)?.modified_since_sync());

    // No intake status and no conflict-set differences in the row, but
    // the expected close date moved, so the pair is an update.
    let batch = vec![row(&[
        ("Opportunity Id18", "SF-1"),
        ("Expected Close Date", "2026-03-31"),
        ("Specialist", "Sasha"),
    ])];
    let report = desk.tracker.plan_import(desk.gtm_lead, &batch)?;
    assert!(report.conflicts.is_empty());
    assert_eq!(report.updated.len(), 1);

    desk.tracker.apply_import(desk.gtm_lead, &report, ApplyMode::Update)?;
    let after = desk.tracker.opportunity(synced.id)?;
    assert_eq!(after.stage, Stage::Shaping, "human stage survives the merge");
    assert!(after.expected_close_date.is_some());
    assert_eq!(after.needs, "data platform team", "app-owned field untouched");
    assert_eq!(
        desk.tracker.audit_trail(synced.id)?.last().map(|e| e.action),
        Some(AuditAction::ImportUpdate)
    );
    Ok(())
}

#[test]
fn reapplying_the_same_batch_changes_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let mut desk = TestDesk::new()?;
    desk.seed_synced("SF-1", Stage::Intake)?;

    let batch = vec![row(&[
        ("Opportunity Id18", "SF-1"),
        ("Opportunity Name", "Synced"),
        ("Primary", "Acme"),
        ("Intake Status", "In Research"),
        ("Specialist", "Sasha"),
        ("Service TCV (converted)", "$90,000"),
    ])];

    let first = desk.tracker.plan_import(desk.gtm_lead, &batch)?;
    assert_eq!(first.updated.len(), 1);
    desk.tracker.apply_import(desk.gtm_lead, &first, ApplyMode::Update)?;
    let audits_after_first = desk.tracker.storage().audit_count()?;

    let second = desk.tracker.plan_import(desk.gtm_lead, &batch)?;
    assert!(second.new_records.is_empty());
    assert!(second.updated.is_empty());
    assert!(second.conflicts.is_empty());
    assert_eq!(second.unchanged.len(), 1);

    desk.tracker.apply_import(desk.gtm_lead, &second, ApplyMode::Update)?;
    assert_eq!(desk.tracker.storage().audit_count()?, audits_after_first);
    assert_eq!(desk.tracker.opportunities()?.len(), 1);
    Ok(())
}

// ============================================================================
// Orphans and apply modes
// ============================================================================

#[test]
fn orphans_survive_update_and_die_in_replace() -> Result<(), Box<dyn std::error::Error>> {
    let mut desk = TestDesk::new()?;
    let kept = desk.seed_synced("SF-1", Stage::Intake)?;
    let dropped = desk.seed_synced("SF-2", Stage::Intake)?;
    let app_owned = desk.seed_opportunity("Local Deal", "Acme", "Sasha")?;

    let batch = vec![row(&[("Opportunity Id18", "SF-1"), ("Specialist", "Sasha")])];
    let report = desk.tracker.plan_import(desk.gtm_lead, &batch)?;
    assert_eq!(report.orphaned.len(), 1);
    assert_eq!(report.orphaned[0].id, dropped.id);

    desk.tracker.apply_import(desk.gtm_lead, &report, ApplyMode::Update)?;
    assert_eq!(desk.tracker.opportunities()?.len(), 3, "update keeps orphans");

    let report = desk.tracker.plan_import(desk.gtm_lead, &batch)?;
    desk.tracker.apply_import(desk.gtm_lead, &report, ApplyMode::Replace)?;
    let remaining = desk.tracker.opportunities()?;
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().any(|o| o.id == kept.id));
    assert!(remaining.iter().any(|o| o.id == app_owned));
    assert!(!remaining.iter().any(|o| o.id == dropped.id));
    Ok(())
}

#[test]
fn app_created_records_never_orphan() -> Result<(), Box<dyn std::error::Error>> {
    let mut desk = TestDesk::new()?;
    desk.seed_opportunity("Local Deal", "Acme", "Sasha")?;
    let report = desk.tracker.plan_import(desk.gtm_lead, &[])?;
    assert!(report.orphaned.is_empty());
    Ok(())
}

#[test]
fn import_is_gated_by_role() -> Result<(), Box<dyn std::error::Error>> {
    let mut desk = TestDesk::new()?;
    let batch = vec![row(&[("Opportunity Id18", "SF-1")])];
    for user in [desk.gtm, desk.practice_lead, desk.poc, desk.specialist] {
        assert!(matches!(
            desk.tracker.plan_import(user, &batch).unwrap_err(),
            EngineError::NotAuthorized(_)
        ));
    }
    let report = desk.tracker.plan_import(desk.admin, &batch)?;
    assert!(matches!(
        desk.tracker
            .apply_import(desk.specialist, &report, ApplyMode::Update)
            .unwrap_err(),
        EngineError::NotAuthorized(_)
    ));
    Ok(())
}

#[test]
fn deal_id_matches_records_without_sfdc_id() -> Result<(), Box<dyn std::error::Error>> {
    let mut desk = TestDesk::new()?;
    let mut synced = desk.seed_synced("SF-1", Stage::Intake)?;
    synced.sfdc_id = None;
    synced.deal_id = Some("D-9".into());
    desk.tracker.storage_mut().upsert_opportunity(&synced)?;

    let batch = vec![row(&[
        ("Deal ID", "D-9"),
        ("Intake Status", "In Shaping"),
        ("Specialist", "Sasha"),
    ])];
    let report = desk.tracker.plan_import(desk.gtm_lead, &batch)?;
    assert!(report.new_records.is_empty());
    assert_eq!(report.updated.len(), 1);
    assert_eq!(report.updated[0].id, synced.id);
    assert_eq!(report.updated[0].stage, Stage::Shaping);
    Ok(())
}
