use dealtrack_core::{
    ids::{OpportunityId, UserId},
    opportunity::{Opportunity, RecordSource},
    role::Role,
    stage::Stage,
    time::now_ms,
    user::User,
};
use dealtrack_engine::{ExternalRecord, Tracker};
use dealtrack_storage::{SqliteStorage, Storage};

/// One tracker with an approved user per role, ready for scenarios.
///
/// The specialist account is named "Sasha"; records seeded through
/// `seed_opportunity` with specialist "Sasha" are ownable by it.
pub struct TestDesk {
    pub tracker: Tracker,
    pub admin: UserId,
    pub gtm_lead: UserId,
    pub gtm: UserId,
    pub practice_lead: UserId,
    pub poc: UserId,
    pub specialist: UserId,
}

impl TestDesk {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        Self::with_storage(SqliteStorage::open_in_memory()?)
    }

    pub fn with_storage(storage: SqliteStorage) -> Result<Self, Box<dyn std::error::Error>> {
        let mut tracker = Tracker::new(storage);

        // Bootstrap admin: there is no approver yet, so flip the flag
        // directly in storage.
        let admin = tracker.register_user("Ada", "ada@example.com", Role::Admin)?;
        let mut ada = tracker.user(admin)?;
        ada.approved = true;
        tracker.storage_mut().put_user(&ada)?;

        let mut approved = |tracker: &mut Tracker,
                            name: &str,
                            email: &str,
                            role: Role|
         -> Result<UserId, Box<dyn std::error::Error>> {
            let id = tracker.register_user(name, email, role)?;
            tracker.approve_user(admin, id)?;
            Ok(id)
        };

        let gtm_lead = approved(&mut tracker, "Lena", "lena@example.com", Role::GtmLead)?;
        let gtm = approved(&mut tracker, "Gia", "gia@example.com", Role::Gtm)?;
        let practice_lead = approved(&mut tracker, "Priya", "priya@example.com", Role::PracticeLead)?;
        let poc = approved(&mut tracker, "Omar", "omar@example.com", Role::Poc)?;
        let specialist = approved(&mut tracker, "Sasha", "sasha@example.com", Role::Specialist)?;

        Ok(Self {
            tracker,
            admin,
            gtm_lead,
            gtm,
            practice_lead,
            poc,
            specialist,
        })
    }

    pub fn seed_opportunity(
        &mut self,
        name: &str,
        client: &str,
        specialist: &str,
    ) -> Result<OpportunityId, Box<dyn std::error::Error>> {
        Ok(self
            .tracker
            .create_opportunity(self.admin, name, client, specialist)?)
    }

    /// Seed a record and walk it to `stage` as admin.
    pub fn seed_at_stage(
        &mut self,
        stage: Stage,
    ) -> Result<OpportunityId, Box<dyn std::error::Error>> {
        let id = self.seed_opportunity("Seeded", "Acme", "Sasha")?;
        for step in path_from_new(stage) {
            self.tracker.change_stage(self.admin, id, *step)?;
        }
        Ok(id)
    }

    /// Plant a previously synced Salesforce-sourced record directly in
    /// storage, bypassing commands, the way a past import would have
    /// left it. The sync stamp sits a minute in the past so an edit made
    /// right after seeding is unambiguously newer than the sync; the
    /// modified-since-sync check is a strict comparison.
    pub fn seed_synced(
        &mut self,
        sfdc_id: &str,
        stage: Stage,
    ) -> Result<Opportunity, Box<dyn std::error::Error>> {
        let synced_at = now_ms() - 60_000;
        let mut opp = Opportunity::new("Synced", "Acme", "Sasha", synced_at);
        opp.sfdc_id = Some(sfdc_id.to_string());
        opp.stage = stage;
        opp.source = RecordSource::Salesforce;
        opp.last_sync_date = Some(synced_at);
        self.tracker.storage_mut().upsert_opportunity(&opp)?;
        Ok(opp)
    }

    pub fn user(&self, id: UserId) -> Result<User, Box<dyn std::error::Error>> {
        Ok(self.tracker.user(id)?)
    }
}

/// Admin-walkable path from `New` to each stage.
fn path_from_new(stage: Stage) -> &'static [Stage] {
    match stage {
        Stage::New => &[],
        Stage::Intake => &[Stage::Intake],
        Stage::NeedsMoreInfo => &[Stage::Intake, Stage::NeedsMoreInfo],
        Stage::InResearch => &[Stage::Intake, Stage::InResearch],
        Stage::Shaping => &[Stage::Intake, Stage::Shaping],
        Stage::Proposal => &[Stage::Intake, Stage::Proposal],
        Stage::Review => &[Stage::Intake, Stage::Proposal, Stage::Review],
        Stage::Complete => &[Stage::Intake, Stage::Proposal, Stage::Complete],
    }
}

/// Shorthand for building export rows in tests.
pub fn row(pairs: &[(&str, &str)]) -> ExternalRecord {
    ExternalRecord::from_pairs(pairs)
}
