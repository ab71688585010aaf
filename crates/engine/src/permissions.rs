//! Pure permission predicates.
//!
//! Nothing in this module has side effects or can fail: absent rights,
//! terminal stages, and inert accounts all come back as `false` or an
//! empty set. Callers own the actual mutation and the audit append.

use dealtrack_core::{
    opportunity::Opportunity,
    role::Role,
    stage::Stage,
    user::User,
};

/// Target of a stage-change request.
///
/// `Any` is the "is the stage-change UI worth showing at all" probe: it
/// asks whether at least one transition is open to this role from the
/// current stage. It is evaluated against the role-filtered set, never
/// treated as a stage name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageTarget {
    Stage(Stage),
    Any,
}

/// Static out-edges of the stage graph, before any role filtering.
pub fn valid_transitions(current: Stage) -> &'static [Stage] {
    current.transitions()
}

/// Role legality for a structurally valid transition.
fn role_allows(role: Role, current: Stage, target: Stage) -> bool {
    match role {
        Role::Admin => true,
        Role::GtmLead => {
            current == Stage::Intake
                && matches!(
                    target,
                    Stage::NeedsMoreInfo | Stage::InResearch | Stage::Shaping | Stage::Proposal
                )
        }
        Role::Gtm => {
            current == Stage::Proposal && matches!(target, Stage::Review | Stage::Complete)
        }
        // Content and assignment only; never stage changes.
        Role::PracticeLead | Role::Poc => false,
        Role::Specialist => current == Stage::New && target == Stage::Intake,
    }
}

/// Can `user` move `opp` to `target`? Structural legality is required
/// first; role legality second. Inert accounts always get `false`.
pub fn can_change_stage(user: &User, opp: &Opportunity, target: StageTarget) -> bool {
    if !user.can_act() {
        return false;
    }
    match target {
        StageTarget::Any => !available_stages(user, opp).is_empty(),
        StageTarget::Stage(t) => {
            opp.stage.transitions().contains(&t) && role_allows(user.role, opp.stage, t)
        }
    }
}

/// The structural transition set filtered to what this role may take,
/// in graph order. Admin gets the unfiltered structural set.
pub fn available_stages(user: &User, opp: &Opportunity) -> Vec<Stage> {
    if !user.can_act() {
        return Vec::new();
    }
    opp.stage
        .transitions()
        .iter()
        .copied()
        .filter(|t| role_allows(user.role, opp.stage, *t))
        .collect()
}

/// Can `user` edit content/assignment fields on `opp`?
pub fn can_edit(user: &User, opp: &Opportunity) -> bool {
    if !user.can_act() {
        return false;
    }
    match user.role {
        Role::Admin | Role::GtmLead | Role::Gtm => true,
        Role::PracticeLead => opp.stage == Stage::Shaping,
        Role::Poc => !matches!(opp.stage, Stage::New | Stage::Complete),
        Role::Specialist => opp.specialist == user.name,
    }
}

pub fn can_manage_users(user: &User) -> bool {
    user.can_act() && user.role == Role::Admin
}

/// Can `user` run the import pipeline (reconcile and apply batches)?
pub fn can_import(user: &User) -> bool {
    user.can_act() && matches!(user.role, Role::Admin | Role::GtmLead)
}
