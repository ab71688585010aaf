use serde::{Deserialize, Serialize};

use crate::CoreError;

/// The eight pipeline stages, in their fixed pipeline order.
///
/// The transition graph is static and identical for all users; role
/// filtering sits in a separate layer on top (see the engine crate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    New,
    Intake,
    NeedsMoreInfo,
    InResearch,
    Shaping,
    Proposal,
    Review,
    Complete,
}

pub const ALL_STAGES: [Stage; 8] = [
    Stage::New,
    Stage::Intake,
    Stage::NeedsMoreInfo,
    Stage::InResearch,
    Stage::Shaping,
    Stage::Proposal,
    Stage::Review,
    Stage::Complete,
];

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Intake => "Intake",
            Self::NeedsMoreInfo => "Needs More Info",
            Self::InResearch => "In Research",
            Self::Shaping => "Shaping",
            Self::Proposal => "Proposal",
            Self::Review => "Review",
            Self::Complete => "Complete",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "New" => Ok(Self::New),
            "Intake" => Ok(Self::Intake),
            "Needs More Info" => Ok(Self::NeedsMoreInfo),
            "In Research" => Ok(Self::InResearch),
            "Shaping" => Ok(Self::Shaping),
            "Proposal" => Ok(Self::Proposal),
            "Review" => Ok(Self::Review),
            "Complete" => Ok(Self::Complete),
            _ => Err(CoreError::UnknownStage(s.to_string())),
        }
    }

    /// Static out-edges of the stage graph. `Complete` is the sole
    /// terminal and returns the empty slice.
    pub fn transitions(&self) -> &'static [Stage] {
        match self {
            Self::New => &[Stage::Intake],
            Self::Intake => &[
                Stage::NeedsMoreInfo,
                Stage::InResearch,
                Stage::Shaping,
                Stage::Proposal,
            ],
            Self::NeedsMoreInfo => &[
                Stage::Intake,
                Stage::InResearch,
                Stage::Shaping,
                Stage::Proposal,
            ],
            Self::InResearch => &[Stage::Shaping, Stage::Proposal],
            Self::Shaping => &[Stage::Proposal],
            Self::Proposal => &[Stage::Review, Stage::Complete],
            Self::Review => &[Stage::Proposal, Stage::Complete],
            Self::Complete => &[],
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.transitions().is_empty()
    }

    /// Translate a Salesforce "Intake Status" value to a local stage.
    ///
    /// The mapping is part of the import contract. Empty or unrecognized
    /// values map to `New` rather than failing the row.
    pub fn from_intake_status(raw: &str) -> Self {
        match raw.trim() {
            "Needs More Info" => Self::NeedsMoreInfo,
            "In Shaping" => Self::Shaping,
            "In Research" => Self::InResearch,
            "In Proposal" => Self::Proposal,
            _ => Self::New,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a completed opportunity. Meaningful only at `Complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WonStatus {
    #[default]
    Unknown,
    Won,
    Lost,
}

impl WonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Won => "won",
            Self::Lost => "lost",
        }
    }
}
