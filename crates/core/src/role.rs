use serde::{Deserialize, Serialize};

/// User roles, as a closed enum so permission checks stay exhaustive.
///
/// `Specialist` is the plain-contributor tier; unrecognized role strings
/// parse to it, so a user record with a stale or misspelled role degrades
/// to the least-privileged non-admin tier instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    GtmLead,
    Gtm,
    PracticeLead,
    Poc,
    Specialist,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::GtmLead => "gtm_lead",
            Self::Gtm => "gtm",
            Self::PracticeLead => "practice_lead",
            Self::Poc => "poc",
            Self::Specialist => "specialist",
        }
    }

    /// Lenient parse: unknown strings fall through to `Specialist`.
    pub fn parse(s: &str) -> Self {
        match s {
            "admin" => Self::Admin,
            "gtm_lead" => Self::GtmLead,
            "gtm" => Self::Gtm,
            "practice_lead" => Self::PracticeLead,
            "poc" => Self::Poc,
            _ => Self::Specialist,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
