use serde::{Deserialize, Serialize};

use crate::ids::UserId;
use crate::role::Role;

/// An account in the tracker. New registrations start unapproved and
/// stay inert until an admin approves them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub active: bool,
    pub approved: bool,
    pub last_login: Option<i64>,
    pub login_count: u32,
}

impl User {
    pub fn new(name: &str, email: &str, role: Role) -> Self {
        Self {
            id: UserId::new(),
            name: name.to_string(),
            email: email.to_string(),
            role,
            active: true,
            approved: false,
            last_login: None,
            login_count: 0,
        }
    }

    /// Whether this account may act at all. Every permission predicate
    /// checks this first and fails closed.
    pub fn can_act(&self) -> bool {
        self.active && self.approved
    }
}
