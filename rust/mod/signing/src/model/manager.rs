use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "manager" => Some(Role::Manager),
            _ => None,
        }
    }
}

/// Input for a roster entry. A missing `id` is generated.
#[derive(Debug, Clone, Deserialize)]
pub struct NewManager {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub email: String,
}

/// A roster entry just created, with its one-time initial password.
#[derive(Debug, Clone)]
pub struct ManagerCreated {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub initial_password: String,
}

/// Roster projection without the password hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerSummary {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// Login identifier plus password.
#[derive(Debug, Clone)]
pub struct Credential {
    /// An email address or an account `"{id}_{domain}"`.
    pub identifier: String,
    pub password: String,
}

/// Result of a successful manager authentication.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagerCheck {
    pub link_id: String,
    pub signing_id: String,
    pub manager_id: String,
    pub role: Role,
    pub name: String,
    pub email: String,
    pub corp_id: String,
    pub corporation_name: String,
    /// False until the initial password has been replaced.
    pub password_changed: bool,
}

/// How a password reset proves authority.
#[derive(Debug, Clone)]
pub enum PasswordChange {
    /// The caller knows the current password.
    Verified { old: String },
    /// Administrative reset; no proof of the current password. The
    /// signing id picks the roster when the email manages more than one
    /// corporation under the link.
    Override { signing_id: Option<String> },
}
