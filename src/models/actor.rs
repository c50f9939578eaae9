//! Identities acting on records and the roles they resolve to.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// An authenticated caller, as extracted from request claims.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub email: Option<String>,
}

impl Actor {
    pub fn new(id: impl Into<String>, email: Option<String>) -> Self {
        Self {
            id: id.into(),
            email,
        }
    }

    /// Identity used for group lookups: the email when known, otherwise the id.
    pub fn directory_identity(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.id)
    }
}

/// Role of an actor relative to one specific record.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    BusinessAdmin,
    SuperAdmin,
    /// Neither the owner nor an admin.
    Anonymous,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::BusinessAdmin => "business_admin",
            Role::SuperAdmin => "super_admin",
            Role::Anonymous => "anonymous",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::BusinessAdmin | Role::SuperAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "owner" => Ok(Role::Owner),
            "business_admin" => Ok(Role::BusinessAdmin),
            "super_admin" => Ok(Role::SuperAdmin),
            "anonymous" => Ok(Role::Anonymous),
            other => Err(format!("unknown role `{other}`")),
        }
    }
}
