use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Seeker,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Seeker => "seeker",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "owner" => Ok(Role::Owner),
            "seeker" => Ok(Role::Seeker),
            other => Err(LedgerError::Validation(format!(
                "role must be owner or seeker, got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    /// Subject of the external identity this account signs in with, if linked.
    #[serde(skip_serializing, default)]
    pub external_subject: Option<String>,
    pub role: Role,
    /// Smallest currency unit.
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(email: String, name: String, password_hash: String, role: Role, balance: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email,
            name,
            password_hash,
            external_subject: None,
            role,
            balance,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_external_subject(mut self, subject: impl Into<String>) -> Self {
        self.external_subject = Some(subject.into());
        self
    }

    /// Whether an external identity with `subject` may sign in as this account.
    pub fn is_linked_to(&self, subject: &str) -> bool {
        self.external_subject.as_deref() == Some(subject)
    }
}

/// The authenticated principal behind a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub account_id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn new(account_id: Uuid, role: Role) -> Self {
        Self { account_id, role }
    }
}
