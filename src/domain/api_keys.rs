//! API keys and the roles they carry.

use serde::{Deserialize, Serialize};
use sqlx::Type;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

use super::error::DomainError;

/// Role granted to a key. Admins reach the admin listener; authors manage their own posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "api_role", rename_all = "snake_case")]
pub enum ApiRole {
    Admin,
    Author,
}

impl ApiRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Author => "author",
        }
    }
}

impl Display for ApiRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "author" => Ok(Self::Author),
            other => Err(DomainError::unknown_variant("api role", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiKeyRecord {
    pub id: Uuid,
    pub name: String,
    pub prefix: String,
    #[serde(skip_serializing)]
    pub hashed_secret: Vec<u8>,
    pub role: ApiRole,
    pub expires_at: Option<OffsetDateTime>,
    pub revoked_at: Option<OffsetDateTime>,
    pub last_used_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl ApiKeyRecord {
    pub fn is_active_at(&self, now: OffsetDateTime) -> bool {
        if self.revoked_at.is_some_and(|at| at <= now) {
            return false;
        }
        self.expires_at.is_none_or(|at| at > now)
    }
}
