use std::sync::Arc;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{ApiKeysRepo, CreateApiKeyParams, RepoError};
use crate::domain::api_keys::{ApiKeyRecord, ApiRole};

const TOKEN_TAG: &str = "dw";
const PREFIX_LEN: usize = 12;
const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum ApiKeyError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("key name must not be empty")]
    EmptyName,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApiAuthError {
    #[error("missing api key")]
    Missing,
    #[error("invalid api key")]
    Invalid,
    #[error("expired api key")]
    Expired,
    #[error("revoked api key")]
    Revoked,
}

#[derive(Debug, Clone)]
pub struct ApiKeyIssued {
    pub record: ApiKeyRecord,
    pub token: String,
}

/// Identity resolved from a presented key; the name doubles as the post author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiPrincipal {
    pub key_id: Uuid,
    pub name: String,
    pub role: ApiRole,
}

impl ApiPrincipal {
    pub fn requires_admin(&self) -> Result<(), ApiAuthError> {
        match self.role {
            ApiRole::Admin => Ok(()),
            ApiRole::Author => Err(ApiAuthError::Invalid),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ApiRole::Admin
    }
}

#[derive(Clone)]
pub struct ApiKeyService {
    repo: Arc<dyn ApiKeysRepo>,
}

impl ApiKeyService {
    pub fn new(repo: Arc<dyn ApiKeysRepo>) -> Self {
        Self { repo }
    }

    pub async fn issue(
        &self,
        name: &str,
        role: ApiRole,
        expires_at: Option<OffsetDateTime>,
    ) -> Result<ApiKeyIssued, ApiKeyError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiKeyError::EmptyName);
        }

        let prefix = generate_prefix();
        let secret = generate_secret();
        let token = format!("{TOKEN_TAG}_{prefix}_{secret}");

        let record = self
            .repo
            .create_key(CreateApiKeyParams {
                name: name.to_string(),
                prefix,
                hashed_secret: hash_secret(&secret),
                role,
                expires_at,
            })
            .await?;

        tracing::info!(
            target = "driftwood::api_keys",
            key_id = %record.id,
            role = %record.role,
            "issued api key"
        );

        Ok(ApiKeyIssued { record, token })
    }

    pub async fn authenticate(&self, token: &str) -> Result<ApiPrincipal, ApiAuthError> {
        let parsed = parse_token(token).ok_or(ApiAuthError::Invalid)?;
        let record = self
            .repo
            .find_by_prefix(parsed.prefix)
            .await
            .map_err(|_| ApiAuthError::Invalid)?
            .ok_or(ApiAuthError::Invalid)?;

        let now = OffsetDateTime::now_utc();
        if record.revoked_at.is_some_and(|at| at <= now) {
            return Err(ApiAuthError::Revoked);
        }
        if record.expires_at.is_some_and(|at| at <= now) {
            return Err(ApiAuthError::Expired);
        }

        let presented = hash_secret(parsed.secret);
        if record.hashed_secret.ct_eq(&presented).unwrap_u8() == 0 {
            return Err(ApiAuthError::Invalid);
        }

        // best-effort; never delays authentication
        let repo = self.repo.clone();
        let key_id = record.id;
        tokio::spawn(async move {
            if let Err(err) = repo.update_last_used(key_id, now).await {
                tracing::debug!(target = "driftwood::api_keys", %key_id, error = %err, "last_used update failed");
            }
        });

        Ok(ApiPrincipal {
            key_id: record.id,
            name: record.name,
            role: record.role,
        })
    }

    pub async fn revoke(&self, id: Uuid) -> Result<(), ApiKeyError> {
        self.repo.revoke_key(id, OffsetDateTime::now_utc()).await?;
        Ok(())
    }

    /// Drop keys past their expiry. Driven by the maintenance worker.
    pub async fn expire_keys(&self) -> Result<u64, ApiKeyError> {
        let removed = self
            .repo
            .purge_expired_keys(OffsetDateTime::now_utc())
            .await?;
        Ok(removed)
    }
}

fn hash_secret(secret: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().to_vec()
}

fn generate_prefix() -> String {
    Uuid::new_v4().simple().to_string()[..PREFIX_LEN].to_string()
}

fn generate_secret() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

struct ParsedToken<'a> {
    prefix: &'a str,
    secret: &'a str,
}

fn parse_token(token: &str) -> Option<ParsedToken<'_>> {
    let mut parts = token.trim().splitn(3, '_');
    if parts.next()? != TOKEN_TAG {
        return None;
    }
    let prefix = parts.next()?;
    let secret = parts.next()?;
    if prefix.is_empty() || secret.len() < MIN_SECRET_LEN {
        return None;
    }
    Some(ParsedToken { prefix, secret })
}
