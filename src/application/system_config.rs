//! Runtime-editable site and mail-server settings.

use std::sync::Arc;

use driftwood_api_types::SystemConfigPayload;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::info;

use crate::application::api_keys::ApiPrincipal;
use crate::application::email::EmailService;
use crate::application::repos::{RepoError, SystemConfigRepo};
use crate::domain::email::is_valid_email;
use crate::domain::entities::SystemConfigRecord;
use crate::domain::error::DomainError;

#[derive(Debug, Error)]
pub enum SystemConfigError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("system configuration not found")]
    NotFound,
}

#[derive(Clone)]
pub struct SystemConfigService {
    repo: Arc<dyn SystemConfigRepo>,
    email: EmailService,
}

impl SystemConfigService {
    pub fn new(repo: Arc<dyn SystemConfigRepo>, email: EmailService) -> Self {
        Self { repo, email }
    }

    pub async fn get(&self) -> Result<SystemConfigRecord, SystemConfigError> {
        self.repo
            .load_config()
            .await?
            .ok_or(SystemConfigError::NotFound)
    }

    /// Persist new settings and rebuild the mail transport from them.
    ///
    /// An omitted password keeps the stored one.
    pub async fn update(
        &self,
        actor: &ApiPrincipal,
        payload: SystemConfigPayload,
    ) -> Result<SystemConfigRecord, SystemConfigError> {
        let site_name = payload.site_name.trim().to_string();
        if site_name.is_empty() {
            return Err(DomainError::validation("site_name", "must not be empty").into());
        }

        let site_url = trimmed(payload.site_url);
        if let Some(url) = site_url.as_deref()
            && url::Url::parse(url).is_err()
        {
            return Err(DomainError::validation("site_url", "must be an absolute URL").into());
        }

        let email_username = trimmed(payload.email_username);
        if let Some(username) = email_username.as_deref()
            && !is_valid_email(username)
        {
            return Err(
                DomainError::validation("email_username", "must be an email address").into(),
            );
        }

        let owner_email = trimmed(payload.owner_email);
        if let Some(owner) = owner_email.as_deref()
            && !is_valid_email(owner)
        {
            return Err(DomainError::validation("owner_email", "must be an email address").into());
        }

        if payload.email_port == Some(0) {
            return Err(DomainError::validation("email_port", "must be within 1..=65535").into());
        }

        let stored_password = self
            .repo
            .load_config()
            .await?
            .and_then(|current| current.email_password);
        let email_password = trimmed(payload.email_password).or(stored_password);

        let saved = self
            .repo
            .save_config(SystemConfigRecord {
                site_name,
                site_url,
                email_host: trimmed(payload.email_host),
                email_port: payload.email_port.map(i32::from),
                email_username,
                email_password,
                owner_email,
                ai_enabled: payload.ai_enabled,
                updated_at: OffsetDateTime::now_utc(),
            })
            .await?;

        info!(target = "driftwood::system_config", actor = %actor.name, "system config updated");
        self.email.reload().await;
        Ok(saved)
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
