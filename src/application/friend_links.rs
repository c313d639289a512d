//! Friend-link applications and their moderation.

use std::sync::Arc;

use driftwood_api_types::FriendLinkApplication;
use thiserror::Error;
use tracing::info;
use url::Url;
use uuid::Uuid;

use crate::application::email::EmailService;
use crate::application::repos::{FriendLinksRepo, NewFriendLink, RepoError};
use crate::domain::email::is_valid_email;
use crate::domain::entities::FriendLinkRecord;
use crate::domain::error::DomainError;
use crate::domain::types::FriendLinkStatus;

#[derive(Debug, Error)]
pub enum FriendLinkError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("friend link not found")]
    NotFound,
}

#[derive(Clone)]
pub struct FriendLinkService {
    repo: Arc<dyn FriendLinksRepo>,
    email: EmailService,
}

impl FriendLinkService {
    pub fn new(repo: Arc<dyn FriendLinksRepo>, email: EmailService) -> Self {
        Self { repo, email }
    }

    /// Store an application for review and tell the owner about it.
    pub async fn apply(
        &self,
        application: FriendLinkApplication,
    ) -> Result<FriendLinkRecord, FriendLinkError> {
        let name = application.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name", "site name must not be empty").into());
        }
        let url = application.url.trim();
        if url.is_empty() {
            return Err(DomainError::validation("url", "site url must not be empty").into());
        }
        let parsed = Url::parse(url)
            .map_err(|err| DomainError::validation("url", format!("invalid url: {err}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DomainError::validation("url", "url must use http or https").into());
        }
        let email = application.email.trim();
        if !is_valid_email(email) {
            return Err(DomainError::validation("email", "email address is malformed").into());
        }

        let link = self
            .repo
            .create_link(NewFriendLink {
                name: name.to_string(),
                url: url.to_string(),
                avatar: trimmed(application.avatar),
                description: trimmed(application.description),
                email: email.to_string(),
            })
            .await?;

        info!(target = "driftwood::friend_links", link_id = %link.id, url = %link.url, "friend link application received");

        self.email.notice_me(
            "New friend-link application",
            format!(
                "Site: {}\nURL: {}\nContact: {}\nDescription: {}",
                link.name,
                link.url,
                link.email,
                link.description.as_deref().unwrap_or("-")
            ),
        );

        Ok(link)
    }

    pub async fn list_public(&self) -> Result<Vec<FriendLinkRecord>, FriendLinkError> {
        Ok(self.repo.list_links(Some(FriendLinkStatus::Up)).await?)
    }

    pub async fn list_admin(
        &self,
        status: Option<FriendLinkStatus>,
    ) -> Result<Vec<FriendLinkRecord>, FriendLinkError> {
        Ok(self.repo.list_links(status).await?)
    }

    pub async fn approve(&self, id: Uuid) -> Result<FriendLinkRecord, FriendLinkError> {
        self.decide(id, FriendLinkStatus::Up, None).await
    }

    pub async fn reject(&self, id: Uuid, reason: &str) -> Result<FriendLinkRecord, FriendLinkError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(
                DomainError::validation("reason", "a rejection reason is required").into(),
            );
        }
        self.decide(id, FriendLinkStatus::Down, Some(reason.to_string()))
            .await
    }

    pub async fn delete(&self, ids: &[Uuid]) -> Result<u64, FriendLinkError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let removed = self.repo.delete_links(ids).await?;
        info!(target = "driftwood::friend_links", removed, "friend links deleted");
        Ok(removed)
    }

    async fn decide(
        &self,
        id: Uuid,
        status: FriendLinkStatus,
        reason: Option<String>,
    ) -> Result<FriendLinkRecord, FriendLinkError> {
        let previous = self
            .repo
            .find_link(id)
            .await?
            .ok_or(FriendLinkError::NotFound)?;
        let link = self.repo.update_link_status(id, status, reason).await?;

        if previous.status == status {
            info!(target = "driftwood::friend_links", link_id = %id, status = %status, "friend link status unchanged, no email sent");
            return Ok(link);
        }
        info!(target = "driftwood::friend_links", link_id = %id, status = %status, "friend link moderated");

        // the response does not wait for SMTP
        let email = self.email.clone();
        let notified = link.clone();
        tokio::spawn(async move {
            email.send_friend_email(&notified).await;
        });

        Ok(link)
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
