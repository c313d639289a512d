//! Blog posts: public reading, author self-service and admin management.

use std::sync::Arc;

use driftwood_api_types::PostPayload;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::application::api_keys::ApiPrincipal;
use crate::application::markdown::render_markdown;
use crate::application::pagination::{Page, PageRequest};
use crate::application::repos::{
    CreatePostParams, PostQueryFilter, PostsRepo, RepoError, UpdatePostParams,
};
use crate::domain::entities::PostRecord;
use crate::domain::error::DomainError;
use crate::domain::slug::{SlugError, unique_slug};
use crate::domain::types::PostStatus;

const MAX_TITLE_CHARS: usize = 200;
const MAX_TAGS: usize = 16;

#[derive(Debug, Error)]
pub enum PostError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("post not found")]
    NotFound,
    #[error("you may only modify your own posts")]
    Forbidden,
    #[error("cannot allocate a slug: {0}")]
    Slug(String),
}

#[derive(Clone)]
pub struct PostService {
    repo: Arc<dyn PostsRepo>,
}

impl PostService {
    pub fn new(repo: Arc<dyn PostsRepo>) -> Self {
        Self { repo }
    }

    /// Published posts, newest first.
    pub async fn list_published(
        &self,
        mut filter: PostQueryFilter,
        page: PageRequest,
    ) -> Result<Page<PostRecord>, PostError> {
        filter.status = Some(PostStatus::Published);
        filter.author = None;
        Ok(self.repo.list_posts(&filter, page).await?)
    }

    pub async fn get_published(&self, slug: &str) -> Result<PostRecord, PostError> {
        let post = self
            .repo
            .find_post_by_slug(slug.trim())
            .await?
            .ok_or(PostError::NotFound)?;
        if post.status != PostStatus::Published {
            return Err(PostError::NotFound);
        }
        Ok(post)
    }

    pub async fn list_mine(
        &self,
        author: &str,
        category: Option<&str>,
        tag: Option<&str>,
    ) -> Result<Vec<PostRecord>, PostError> {
        let category = category.map(str::trim).filter(|value| !value.is_empty());
        let tag = tag.map(str::trim).filter(|value| !value.is_empty());
        Ok(self.repo.list_by_author(author, category, tag).await?)
    }

    pub async fn list_admin(
        &self,
        filter: PostQueryFilter,
        page: PageRequest,
    ) -> Result<Page<PostRecord>, PostError> {
        Ok(self.repo.list_posts(&filter, page).await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<PostRecord, PostError> {
        self.repo.find_post(id).await?.ok_or(PostError::NotFound)
    }

    #[instrument(skip(self, payload), fields(author = %actor.name))]
    pub async fn create(
        &self,
        actor: &ApiPrincipal,
        payload: PostPayload,
    ) -> Result<PostRecord, PostError> {
        let draft = PostDraft::validate(payload)?;

        let repo = self.repo.clone();
        let slug = unique_slug(&draft.title, |candidate| {
            let repo = repo.clone();
            async move { repo.slug_exists(&candidate).await }
        })
        .await
        .map_err(|err| match err {
            SlugError::Lookup(repo_err) => PostError::Repo(repo_err),
            other => PostError::Slug(other.to_string()),
        })?;

        let published_at = (draft.status == PostStatus::Published).then(OffsetDateTime::now_utc);
        let body_html = render_markdown(&draft.content);

        let post = self
            .repo
            .create_post(CreatePostParams {
                slug,
                title: draft.title,
                summary: draft.summary,
                body_markdown: draft.content,
                body_html,
                category: draft.category,
                tags: draft.tags,
                cover: draft.cover,
                status: draft.status,
                author: actor.name.clone(),
                published_at,
            })
            .await?;

        info!(target = "driftwood::posts", post_id = %post.id, slug = %post.slug, "post created");
        Ok(post)
    }

    #[instrument(skip(self, payload), fields(author = %actor.name))]
    pub async fn update(
        &self,
        actor: &ApiPrincipal,
        id: Uuid,
        payload: PostPayload,
    ) -> Result<PostRecord, PostError> {
        let existing = self.owned(actor, id).await?;
        let draft = PostDraft::validate(payload)?;

        // first publication stamps the date; later edits keep it
        let published_at = match draft.status {
            PostStatus::Published => existing.published_at.or_else(|| Some(OffsetDateTime::now_utc())),
            PostStatus::Draft => existing.published_at,
        };
        let body_html = render_markdown(&draft.content);

        let post = self
            .repo
            .update_post(UpdatePostParams {
                id,
                title: draft.title,
                summary: draft.summary,
                body_markdown: draft.content,
                body_html,
                category: draft.category,
                tags: draft.tags,
                cover: draft.cover,
                status: draft.status,
                published_at,
            })
            .await?;

        info!(target = "driftwood::posts", post_id = %post.id, "post updated");
        Ok(post)
    }

    pub async fn delete(&self, actor: &ApiPrincipal, id: Uuid) -> Result<(), PostError> {
        self.owned(actor, id).await?;
        self.repo.delete_post(id).await?;
        info!(target = "driftwood::posts", post_id = %id, actor = %actor.name, "post deleted");
        Ok(())
    }

    async fn owned(&self, actor: &ApiPrincipal, id: Uuid) -> Result<PostRecord, PostError> {
        let post = self.get(id).await?;
        if !actor.is_admin() && post.author != actor.name {
            return Err(PostError::Forbidden);
        }
        Ok(post)
    }
}

struct PostDraft {
    title: String,
    content: String,
    summary: Option<String>,
    category: Option<String>,
    tags: Vec<String>,
    cover: Option<String>,
    status: PostStatus,
}

impl PostDraft {
    fn validate(payload: PostPayload) -> Result<Self, DomainError> {
        let title = payload.title.trim().to_string();
        if title.is_empty() {
            return Err(DomainError::validation("title", "title must not be empty"));
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(DomainError::validation(
                "title",
                format!("title must be at most {MAX_TITLE_CHARS} characters"),
            ));
        }
        if payload.content.trim().is_empty() {
            return Err(DomainError::validation(
                "content",
                "content must not be empty",
            ));
        }

        let status = match payload.status.as_deref().map(str::trim) {
            None | Some("") => PostStatus::Draft,
            Some(raw) => raw.parse()?,
        };

        let mut tags: Vec<String> = Vec::new();
        for tag in payload.tags {
            let tag = tag.trim();
            if !tag.is_empty() && !tags.iter().any(|seen| seen == tag) {
                tags.push(tag.to_string());
            }
        }
        if tags.len() > MAX_TAGS {
            return Err(DomainError::validation(
                "tags",
                format!("at most {MAX_TAGS} tags are allowed"),
            ));
        }

        Ok(Self {
            title,
            content: payload.content,
            summary: trimmed(payload.summary),
            category: trimmed(payload.category),
            tags,
            cover: trimmed(payload.cover),
            status,
        })
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
