use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::pagination::{Page, PageRequest},
    application::repos::{
        CreatePostParams, PostQueryFilter, PostsRepo, RepoError, UpdatePostParams,
    },
    domain::{entities::PostRecord, types::PostStatus},
};

use super::{PostgresRepositories, map_sqlx_error};

const POST_COLUMNS: &str = "id, slug, title, summary, body_markdown, body_html, category, tags, \
     cover, status, author, published_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct PostRow {
    id: Uuid,
    slug: String,
    title: String,
    summary: Option<String>,
    body_markdown: String,
    body_html: String,
    category: Option<String>,
    tags: Vec<String>,
    cover: Option<String>,
    status: PostStatus,
    author: String,
    published_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            title: row.title,
            summary: row.summary,
            body_markdown: row.body_markdown,
            body_html: row.body_html,
            category: row.category,
            tags: row.tags,
            cover: row.cover,
            status: row.status,
            author: row.author,
            published_at: row.published_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn push_filters<'q>(qb: &mut QueryBuilder<'q, Postgres>, filter: &'q PostQueryFilter) {
    if let Some(status) = filter.status {
        qb.push(" AND status = ");
        qb.push_bind(status);
    }
    if let Some(author) = filter.author.as_ref() {
        qb.push(" AND author = ");
        qb.push_bind(author);
    }
    if let Some(category) = filter.category.as_ref() {
        qb.push(" AND category = ");
        qb.push_bind(category);
    }
    if let Some(tag) = filter.tag.as_ref() {
        qb.push(" AND ");
        qb.push_bind(tag);
        qb.push(" = ANY(tags)");
    }
    if let Some(search) = filter.search.as_ref() {
        let pattern = format!("%{search}%");
        qb.push(" AND (title ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR COALESCE(summary, '') ILIKE ");
        qb.push_bind(pattern);
        qb.push(")");
    }
}

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn list_posts(
        &self,
        filter: &PostQueryFilter,
        page: PageRequest,
    ) -> Result<Page<PostRecord>, RepoError> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM posts WHERE 1=1 ");
        push_filters(&mut count, filter);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut qb = QueryBuilder::new(format!("SELECT {POST_COLUMNS} FROM posts WHERE 1=1 "));
        push_filters(&mut qb, filter);
        qb.push(" ORDER BY COALESCE(published_at, created_at) DESC, id DESC LIMIT ");
        qb.push_bind(page.limit());
        qb.push(" OFFSET ");
        qb.push_bind(page.offset());

        let rows: Vec<PostRow> = qb
            .build_query_as()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(Page::new(
            rows.into_iter().map(PostRecord::from).collect(),
            Self::convert_count(total)?,
            page,
        ))
    }

    async fn list_by_author(
        &self,
        author: &str,
        category: Option<&str>,
        tag: Option<&str>,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let rows = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM posts \
             WHERE author = $1 \
               AND ($2::text IS NULL OR category = $2) \
               AND ($3::text IS NULL OR $3 = ANY(tags)) \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(author)
        .bind(category)
        .bind(tag)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PostRecord::from).collect())
    }

    async fn find_post(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(PostRecord::from))
    }

    async fn find_post_by_slug(&self, slug: &str) -> Result<Option<PostRecord>, RepoError> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(PostRecord::from))
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, RepoError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM posts WHERE slug = $1)")
            .bind(slug)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let now = OffsetDateTime::now_utc();
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "INSERT INTO posts (id, slug, title, summary, body_markdown, body_html, category, \
                 tags, cover, status, author, published_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13) \
             RETURNING {POST_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(params.slug)
        .bind(params.title)
        .bind(params.summary)
        .bind(params.body_markdown)
        .bind(params.body_html)
        .bind(params.category)
        .bind(params.tags)
        .bind(params.cover)
        .bind(params.status)
        .bind(params.author)
        .bind(params.published_at)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "UPDATE posts SET title = $2, summary = $3, body_markdown = $4, body_html = $5, \
                 category = $6, tags = $7, cover = $8, status = $9, published_at = $10, \
                 updated_at = $11 \
             WHERE id = $1 \
             RETURNING {POST_COLUMNS}"
        ))
        .bind(params.id)
        .bind(params.title)
        .bind(params.summary)
        .bind(params.body_markdown)
        .bind(params.body_html)
        .bind(params.category)
        .bind(params.tags)
        .bind(params.cover)
        .bind(params.status)
        .bind(params.published_at)
        .bind(OffsetDateTime::now_utc())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(PostRecord::from).ok_or(RepoError::NotFound)
    }

    async fn delete_post(&self, id: Uuid) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
