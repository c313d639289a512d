//! Records to wire views.

use driftwood_api_types::{
    AdminLogView, ApiKeyIssuedView, ExceptionLogView, FriendLinkView, JobLogView, JobView,
    PostView, SystemConfigView,
};

use crate::application::api_keys::ApiKeyIssued;
use crate::application::jobs::JobDetail;
use crate::domain::entities::{
    AdminLogRecord, ExceptionLogRecord, FriendLinkRecord, JobLogRecord, JobRecord, PostRecord,
    SystemConfigRecord,
};

impl From<PostRecord> for PostView {
    fn from(post: PostRecord) -> Self {
        Self {
            id: post.id,
            slug: post.slug,
            title: post.title,
            summary: post.summary,
            content_markdown: post.body_markdown,
            content_html: post.body_html,
            category: post.category,
            tags: post.tags,
            cover: post.cover,
            status: post.status.to_string(),
            author: post.author,
            published_at: post.published_at,
            created_at: post.created_at,
            updated_at: post.updated_at,
        }
    }
}

// the applicant's contact address stays private
impl From<FriendLinkRecord> for FriendLinkView {
    fn from(link: FriendLinkRecord) -> Self {
        Self {
            id: link.id,
            name: link.name,
            url: link.url,
            avatar: link.avatar,
            description: link.description,
            status: link.status.to_string(),
            created_at: link.created_at,
        }
    }
}

pub fn job_view(job: JobRecord, next_valid_time: Option<time::OffsetDateTime>) -> JobView {
    JobView {
        id: job.id,
        job_name: job.job_name,
        job_group: job.job_group,
        invoke_target: job.invoke_target,
        cron_expression: job.cron_expression,
        misfire_policy: job.misfire_policy.to_string(),
        concurrent: job.concurrent,
        status: job.status.to_string(),
        remark: job.remark,
        created_by: job.created_by,
        updated_by: job.updated_by,
        next_valid_time,
        created_at: job.created_at,
        updated_at: job.updated_at,
    }
}

impl From<JobRecord> for JobView {
    fn from(job: JobRecord) -> Self {
        job_view(job, None)
    }
}

impl From<JobDetail> for JobView {
    fn from(detail: JobDetail) -> Self {
        job_view(detail.job, detail.next_valid_time)
    }
}

impl From<JobLogRecord> for JobLogView {
    fn from(log: JobLogRecord) -> Self {
        Self {
            id: log.id,
            job_id: log.job_id,
            job_name: log.job_name,
            job_group: log.job_group,
            invoke_target: log.invoke_target,
            status: log.status.to_string(),
            message: log.message,
            exception_info: log.exception_info,
            started_at: log.started_at,
            finished_at: log.finished_at,
        }
    }
}

impl From<AdminLogRecord> for AdminLogView {
    fn from(log: AdminLogRecord) -> Self {
        Self {
            id: log.id,
            username: log.username,
            request_method: log.request_method,
            request_uri: log.request_uri,
            ip: log.ip,
            ip_source: log.ip_source,
            params: log.params,
            operation: log.operation,
            spend_ms: log.spend_ms,
            created_at: log.created_at,
        }
    }
}

impl From<ExceptionLogRecord> for ExceptionLogView {
    fn from(log: ExceptionLogRecord) -> Self {
        Self {
            id: log.id,
            username: log.username,
            request_method: log.request_method,
            request_uri: log.request_uri,
            ip: log.ip,
            ip_source: log.ip_source,
            params: log.params,
            operation: log.operation,
            exception_message: log.exception_message,
            created_at: log.created_at,
        }
    }
}

impl From<SystemConfigRecord> for SystemConfigView {
    fn from(config: SystemConfigRecord) -> Self {
        Self {
            site_name: config.site_name,
            site_url: config.site_url,
            email_host: config.email_host,
            email_port: config.email_port.and_then(|port| u16::try_from(port).ok()),
            email_username: config.email_username,
            email_password_set: config
                .email_password
                .as_deref()
                .is_some_and(|password| !password.is_empty()),
            owner_email: config.owner_email,
            ai_enabled: config.ai_enabled,
            updated_at: config.updated_at,
        }
    }
}

impl From<ApiKeyIssued> for ApiKeyIssuedView {
    fn from(issued: ApiKeyIssued) -> Self {
        Self {
            id: issued.record.id,
            name: issued.record.name,
            role: issued.record.role.to_string(),
            token: issued.token,
            expires_at: issued.record.expires_at,
        }
    }
}
