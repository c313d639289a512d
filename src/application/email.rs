//! Outbound email: friend-link decisions, owner notices and verification codes.
//!
//! The SMTP transport is built from the runtime system configuration, so it can
//! be absent (not configured yet) and is rebuilt whenever that configuration
//! changes. Sending never panics; callers on the request path detach sends.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use metrics::counter;
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::{sync::RwLock, task::JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::repos::{RepoError, SystemConfigRepo};
use crate::config::MailSettings;
use crate::domain::email::is_valid_email;
use crate::domain::entities::{FriendLinkRecord, VerificationCode};
use crate::domain::types::FriendLinkNotice;

/// Wrong guesses a stored code survives before it is discarded.
pub const MAX_CODE_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub html: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailServerConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("failed to build message: {0}")]
    Build(String),
    #[error("failed to build transport: {0}")]
    Transport(String),
    #[error("smtp delivery failed: {0}")]
    Send(String),
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: OutgoingMail) -> Result<(), MailError>;
}

pub trait MailTransportFactory: Send + Sync {
    fn build(&self, config: &MailServerConfig) -> Result<Arc<dyn MailTransport>, MailError>;
}

#[derive(Debug, Error)]
pub enum EmailError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Mail(#[from] MailError),
    #[error("mail service is not configured, please contact the administrator")]
    NotInitialized,
    #[error("recipient email address must not be empty")]
    EmptyRecipient,
    #[error("recipient email address is malformed: {0}")]
    InvalidRecipient(String),
    #[error("sender email address is not configured")]
    SenderMissing,
    #[error("sender email address is malformed: {0}")]
    InvalidSender(String),
    #[error("verification code is invalid or expired")]
    CodeRejected,
}

/// Ready-to-use sender, rebuilt on every (re)initialisation.
struct Mailer {
    transport: Arc<dyn MailTransport>,
    sender: String,
    site_name: String,
    site_url: Option<String>,
    owner_email: Option<String>,
}

#[derive(Clone)]
pub struct EmailService {
    config_repo: Arc<dyn SystemConfigRepo>,
    factory: Arc<dyn MailTransportFactory>,
    settings: MailSettings,
    mailer: Arc<RwLock<Option<Arc<Mailer>>>>,
    codes: Arc<DashMap<String, VerificationCode>>,
}

impl EmailService {
    pub fn new(
        config_repo: Arc<dyn SystemConfigRepo>,
        factory: Arc<dyn MailTransportFactory>,
        settings: MailSettings,
    ) -> Self {
        Self {
            config_repo,
            factory,
            settings,
            mailer: Arc::new(RwLock::new(None)),
            codes: Arc::new(DashMap::new()),
        }
    }

    /// Build the transport from the stored system configuration.
    ///
    /// Any problem is logged and leaves the service uninitialised.
    pub async fn init(&self) {
        let mailer = match self.build_mailer().await {
            Ok(mailer) => mailer,
            Err(reason) => {
                error!(target = "driftwood::email", %reason, "mail service not initialised");
                None
            }
        };
        let ready = mailer.is_some();
        *self.mailer.write().await = mailer.map(Arc::new);
        if ready {
            info!(target = "driftwood::email", "mail service initialised");
        }
    }

    pub async fn reload(&self) {
        self.init().await;
    }

    pub async fn is_initialized(&self) -> bool {
        self.mailer.read().await.is_some()
    }

    async fn build_mailer(&self) -> Result<Option<Mailer>, String> {
        let Some(config) = self
            .config_repo
            .load_config()
            .await
            .map_err(|err| format!("failed to load system config: {err}"))?
        else {
            warn!(target = "driftwood::email", "system config missing; mail disabled");
            return Ok(None);
        };

        let host = non_blank(config.email_host.as_deref())
            .ok_or_else(|| "mail server host is not configured".to_string())?;
        let username = non_blank(config.email_username.as_deref())
            .ok_or_else(|| "mail sender address is not configured".to_string())?;
        if !is_valid_email(&username) {
            return Err(format!("mail sender address is malformed: {username}"));
        }
        let password = non_blank(config.email_password.as_deref())
            .ok_or_else(|| "mail authorization code is not configured".to_string())?;
        let port = config
            .email_port
            .and_then(|port| u16::try_from(port).ok())
            .filter(|port| *port != 0)
            .ok_or_else(|| "mail server port is not configured".to_string())?;

        let server = MailServerConfig {
            host: host.clone(),
            port,
            username: username.clone(),
            password,
        };
        let transport = self.factory.build(&server).map_err(|err| err.to_string())?;

        info!(target = "driftwood::email", %host, port, sender = %username, "mail transport ready");

        Ok(Some(Mailer {
            transport,
            sender: username,
            site_name: config.site_name,
            site_url: non_blank(config.site_url.as_deref())
                .map(|url| url.trim_end_matches('/').to_string()),
            owner_email: non_blank(config.owner_email.as_deref()),
        }))
    }

    async fn current(&self) -> Result<Arc<Mailer>, EmailError> {
        self.mailer
            .read()
            .await
            .clone()
            .ok_or(EmailError::NotInitialized)
    }

    /// Send the email that matches the link's moderation outcome, if any.
    pub async fn send_friend_email(&self, link: &FriendLinkRecord) {
        match link.status.notification() {
            Some(FriendLinkNotice::Pass) => self.friend_pass_send_email(&link.email).await,
            Some(FriendLinkNotice::Reject) => {
                let reason = link.reason.as_deref().unwrap_or_default();
                self.friend_failed_send_email(&link.email, reason).await
            }
            None => {}
        }
    }

    pub async fn friend_pass_send_email(&self, email: &str) {
        let result = async {
            let mailer = self.current().await?;
            let body = friend_email_body(&mailer, "has been approved.");
            self.send_with(&mailer, email, body).await
        }
        .await;
        if let Err(err) = result {
            warn!(target = "driftwood::email", recipient = %email, error = %err, "friend-link approval email failed");
        }
    }

    pub async fn friend_failed_send_email(&self, email: &str, reason: &str) {
        let result = async {
            let mailer = self.current().await?;
            let verdict = format!(
                "was not approved. Reason: {}",
                ammonia::clean_text(reason)
            );
            let body = friend_email_body(&mailer, &verdict);
            self.send_with(&mailer, email, body).await
        }
        .await;
        if let Err(err) = result {
            warn!(target = "driftwood::email", recipient = %email, error = %err, "friend-link rejection email failed");
        }
    }

    /// Plain-text notice to the site owner, sent on a detached task.
    pub fn notice_me(&self, subject: impl Into<String>, content: impl Into<String>) -> JoinHandle<()> {
        let service = self.clone();
        let subject = subject.into();
        let content = content.into();
        tokio::spawn(async move {
            if let Err(err) = service.deliver_notice(subject, content).await {
                warn!(target = "driftwood::email", error = %err, "owner notice failed");
            }
        })
    }

    async fn deliver_notice(&self, subject: String, content: String) -> Result<(), EmailError> {
        let mailer = self.current().await?;
        let to = mailer
            .owner_email
            .clone()
            .or_else(|| self.settings.owner_address.clone())
            .unwrap_or_else(|| mailer.sender.clone());
        self.dispatch(
            &mailer,
            OutgoingMail {
                from: mailer.sender.clone(),
                to,
                subject,
                body: content,
                html: false,
            },
        )
        .await
    }

    /// Send a six-digit verification code and remember it for `code_ttl`.
    pub async fn send_code(&self, email: &str) -> Result<(), EmailError> {
        let mailer = self.current().await?;
        let recipient = validate_recipient(email)?;

        let code = generate_code();
        let body = code_email_body(&mailer, &code);
        self.send_with(&mailer, &recipient, body).await?;

        let now = OffsetDateTime::now_utc();
        let expires_at = time::Duration::try_from(self.settings.code_ttl)
            .ok()
            .and_then(|ttl| now.checked_add(ttl))
            .unwrap_or(now + time::Duration::minutes(5));
        self.codes.insert(
            recipient.clone(),
            VerificationCode {
                email: recipient.clone(),
                code,
                expires_at,
                failed_attempts: 0,
            },
        );
        info!(target = "driftwood::email", %recipient, "verification code sent");
        Ok(())
    }

    /// Consume a stored code. A code verifies at most once and is discarded
    /// after [`MAX_CODE_ATTEMPTS`] wrong guesses.
    pub fn verify_code(&self, email: &str, code: &str) -> Result<(), EmailError> {
        let key = email.trim();
        let presented = code.trim().as_bytes();
        let now = OffsetDateTime::now_utc();

        let mut verdict = Err(EmailError::CodeRejected);
        let removed = self.codes.remove_if_mut(key, |_, stored| {
            if stored.is_expired_at(now) {
                return true;
            }
            if bool::from(stored.code.as_bytes().ct_eq(presented)) {
                verdict = Ok(());
                return true;
            }
            stored.failed_attempts += 1;
            stored.failed_attempts >= MAX_CODE_ATTEMPTS
        });

        if verdict.is_err()
            && let Some((_, stored)) = removed
            && stored.failed_attempts >= MAX_CODE_ATTEMPTS
        {
            warn!(target = "driftwood::email", recipient = %key, "verification code discarded after repeated failures");
        }
        verdict
    }

    pub fn purge_expired_codes(&self) -> usize {
        let now = OffsetDateTime::now_utc();
        let before = self.codes.len();
        self.codes.retain(|_, code| !code.is_expired_at(now));
        before.saturating_sub(self.codes.len())
    }

    async fn send_with(
        &self,
        mailer: &Mailer,
        email: &str,
        html: String,
    ) -> Result<(), EmailError> {
        let recipient = validate_recipient(email)?;
        let sender = mailer.sender.trim();
        if sender.is_empty() {
            return Err(EmailError::SenderMissing);
        }
        if !is_valid_email(sender) {
            return Err(EmailError::InvalidSender(sender.to_string()));
        }

        debug!(target = "driftwood::email", %sender, %recipient, "sending mail");
        self.dispatch(
            mailer,
            OutgoingMail {
                from: sender.to_string(),
                to: recipient,
                subject: mailer.site_name.clone(),
                body: html,
                html: true,
            },
        )
        .await
    }

    async fn dispatch(&self, mailer: &Mailer, message: OutgoingMail) -> Result<(), EmailError> {
        match mailer.transport.send(message).await {
            Ok(()) => {
                counter!("driftwood_mail_sent_total").increment(1);
                Ok(())
            }
            Err(err) => {
                counter!("driftwood_mail_failed_total").increment(1);
                Err(err.into())
            }
        }
    }
}

fn validate_recipient(email: &str) -> Result<String, EmailError> {
    let recipient = email.trim();
    if recipient.is_empty() {
        return Err(EmailError::EmptyRecipient);
    }
    if !is_valid_email(recipient) {
        return Err(EmailError::InvalidRecipient(recipient.to_string()));
    }
    Ok(recipient.to_string())
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn generate_code() -> String {
    let n = 100_000 + (Uuid::new_v4().as_u128() % 900_000);
    n.to_string()
}

fn site_link(mailer: &Mailer) -> String {
    let name = ammonia::clean_text(&mailer.site_name);
    match mailer.site_url.as_deref() {
        Some(url) => format!("<a href='{}'>{name}</a>", ammonia::clean_text(url)),
        None => name,
    }
}

fn friend_email_body(mailer: &Mailer, verdict: &str) -> String {
    let links_page = match mailer.site_url.as_deref() {
        Some(url) => format!(
            "<p>You can find your site on <a href='{}'>our friend links page</a>.</p>",
            ammonia::clean_text(&format!("{url}/links"))
        ),
        None => String::new(),
    };
    format!(
        "<html>\n<body>\n<p>Your friend-link application on {site} {verdict}</p>\n\
         <p style='padding: 20px;'>Thank you for your interest. We keep this site stable and share quality articles; visits in both directions are welcome.</p>\n\
         {links_page}\n</body>\n</html>",
        site = site_link(mailer),
    )
}

fn code_email_body(mailer: &Mailer, code: &str) -> String {
    let site = ammonia::clean_text(&mailer.site_name);
    format!(
        "<html>\n<body>\n<h1 style=\"font-size: 26px; font-weight: bold;\">Verify your email address</h1>\n\
         <p>Thank you for using {site}. Enter this code in the verification box:</p>\n\
         <p style=\"text-align:center;font-size: 28px;font-weight: bold;background-color: #f2f2f2;border-radius: 5px;\">{code}</p>\n\
         <p>This message contains private account information; do not reply to or forward it.</p>\n\
         <hr>\n<p style=\"text-align: center;\">{site}</p>\n</body>\n</html>\n"
    )
}
