//! SMTP delivery through `lettre`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use crate::application::email::{
    MailError, MailServerConfig, MailTransport, MailTransportFactory, OutgoingMail,
};

const SMTPS_PORT: u16 = 465;
const SUBMISSION_PORT: u16 = 587;

/// Builds SMTP transports: implicit TLS on 465, STARTTLS on 587, plain elsewhere.
#[derive(Debug, Clone)]
pub struct LettreTransportFactory {
    timeout: Duration,
}

impl LettreTransportFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl MailTransportFactory for LettreTransportFactory {
    fn build(&self, config: &MailServerConfig) -> Result<Arc<dyn MailTransport>, MailError> {
        let host = config.host.trim();
        let builder = match config.port {
            SMTPS_PORT => AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|err| MailError::Transport(err.to_string()))?,
            SUBMISSION_PORT => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|err| MailError::Transport(err.to_string()))?,
            _ => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
        };

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(
                config.username.trim().to_string(),
                config.password.trim().to_string(),
            ))
            .timeout(Some(self.timeout))
            .build();

        debug!(target = "driftwood::mail", host, port = config.port, "smtp transport built");
        Ok(Arc::new(LettreTransport { transport }))
    }
}

pub struct LettreTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

#[async_trait]
impl MailTransport for LettreTransport {
    async fn send(&self, message: OutgoingMail) -> Result<(), MailError> {
        let message = build_message(message)?;
        self.transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(|err| MailError::Send(err.to_string()))
    }
}

fn build_message(mail: OutgoingMail) -> Result<Message, MailError> {
    let from: Mailbox = mail
        .from
        .parse()
        .map_err(|err| MailError::Build(format!("sender `{}`: {err}", mail.from)))?;
    let to: Mailbox = mail
        .to
        .parse()
        .map_err(|err| MailError::Build(format!("recipient `{}`: {err}", mail.to)))?;
    let content_type = if mail.html {
        ContentType::TEXT_HTML
    } else {
        ContentType::TEXT_PLAIN
    };

    Message::builder()
        .from(from)
        .to(to)
        .subject(mail.subject)
        .header(content_type)
        .body(mail.body)
        .map_err(|err| MailError::Build(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(port: u16) -> MailServerConfig {
        MailServerConfig {
            host: "smtp.example.com".into(),
            port,
            username: "noreply@example.com".into(),
            password: "secret".into(),
        }
    }

    #[tokio::test]
    async fn factory_builds_for_each_security_mode() {
        let factory = LettreTransportFactory::new(Duration::from_secs(10));
        for port in [465, 587, 25] {
            assert!(factory.build(&config(port)).is_ok(), "port {port}");
        }
    }

    #[test]
    fn html_message_builds() {
        let message = build_message(OutgoingMail {
            from: "noreply@example.com".into(),
            to: "reader@example.org".into(),
            subject: "Driftwood".into(),
            body: "<p>hi</p>".into(),
            html: true,
        })
        .expect("message");
        let raw = String::from_utf8(message.formatted()).expect("utf8");
        assert!(raw.contains("Subject: Driftwood"));
        assert!(raw.contains("text/html"));
    }

    #[test]
    fn malformed_recipient_is_a_build_error() {
        let err = build_message(OutgoingMail {
            from: "noreply@example.com".into(),
            to: "nobody".into(),
            subject: "x".into(),
            body: "x".into(),
            html: false,
        })
        .expect_err("bad recipient");
        assert!(matches!(err, MailError::Build(_)));
    }
}
