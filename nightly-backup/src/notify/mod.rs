//! Status notification over SMTP.
//!
//! A report is one HTML message sent to every recipient in a single SMTP
//! transaction (connect, login, send, quit).

pub mod disk;
pub mod report;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::config::{SmtpConfig, SmtpSecurity};
use crate::utils::errors::{with_timeout, BackupError, Result};

pub use disk::DiskUsageCheck;
pub use report::{render_failure, render_report, RunReport};

/// Delivers an HTML message to a list of recipients.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, subject: &str, html_body: &str, recipients: &[String]) -> Result<()>;
}

/// [`Mailer`] backed by an authenticated SMTP relay.
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    config: SmtpConfig,
    timeout_secs: u64,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig, timeout_secs: u64) -> Self {
        Self {
            config: config.clone(),
            timeout_secs,
        }
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let server = self.config.server.as_str();
        let builder = match self.config.security {
            SmtpSecurity::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(server),
            SmtpSecurity::Starttls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(server)?,
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(server)?,
        };

        Ok(builder
            .port(self.config.port())
            .credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.clone(),
            ))
            .timeout(Some(Duration::from_secs(self.timeout_secs)))
            .build())
    }
}

/// Build the MIME message for `recipients`.
pub fn build_message(from: &str, subject: &str, html_body: &str, recipients: &[String]) -> Result<Message> {
    if recipients.is_empty() {
        return Err(BackupError::Mail("no recipients".into()));
    }

    let mut builder = Message::builder()
        .from(from.parse::<Mailbox>()?)
        .subject(subject)
        .header(ContentType::TEXT_HTML);
    for recipient in recipients {
        builder = builder.to(recipient.parse::<Mailbox>()?);
    }

    Ok(builder.body(html_body.to_string())?)
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, subject: &str, html_body: &str, recipients: &[String]) -> Result<()> {
        let message = build_message(self.config.sender(), subject, html_body, recipients)?;
        let transport = self.transport()?;

        with_timeout("smtp", self.timeout_secs, async {
            transport.send(message).await?;
            Ok(())
        })
        .await
    }
}

/// Sends reports through a [`Mailer`] to the configured recipients.
#[derive(Clone)]
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    recipients: Vec<String>,
    subject: String,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, recipients: Vec<String>, subject: String) -> Self {
        Self {
            mailer,
            recipients,
            subject,
        }
    }

    /// Send `html_body` to `recipients`.
    pub async fn notify(&self, subject: &str, html_body: &str, recipients: &[String]) -> Result<()> {
        let start_time = Instant::now();
        self.mailer.send(subject, html_body, recipients).await?;

        info!(
            recipients = ?recipients,
            elapsed_secs = start_time.elapsed().as_secs(),
            "Sent notification email"
        );
        Ok(())
    }

    pub async fn send_report(&self, report: &RunReport) -> Result<()> {
        let body = render_report(report)?;
        self.notify(&self.subject, &body, &self.recipients).await
    }

    pub async fn send_failure(&self, host: &str, timestamp: chrono::DateTime<chrono::Local>, error: &str) -> Result<()> {
        let subject = format!("[FAILED] {}", self.subject);
        let body = render_failure(host, timestamp, error)?;
        self.notify(&subject, &body, &self.recipients).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smtp(server: &str, port: u16) -> SmtpConfig {
        SmtpConfig {
            server: server.to_string(),
            port: Some(port),
            username: "robot@example.com".to_string(),
            password: "pw".to_string(),
            security: SmtpSecurity::None,
            from: None,
        }
    }

    #[test]
    fn test_build_message_headers() {
        let message = build_message(
            "robot@example.com",
            "Nightly backup report",
            "<p>ok</p>",
            &["ops@example.com".to_string(), "dba@example.com".to_string()],
        )
        .unwrap();

        assert_eq!(message.envelope().to().len(), 2);
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: Nightly backup report"));
        assert!(raw.contains("Content-Type: text/html; charset=utf-8"));
        assert!(raw.contains("<p>ok</p>"));
    }

    #[test]
    fn test_build_message_rejects_bad_input() {
        assert!(build_message("robot@example.com", "s", "b", &[]).is_err());
        assert!(build_message("robot@example.com", "s", "b", &["not an address".to_string()]).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_relay_is_an_error() {
        // Nothing listens on the discard port locally
        let mailer = SmtpMailer::new(&smtp("127.0.0.1", 9), 5);
        let err = mailer
            .send("s", "<p>b</p>", &["ops@example.com".to_string()])
            .await
            .unwrap_err();

        assert!(matches!(err, BackupError::Mail(_) | BackupError::Timeout { .. }));
    }
}
