//! Email delivery for the password reset flow

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;
use std::time::Duration;

use crate::config::ConfigError;

const SMTP_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Outgoing mail transport used by the auth service
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, from: &str, to: &str, subject: &str, html_body: &str)
        -> Result<(), MailError>;
}

/// SMTP configuration
#[derive(Clone)]
pub struct SmtpConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
}

impl SmtpConfig {
    /// `Ok(None)` when SMTP is not configured.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let (host, username, password) = match (
            std::env::var("SMTP_HOST"),
            std::env::var("TRAVAIL_EMAIL"),
            std::env::var("TRAVAIL_APP_PASS"),
        ) {
            (Ok(host), Ok(username), Ok(password)) => (host, username, password),
            _ => return Ok(None),
        };

        let smtp_port = match std::env::var("SMTP_PORT") {
            Ok(port) => port.parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                name: "SMTP_PORT",
                reason: e.to_string(),
            })?,
            Err(_) => 587,
        };

        Ok(Some(Self {
            smtp_host: host,
            smtp_port,
            smtp_username: username,
            smtp_password: password,
        }))
    }
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .finish_non_exhaustive()
    }
}

/// SMTP mailer (STARTTLS relay)
pub struct SmtpMailer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Fails when the account address is unusable as a sender or the relay
    /// cannot be set up.
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        config.smtp_username.parse::<Mailbox>()?;
        let creds = Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(creds)
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        Ok(Self { mailer })
    }
}

#[async_trait]
impl MailSender for SmtpMailer {
    async fn send(
        &self,
        from: &str,
        to: &str,
        subject: &str,
        html_body: &str,
    ) -> Result<(), MailError> {
        let email = Message::builder()
            .from(from.parse()?)
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())?;

        self.mailer.send(email).await?;
        Ok(())
    }
}

/// Mailer for development: logs instead of sending
pub struct LogMailer;

#[async_trait]
impl MailSender for LogMailer {
    async fn send(
        &self,
        from: &str,
        to: &str,
        subject: &str,
        html_body: &str,
    ) -> Result<(), MailError> {
        log::info!("[MOCK EMAIL] {} -> {} ({})", from, to, subject);
        // Body holds a live reset link
        log::debug!("[MOCK EMAIL] body: {}", html_body);
        Ok(())
    }
}

/// Pick the SMTP mailer when configured, else the logging one.
///
/// A configured SMTP setup that cannot be built is an error, never a silent
/// switch to the logging mailer.
pub fn mailer_from_config(config: Option<&SmtpConfig>) -> Result<Arc<dyn MailSender>, MailError> {
    match config {
        Some(config) => {
            let mailer = SmtpMailer::new(config)?;
            log::info!("SMTP mailer ready ({}:{})", config.smtp_host, config.smtp_port);
            Ok(Arc::new(mailer))
        }
        None => {
            log::info!("Email not configured. Using mock email service.");
            Ok(Arc::new(LogMailer))
        }
    }
}

/// Render the forgot-password email body
pub fn render_reset_email(name: &str, reset_url: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Reset your password</title>
</head>
<body style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h1 style="color: #333;">Password Reset Request</h1>
    <p>Hi {name},</p>
    <p>We received a request to reset your password. Click the button below to choose a new one:</p>
    <p style="text-align: center; margin: 30px 0;">
        <a href="{url}" style="background-color: #2196F3; color: white; padding: 14px 28px; text-decoration: none; border-radius: 4px; display: inline-block;">
            Reset Password
        </a>
    </p>
    <p>Or copy and paste this link into your browser:</p>
    <p style="word-break: break-all; color: #666;">{url}</p>
    <p style="color: #999; font-size: 12px; margin-top: 30px;">
        This link will expire in 15 minutes. If you didn't request a password reset, you can safely ignore this email.
    </p>
</body>
</html>"#,
        name = escape_html(name),
        url = escape_html(reset_url),
    )
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
