// src/services/mailer.rs

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};

use crate::{
    config::{Config, SmtpConfig},
    error::AppError,
    models::order::Order,
};

/// A plain-text email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), AppError>;
}

/// Delivers mail over SMTP.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(smtp: &SmtpConfig) -> Result<Self, AppError> {
        // 465 is implicit TLS; anything else upgrades with STARTTLS.
        let builder = (if smtp.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
        })
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

        let transport = builder
            .port(smtp.port)
            .credentials(Credentials::new(
                smtp.username.clone(),
                smtp.password.clone(),
            ))
            .build();

        let from = smtp
            .from
            .parse::<Mailbox>()
            .map_err(|e| AppError::InternalServerError(format!("Invalid SMTP_FROM: {}", e)))?;

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: Email) -> Result<(), AppError> {
        let to = email
            .to
            .parse::<Mailbox>()
            .map_err(|e| AppError::BadRequest(format!("Invalid recipient: {}", e)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email.body)
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::InternalServerError(format!("SMTP send failed: {}", e)))?;
        Ok(())
    }
}

/// Writes emails to the log instead of sending them.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<(), AppError> {
        tracing::info!(to = %email.to, subject = %email.subject, "Email not sent (SMTP not configured)");
        tracing::debug!("{}", email.body);
        Ok(())
    }
}

/// Keeps every email in memory. Used by tests to read reset links.
#[derive(Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<Email>>,
}

impl MemoryMailer {
    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: Email) -> Result<(), AppError> {
        self.sent
            .lock()
            .map_err(|e| AppError::InternalServerError(e.to_string()))?
            .push(email);
        Ok(())
    }
}

/// SMTP when configured, otherwise the logging mailer.
pub fn from_config(config: &Config) -> Arc<dyn Mailer> {
    match &config.smtp {
        Some(smtp) => match SmtpMailer::new(smtp) {
            Ok(mailer) => Arc::new(mailer),
            Err(e) => {
                tracing::error!("SMTP setup failed, falling back to log mailer: {}", e);
                Arc::new(LogMailer)
            }
        },
        None => Arc::new(LogMailer),
    }
}

/// Sends without making the request wait; failures are logged.
pub fn send_in_background(mailer: Arc<dyn Mailer>, email: Email) {
    tokio::spawn(async move {
        let to = email.to.clone();
        if let Err(e) = mailer.send(email).await {
            tracing::error!("Failed to send email to {}: {}", to, e);
        }
    });
}

pub fn password_reset_email(to: &str, name: &str, link: &str) -> Email {
    Email {
        to: to.to_string(),
        subject: "Reset your NeoCart password".to_string(),
        body: format!(
            "Hi {},\n\nWe received a request to reset your password. \
             Open the link below within one hour to choose a new one:\n\n{}\n\n\
             If you did not ask for this, you can ignore this email.\n\nThe NeoCart team",
            name, link
        ),
    }
}

pub fn order_confirmation_email(to: &str, name: &str, order: &Order) -> Email {
    let lines: Vec<String> = order
        .items
        .iter()
        .map(|i| format!("  {} x{} (size {}) @ {}", i.name, i.quantity, i.size, i.price))
        .collect();
    Email {
        to: to.to_string(),
        subject: format!("NeoCart order #{} confirmed", order.id),
        body: format!(
            "Hi {},\n\nThanks for your order #{}.\n\n{}\n\nTotal: {} ({})\nStatus: {}\n\nThe NeoCart team",
            name,
            order.id,
            lines.join("\n"),
            order.amount,
            order.payment_method,
            order.status
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_mailer_records_messages() {
        let mailer = MemoryMailer::default();
        mailer
            .send(password_reset_email("a@b.co", "Ann", "http://x/reset-password/abc"))
            .await
            .unwrap();
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.contains("http://x/reset-password/abc"));
    }
}
