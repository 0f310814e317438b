// src/mailer.rs

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::Mailbox,
    transport::smtp::authentication::Credentials,
};
use sqlx::SqlitePool;

use crate::{
    config::Config,
    models::{result::QuizResult, user::User},
    settings,
};

/// Failed or impossible delivery. Logged at the dispatcher boundary and never
/// propagated to request handlers.
#[derive(Debug)]
pub struct DeliveryError(pub String);

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for DeliveryError {}

/// Outbound mail seam. The production implementation speaks SMTP; tests plug
/// in a recording mock.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError>;
}

/// SMTP mailer over a STARTTLS relay, with a short connect/send timeout so a
/// stuck relay cannot hold a dispatch task indefinitely.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_config(config: &Config) -> Result<Self, DeliveryError> {
        let host = config
            .email_host
            .as_deref()
            .ok_or_else(|| DeliveryError("EMAIL_HOST is not set".to_string()))?;
        let username = config
            .email_username
            .clone()
            .ok_or_else(|| DeliveryError("EMAIL_USERNAME is not set".to_string()))?;
        let password = config
            .email_password
            .clone()
            .ok_or_else(|| DeliveryError("EMAIL_PASSWORD is not set".to_string()))?;
        let from = config
            .email_from
            .as_deref()
            .ok_or_else(|| DeliveryError("EMAIL_FROM is not set".to_string()))?
            .parse::<Mailbox>()
            .map_err(|e| DeliveryError(format!("EMAIL_FROM is not a valid mailbox: {}", e)))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| DeliveryError(format!("Failed to build SMTP transport: {}", e)))?
            .port(config.email_port)
            .credentials(Credentials::new(username, password))
            .timeout(Some(Duration::from_secs(10)))
            .build();

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to
                .parse()
                .map_err(|e| DeliveryError(format!("Invalid recipient '{}': {}", to, e)))?)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| DeliveryError(format!("Failed to build message: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| DeliveryError(format!("SMTP send failed: {}", e)))
    }
}

/// Stand-in transport for deployments without SMTP credentials. Every send
/// fails, which the dispatcher logs and swallows.
pub struct NullMailer;

#[async_trait]
impl MailTransport for NullMailer {
    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), DeliveryError> {
        Err(DeliveryError("SMTP transport is not configured".to_string()))
    }
}

/// Emails a student their scored result.
///
/// No-op when notifications are disabled in settings or when the result is
/// already marked sent; at most one email ever goes out per result. Delivery
/// failure is logged and leaves `email_sent` false. This function never fails
/// the caller: result recording succeeds independently of delivery.
pub async fn notify_result(
    pool: &SqlitePool,
    transport: &dyn MailTransport,
    user: &User,
    quiz_title: &str,
    result: &QuizResult,
    total_items: usize,
) {
    // Re-read the flag so a repeated call with a stale struct stays a no-op.
    let already_sent: Option<bool> =
        match sqlx::query_scalar("SELECT email_sent FROM results WHERE id = ?")
            .bind(result.id)
            .fetch_optional(pool)
            .await
        {
            Ok(flag) => flag,
            Err(e) => {
                tracing::warn!("Skipping result email for result {}: {}", result.id, e);
                return;
            }
        };
    if already_sent.unwrap_or(false) {
        return;
    }

    match settings::get_or_create(pool).await {
        Ok(s) if !s.smtp_enabled => return,
        Ok(_) => {}
        Err(e) => {
            tracing::warn!("Skipping result email for result {}: {}", result.id, e);
            return;
        }
    }

    let Some(to) = user.email.as_deref().filter(|e| !e.is_empty()) else {
        tracing::info!(
            "User {} has no email address, result {} not sent",
            user.username,
            result.id
        );
        return;
    };

    let subject = format!("Your Quiz Results: {}", quiz_title);
    let body = format!(
        "Hello {},\n\n\
         You have completed the quiz \"{}\".\n\n\
         Your score: {}/{}\n\n\
         Regards,\nQuiz Team\n",
        user.username, quiz_title, result.score, total_items
    );

    match transport.send(to, &subject, &body).await {
        Ok(()) => {
            // Guarded update: the flag flips at most once.
            let updated = sqlx::query(
                "UPDATE results SET email_sent = 1 WHERE id = ? AND email_sent = 0",
            )
            .bind(result.id)
            .execute(pool)
            .await;
            match updated {
                Ok(_) => tracing::info!("Result email sent to {} for result {}", to, result.id),
                Err(e) => tracing::warn!(
                    "Result email sent but flag update failed for result {}: {}",
                    result.id,
                    e
                ),
            }
        }
        Err(e) => {
            tracing::warn!("Failed to send result email to {}: {}", to, e);
        }
    }
}

/// Announces a newly created quiz to every student with an email address.
/// Best-effort: failures are logged per recipient and never propagate.
pub async fn notify_new_quiz(
    pool: &SqlitePool,
    transport: &dyn MailTransport,
    quiz_title: &str,
    max_attempts: i64,
    base_url: &str,
) {
    match settings::get_or_create(pool).await {
        Ok(s) if !s.smtp_enabled => return,
        Ok(_) => {}
        Err(e) => {
            tracing::warn!("Skipping new-quiz announcement: {}", e);
            return;
        }
    }

    let recipients: Vec<String> = match sqlx::query_scalar(
        "SELECT email FROM users WHERE role = 'student' AND email IS NOT NULL AND email != ''",
    )
    .fetch_all(pool)
    .await
    {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!("Skipping new-quiz announcement: {}", e);
            return;
        }
    };

    let subject = format!("New Quiz Available: {}", quiz_title);
    let body = format!(
        "A new quiz \"{}\" is now available at {}.\n\n\
         You have {} attempt(s).\n\n\
         Regards,\nQuiz Team\n",
        quiz_title, base_url, max_attempts
    );

    let mut sent = 0usize;
    for to in &recipients {
        match transport.send(to, &subject, &body).await {
            Ok(()) => sent += 1,
            Err(e) => tracing::warn!("Failed to announce quiz to {}: {}", to, e),
        }
    }
    tracing::info!(
        "New-quiz announcement for '{}' sent to {}/{} student(s)",
        quiz_title,
        sent,
        recipients.len()
    );
}
