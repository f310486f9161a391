use async_trait::async_trait;
use lettre::message::{Mailbox, header};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::instrument;

use academy_config::EmailConfig;
use academy_core::AppError;
use academy_models::DomainEvent;

use super::EventSink;

/// Mails each event to the office inbox (`NOTIFY_EMAIL`).
///
/// The SMTP transport is built once in [`MailEventSink::new`] and reused.
pub struct MailEventSink {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl MailEventSink {
    pub fn new(config: &EmailConfig) -> Result<Self, AppError> {
        let from: Mailbox = format!("{} <{}>", config.from_name, config.from_email)
            .parse()
            .map_err(|e| AppError::internal(anyhow::anyhow!("invalid from email: {}", e)))?;
        let to: Mailbox = config
            .notify_email
            .parse()
            .map_err(|e| AppError::internal(anyhow::anyhow!("invalid notify email: {}", e)))?;

        let mailer = if config.smtp_username.is_empty() {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
                .port(config.smtp_port)
                .build()
        } else {
            let creds = Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            );
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
                .map_err(|e| {
                    AppError::internal(anyhow::anyhow!("failed to create SMTP relay: {}", e))
                })?
                .port(config.smtp_port)
                .credentials(creds)
                .build()
        };

        Ok(Self { mailer, from, to })
    }
}

fn subject(event: &DomainEvent) -> String {
    match event {
        DomainEvent::EnrollmentSucceeded { student_id, .. } => {
            format!("Student {} enrolled", student_id)
        }
        DomainEvent::CapacityExceeded { batch_id, .. } => format!("Batch {} is full", batch_id),
        DomainEvent::TestRecorded { student_id, .. } => {
            format!("Test recorded for student {}", student_id)
        }
        DomainEvent::PaymentApproved { payment_id, .. } => {
            format!("Payment {} approved", payment_id)
        }
        DomainEvent::PaymentRejected { payment_id, .. } => {
            format!("Payment {} rejected", payment_id)
        }
    }
}

#[async_trait]
impl EventSink for MailEventSink {
    #[instrument(skip(self), fields(event = event.name()))]
    async fn publish(&self, event: &DomainEvent) -> anyhow::Result<()> {
        let body = serde_json::to_string_pretty(event)?;
        let email = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject(event))
            .header(header::ContentType::TEXT_PLAIN)
            .body(body)?;

        self.mailer.send(email).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use academy_models::{FeeId, FeeStatus, PaymentId};

    #[test]
    fn test_subject_names_the_payment() {
        let payment_id = PaymentId::from_u128(42);
        let event = DomainEvent::PaymentApproved {
            payment_id,
            fee_id: FeeId::new(),
            new_fee_status: FeeStatus::Paid,
        };
        assert_eq!(subject(&event), format!("Payment {} approved", payment_id));
    }

    #[test]
    fn test_rejects_malformed_notify_address() {
        let config = EmailConfig::from_lookup(|key| {
            (key == "NOTIFY_EMAIL").then(|| "not an address".to_string())
        });
        assert!(MailEventSink::new(&config).is_err());
    }
}
