use crate::config::{EmailConfig, FrigateConfig};
use crate::error::Result;
use crate::event::DetectionEvent;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

/// Destination for gated notifications.
///
/// Delivery failures are logged by the router and the event is considered
/// processed either way: the dedup window already suppresses repeats, so a
/// retry could not be told apart from a duplicate.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, event: &DetectionEvent) -> Result<()>;
}

/// Emails a snapshot of the event to the operator, with a "Request Clip"
/// mailto link that round-trips the event id for the clip-request flow.
pub struct EmailSink {
    http: reqwest::Client,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
    recorder_base: String,
}

impl EmailSink {
    pub fn new(email: &EmailConfig, frigate: &FrigateConfig) -> Result<Self> {
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&email.smtp_host)?
            .port(email.smtp_port)
            .credentials(Credentials::new(
                email.address.clone(),
                email.password.clone(),
            ))
            .build();

        Ok(Self {
            http: reqwest::Client::new(),
            mailer,
            from: email.address.parse()?,
            to: email.recipient.parse()?,
            recorder_base: frigate.api_base(),
        })
    }

    fn snapshot_url(&self, event_id: &str) -> String {
        format!("{}/api/events/{}/snapshot.jpg", self.recorder_base, event_id)
    }

    fn compose(&self, event: &DetectionEvent, snapshot: Vec<u8>) -> Result<Message> {
        let body = format!(
            "Here is the snapshot for the event ID {} from camera {}.",
            event.id, event.camera
        );
        let html = format!(
            "<html><body><p>{}</p>\
             <p><a href=\"mailto:{}?subject=Send%20Clip&body=Please%20send%20the%20clip%20\
             for%20the%20event%20ID%20{}%20detected%20on%20camera%20{}.\">Request Clip</a></p>\
             </body></html>",
            body, self.from.email, event.id, event.camera
        );

        let attachment = Attachment::new("snapshot.jpg".to_string())
            .body(snapshot, ContentType::parse("image/jpeg")?);

        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(format!(
                "Frigate Event: {} - Camera: {}",
                event.id, event.camera
            ))
            .multipart(
                MultiPart::mixed()
                    .multipart(
                        MultiPart::alternative()
                            .singlepart(SinglePart::plain(body))
                            .singlepart(SinglePart::html(html)),
                    )
                    .singlepart(attachment),
            )?;
        Ok(message)
    }
}

#[async_trait]
impl NotificationSink for EmailSink {
    async fn deliver(&self, event: &DetectionEvent) -> Result<()> {
        let url = self.snapshot_url(&event.id);
        debug!(event_id = %event.id, %url, "fetching snapshot");
        let snapshot = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let message = self.compose(event, snapshot.to_vec())?;
        self.mailer.send(message).await?;
        info!(event_id = %event.id, camera = %event.camera, "notification email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmailConfig, FrigateConfig};

    fn sink() -> EmailSink {
        let email = EmailConfig {
            address: "cam@example.com".to_string(),
            password: "secret".to_string(),
            recipient: "owner@example.com".to_string(),
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 587,
        };
        let frigate = FrigateConfig {
            host: "recorder".to_string(),
            port: 5000,
        };
        EmailSink::new(&email, &frigate).unwrap()
    }

    fn event() -> DetectionEvent {
        DetectionEvent {
            id: "1695000000.1-ab".to_string(),
            camera: "front".to_string(),
            label: "person".to_string(),
            has_snapshot: true,
            raw: serde_json::Value::Null,
        }
    }

    #[test]
    fn snapshot_url_targets_recorder_api() {
        assert_eq!(
            sink().snapshot_url("ev1"),
            "http://recorder:5000/api/events/ev1/snapshot.jpg"
        );
    }

    #[test]
    fn composed_message_carries_subject_and_clip_link() {
        let message = sink().compose(&event(), vec![0xFF, 0xD8]).unwrap();
        let rendered = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(rendered.contains("Frigate Event: 1695000000.1-ab - Camera: front"));
        assert!(rendered.contains("Send%20Clip"));
        assert!(rendered.contains("snapshot.jpg"));
    }

    #[test]
    fn invalid_recipient_is_rejected() {
        let email = EmailConfig {
            address: "cam@example.com".to_string(),
            password: "secret".to_string(),
            recipient: "not-an-address".to_string(),
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 587,
        };
        let frigate = FrigateConfig {
            host: "recorder".to_string(),
            port: 5000,
        };
        assert!(EmailSink::new(&email, &frigate).is_err());
    }
}
