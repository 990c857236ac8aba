use crate::config::{EmailConfig, FrigateConfig};
use crate::error::Result;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Subject line that marks an inbound message as a clip request.
pub const CLIP_REQUEST_SUBJECT: &str = "Send Clip";

/// Extract the event id from a clip-request body.
///
/// The notification email embeds the id in a line of the form
/// "... the event ID <token> ..."; the token is alphanumerics, dots and
/// dashes, which matches the recorder's id format. Lines without the marker
/// are ignored.
pub fn extract_event_id(body: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"event ID ([\w.-]+)").expect("event id pattern is valid")
    });

    body.lines()
        .filter(|line| line.contains("event ID"))
        .find_map(|line| {
            pattern
                .captures(line)
                .map(|captures| captures[1].to_string())
        })
}

/// An inbound clip request, however it arrived. The mailbox transport that
/// produces these lives outside this crate.
#[derive(Debug, Clone)]
pub struct ClipRequest {
    pub subject: String,
    pub body: String,
}

/// Source of inbound clip requests (e.g. a polled mailbox).
#[async_trait]
pub trait ClipRequestSource: Send {
    /// Next pending request, or None when the source is exhausted.
    async fn next_request(&mut self) -> Result<Option<ClipRequest>>;
}

/// Answers a clip request by fetching the clip from the recorder and mailing
/// it back. Runs entirely outside the gating path: a clip reply is never
/// deduplicated, gated or snoozed.
pub struct ClipRequestHandler {
    http: reqwest::Client,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
    recorder_base: String,
}

impl ClipRequestHandler {
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

    fn clip_url(&self, event_id: &str) -> String {
        format!("{}/api/events/{}/clip.mp4", self.recorder_base, event_id)
    }

    /// Handle one request. Returns false when no event id could be extracted,
    /// in which case the request is dropped.
    pub async fn handle(&self, request: &ClipRequest) -> Result<bool> {
        if request.subject != CLIP_REQUEST_SUBJECT {
            debug!(subject = %request.subject, "ignoring non clip-request message");
            return Ok(false);
        }
        let Some(event_id) = extract_event_id(&request.body) else {
            warn!("clip request without a recognizable event id");
            return Ok(false);
        };

        let url = self.clip_url(&event_id);
        debug!(%event_id, %url, "fetching clip");
        let clip = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let message = self.compose(&event_id, clip.to_vec())?;
        self.mailer.send(message).await?;
        info!(%event_id, "clip email sent");
        Ok(true)
    }

    fn compose(&self, event_id: &str, clip: Vec<u8>) -> Result<Message> {
        let attachment = Attachment::new("clip.mp4".to_string())
            .body(clip, ContentType::parse("video/mp4")?);
        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(format!("Frigate Clip: Event {}", event_id))
            .multipart(
                lettre::message::MultiPart::mixed()
                    .singlepart(SinglePart::plain(format!(
                        "Here is the clip for the event ID {}.",
                        event_id
                    )))
                    .singlepart(attachment),
            )?;
        Ok(message)
    }
}

/// Drain a request source through a handler until it is exhausted.
pub async fn serve_requests<S: ClipRequestSource>(
    source: &mut S,
    handler: &ClipRequestHandler,
) -> Result<()> {
    while let Some(request) = source.next_request().await? {
        if let Err(err) = handler.handle(&request).await {
            // Same policy as notifications: log, do not retry
            warn!(error = %err, "clip request handling failed");
        }
    }
    Ok(())
}
