//! Inbound entry point: parse a raw message, resolve its route, deliver.

pub mod routes;

use mail_parser::{MessageParser, MimeHeaders};
use serde::Serialize;
use tracing::{info, warn};

use crate::delivery::{Attachment, DeliveryOrchestrator, DeliveryReport};
use crate::error::{DeliveryError, InboundError};
use crate::rules::RuleResolver;

pub use routes::inbound_routes;

/// Reason given when no rule matches the destination.
pub const REJECT_NO_ROUTE: &str = "user not found";
/// Reason given when the matching rule names an unknown provider.
pub const REJECT_UNSUPPORTED: &str = "unsupported im type";
/// Reason given for every other failure.
pub const REJECT_INTERNAL: &str = "internal error";

/// The parts of a raw message the relay uses.
#[derive(Debug, Clone)]
pub struct ParsedEmail {
    pub subject: Option<String>,
    pub text: Option<String>,
    pub html: Option<String>,
    pub attachments: Vec<Attachment>,
}

/// Parse a raw RFC 822 message.
pub fn parse_email(raw: &[u8]) -> Option<ParsedEmail> {
    let parsed = MessageParser::default().parse(raw)?;

    let attachments = parsed
        .attachments()
        .map(|part| {
            let part: &mail_parser::MessagePart = part;
            let filename = MimeHeaders::attachment_name(part)
                .unwrap_or("attachment")
                .to_string();
            let mime = MimeHeaders::content_type(part).map(|ct| match ct.subtype() {
                Some(sub) => format!("{}/{sub}", ct.ctype()),
                None => ct.ctype().to_string(),
            });
            Attachment {
                filename,
                mime_type: mime,
                content: part.contents().to_vec(),
            }
        })
        .collect();

    Some(ParsedEmail {
        subject: parsed.subject().map(String::from),
        text: parsed.body_text(0).map(|t| t.into_owned()),
        html: parsed.body_html(0).map(|h| h.into_owned()),
        attachments,
    })
}

/// Strip HTML tags from content (basic).
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Notification text for a parsed message.
pub fn compose_message(email: &ParsedEmail, to: &str, from: &str) -> String {
    let body = match (&email.text, &email.html) {
        (Some(text), _) => text.clone(),
        (None, Some(html)) => strip_html(html),
        (None, None) => "mail has no content".to_string(),
    };
    format!(
        "{to} received email from {from}\nSubject: {}\n\n{body}",
        email.subject.as_deref().unwrap_or("")
    )
}

/// Final outcome of handling one inbound message.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InboundOutcome {
    Delivered { report: DeliveryReport },
    Rejected { reason: String },
}

pub struct InboundHandler {
    resolver: RuleResolver,
    orchestrator: DeliveryOrchestrator,
}

impl InboundHandler {
    pub fn new(resolver: RuleResolver, orchestrator: DeliveryOrchestrator) -> Self {
        Self {
            resolver,
            orchestrator,
        }
    }

    /// Handle one message addressed to `to`.
    ///
    /// A destination with no matching rule, or whose rule names an unknown
    /// provider, is rejected rather than treated as an error. Everything
    /// else that goes wrong, including a text message that never reached the
    /// provider, is returned to the caller, which rejects the message with
    /// [`REJECT_INTERNAL`].
    pub async fn handle(&self, to: &str, from: &str, raw: &[u8]) -> Result<InboundOutcome, InboundError> {
        let email = parse_email(raw).ok_or_else(|| InboundError::Parse { to: to.to_string() })?;
        let text = compose_message(&email, to, from);

        let rule = match self.resolver.resolve(to).await {
            Ok(rule) => rule,
            Err(InboundError::Delivery(DeliveryError::RuleNotFound { .. })) => {
                warn!(destination = to, "Rejecting message with no route");
                return Ok(InboundOutcome::Rejected {
                    reason: REJECT_NO_ROUTE.to_string(),
                });
            }
            Err(InboundError::Delivery(DeliveryError::UnsupportedProvider { im_type })) => {
                warn!(destination = to, im_type = %im_type, "Rejecting message for unsupported provider");
                return Ok(InboundOutcome::Rejected {
                    reason: REJECT_UNSUPPORTED.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        let report = self
            .orchestrator
            .deliver(&rule, &text, &email.attachments)
            .await?;
        info!(
            destination = to,
            provider = %report.provider,
            attachments = report.attachment_count(),
            "Inbound message delivered"
        );
        Ok(InboundOutcome::Delivered { report })
    }
}
