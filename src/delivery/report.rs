//! Delivery inputs and aggregated outcomes.

use serde::Serialize;

use crate::error::DeliveryError;
use crate::rules::model::ProviderType;

/// An attachment extracted from the inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub mime_type: Option<String>,
    pub content: Vec<u8>,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, mime_type: Option<&str>, content: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.map(String::from),
            content,
        }
    }
}

/// Where a delivered attachment can be found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveredRef {
    /// Retrieval URL of a staged blob.
    Url(String),
    /// Identifier assigned by the provider.
    ProviderFileId(String),
}

/// Result of processing one attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttachmentOutcome {
    Delivered {
        filename: String,
        reference: DeliveredRef,
    },
    Failed {
        filename: String,
        error: String,
    },
}

impl AttachmentOutcome {
    pub fn delivered(filename: &str, reference: DeliveredRef) -> Self {
        Self::Delivered {
            filename: filename.to_string(),
            reference,
        }
    }

    pub fn failed(filename: &str, error: &DeliveryError) -> Self {
        Self::Failed {
            filename: filename.to_string(),
            error: error.to_string(),
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            Self::Delivered { filename, .. } | Self::Failed { filename, .. } => filename,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// A delivered item whose announcement failed never reached the
    /// recipient, so it counts as failed.
    fn unannounced(self, reason: &str) -> Self {
        match self {
            Self::Delivered { filename, .. } => Self::Failed {
                filename,
                error: format!("Announcement failed: {reason}"),
            },
            failed => failed,
        }
    }
}

/// State of the composite message that announces delivered attachments
/// (Slack finalize, DingTalk action card, Telegram document).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "error", rename_all = "snake_case")]
pub enum Announcement {
    /// Nothing to announce: no attachments, or none succeeded.
    Skipped,
    Sent,
    Failed(String),
}

/// What an adapter hands back after processing a batch of attachments.
#[derive(Debug, Clone)]
pub struct AttachmentBatch {
    /// One outcome per input attachment, in input order.
    pub outcomes: Vec<AttachmentOutcome>,
    pub announcement: Announcement,
}

impl AttachmentBatch {
    pub fn empty() -> Self {
        Self {
            outcomes: Vec::new(),
            announcement: Announcement::Skipped,
        }
    }
}

/// Aggregated result of one delivery.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReport {
    pub provider: ProviderType,
    pub message_sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_error: Option<String>,
    pub successes: Vec<AttachmentOutcome>,
    pub failures: Vec<AttachmentOutcome>,
    pub announcement: Announcement,
}

impl DeliveryReport {
    pub(crate) fn new(
        provider: ProviderType,
        text_result: Result<(), DeliveryError>,
        batch: AttachmentBatch,
    ) -> Self {
        let outcomes = match &batch.announcement {
            Announcement::Failed(reason) => batch
                .outcomes
                .into_iter()
                .map(|o| o.unannounced(reason))
                .collect(),
            _ => batch.outcomes,
        };
        let (successes, failures): (Vec<_>, Vec<_>) =
            outcomes.into_iter().partition(AttachmentOutcome::is_delivered);
        Self {
            provider,
            message_sent: text_result.is_ok(),
            text_error: text_result.err().map(|e| e.to_string()),
            successes,
            failures,
            announcement: batch.announcement,
        }
    }

    pub fn attachment_count(&self) -> usize {
        self.successes.len() + self.failures.len()
    }
}
