//! Error types for the mail relay.

use crate::delivery::report::{AttachmentOutcome, DeliveryReport};

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Inbound error: {0}")]
    Inbound(#[from] InboundError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Process configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Rule store / blob store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors raised while routing and delivering a single message.
///
/// Per-attachment variants are never propagated past the attachment loop;
/// they are carried as [`AttachmentOutcome::Failed`] detail instead.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeliveryError {
    #[error("Invalid {provider} configuration: {reason}")]
    ConfigInvalid { provider: String, reason: String },

    #[error("No rule matches destination {destination}")]
    RuleNotFound { destination: String },

    #[error("{provider} rejected the request: {reason}")]
    ProviderRejected { provider: String, reason: String },

    #[error("Staging {filename} failed: {reason}")]
    AttachmentStagingFailed { filename: String, reason: String },

    #[error("Uploading {filename} failed: {reason}")]
    AttachmentUploadFailed { filename: String, reason: String },

    #[error("All {} attachments failed{}", .failures.len(), text_note(.text_error))]
    AllAttachmentsFailed {
        failures: Vec<AttachmentOutcome>,
        /// Set when the text message failed as well.
        text_error: Option<String>,
    },

    /// The text message failed. `report` holds whatever the attachment
    /// batch achieved afterwards.
    #[error("{provider} text message not delivered: {reason}")]
    TextNotDelivered {
        provider: String,
        reason: String,
        report: Box<DeliveryReport>,
    },

    #[error("Unsupported im type {im_type}")]
    UnsupportedProvider { im_type: String },

    #[error("{provider} transport error: {reason}")]
    Transport { provider: String, reason: String },
}

fn text_note(text_error: &Option<String>) -> String {
    text_error
        .as_deref()
        .map(|e| format!("; text message not delivered either: {e}"))
        .unwrap_or_default()
}

impl DeliveryError {
    pub(crate) fn config_invalid(provider: &str, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn rejected(provider: &str, reason: impl Into<String>) -> Self {
        Self::ProviderRejected {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn transport(provider: &str, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            provider: provider.into(),
            reason: err.to_string(),
        }
    }
}

/// Errors from the inbound entry point.
#[derive(Debug, thiserror::Error)]
pub enum InboundError {
    #[error("Failed to parse message for {to}")]
    Parse { to: String },

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
