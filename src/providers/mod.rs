//! Provider adapters — one per supported messaging protocol.
//!
//! Each adapter exposes the same capability set (validate, send text,
//! send attachments). The set of providers is closed: dispatch happens by
//! matching on [`ProviderConfig`](crate::rules::ProviderConfig) in the
//! delivery orchestrator, so adding a provider means adding a variant and
//! an adapter.

pub mod archive;
pub mod dingtalk;
pub(crate) mod http;
pub mod slack;
pub mod telegram;

use async_trait::async_trait;
use futures::StreamExt;
use futures::future::BoxFuture;

use crate::delivery::report::{Attachment, AttachmentBatch};
use crate::error::DeliveryError;
use crate::rules::model::ProviderType;
use crate::staging::BlobStager;

pub use dingtalk::DingTalkAdapter;
pub use slack::SlackAdapter;
pub use telegram::TelegramAdapter;

/// Base URLs of the provider HTTP APIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub slack_api_base: String,
    pub dingtalk_api_base: String,
    pub telegram_api_base: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            slack_api_base: "https://slack.com/api".to_string(),
            dingtalk_api_base: "https://oapi.dingtalk.com".to_string(),
            telegram_api_base: "https://api.telegram.org".to_string(),
        }
    }
}

/// Uniform capability set of a provider protocol.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    type Config: Send + Sync;

    fn provider(&self) -> ProviderType;

    /// Non-empty field checks. Runs before any network activity.
    fn validate(&self, config: &Self::Config) -> Result<(), DeliveryError>;

    async fn send_text(&self, body: &str, config: &Self::Config) -> Result<(), DeliveryError>;

    /// Process every attachment and, if at least one succeeded, send the
    /// provider's composite announcement. Never fails as a whole: every
    /// problem is captured in the returned outcomes.
    async fn send_attachments(
        &self,
        attachments: &[Attachment],
        config: &Self::Config,
        stager: &BlobStager,
    ) -> AttachmentBatch;
}

/// Drive `tasks` with at most `limit` in flight, yielding results in input
/// order. `limit == 1` processes strictly one after another.
///
/// Tasks are boxed up front so the combinator holds no closure, which keeps
/// the enclosing `async_trait` future `Send`.
pub(crate) async fn process_in_order<'a, T>(tasks: Vec<BoxFuture<'a, T>>, limit: usize) -> Vec<T> {
    futures::stream::iter(tasks)
        .buffered(limit.max(1))
        .collect()
        .await
}
