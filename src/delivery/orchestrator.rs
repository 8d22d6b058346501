//! Drives one delivery: validate, send text, send attachments, aggregate.

use tracing::{info, warn};

use super::report::{Attachment, AttachmentBatch, DeliveryReport};
use crate::error::DeliveryError;
use crate::providers::{
    DingTalkAdapter, ProviderAdapter, ProviderEndpoints, SlackAdapter, TelegramAdapter,
};
use crate::rules::{ProviderConfig, Rule};
use crate::staging::BlobStager;

/// Knobs for [`DeliveryOrchestrator`].
#[derive(Debug, Clone)]
pub struct DeliveryOptions {
    /// Maximum attachments processed at once. `1` is strictly sequential.
    pub attachment_concurrency: usize,
    /// Whether attachments are still attempted after the text send failed.
    pub proceed_on_text_failure: bool,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            attachment_concurrency: 1,
            proceed_on_text_failure: true,
        }
    }
}

pub struct DeliveryOrchestrator {
    slack: SlackAdapter,
    dingtalk: DingTalkAdapter,
    telegram: TelegramAdapter,
    stager: BlobStager,
    proceed_on_text_failure: bool,
}

impl DeliveryOrchestrator {
    pub fn new(
        client: reqwest::Client,
        endpoints: &ProviderEndpoints,
        stager: BlobStager,
        options: DeliveryOptions,
    ) -> Self {
        let concurrency = options.attachment_concurrency.max(1);
        Self {
            slack: SlackAdapter::new(client.clone(), &endpoints.slack_api_base, concurrency),
            dingtalk: DingTalkAdapter::new(client.clone(), &endpoints.dingtalk_api_base, concurrency),
            telegram: TelegramAdapter::new(client, &endpoints.telegram_api_base),
            stager,
            proceed_on_text_failure: options.proceed_on_text_failure,
        }
    }

    /// Deliver `text` and `attachments` to the provider the rule names.
    ///
    /// Fails with `ConfigInvalid` before any network call when the rule's
    /// configuration is incomplete, and with `AllAttachmentsFailed` when
    /// attachments were given but none could be delivered. A failed text send
    /// still lets the attachments go out (unless the options say otherwise)
    /// and is then returned as `TextNotDelivered`. An `Ok` report always
    /// means the text reached the provider.
    pub async fn deliver(
        &self,
        rule: &Rule,
        text: &str,
        attachments: &[Attachment],
    ) -> Result<DeliveryReport, DeliveryError> {
        match &rule.config {
            ProviderConfig::Slack(config) => self.run(&self.slack, config, text, attachments).await,
            ProviderConfig::DingTalk(config) => {
                self.run(&self.dingtalk, config, text, attachments).await
            }
            ProviderConfig::Telegram(config) => {
                self.run(&self.telegram, config, text, attachments).await
            }
        }
    }

    async fn run<A: ProviderAdapter>(
        &self,
        adapter: &A,
        config: &A::Config,
        text: &str,
        attachments: &[Attachment],
    ) -> Result<DeliveryReport, DeliveryError> {
        let provider = adapter.provider();
        adapter.validate(config)?;

        let text_result = adapter.send_text(text, config).await;
        if let Err(e) = &text_result {
            warn!(provider = %provider, error = %e, "Text delivery failed");
            if !self.proceed_on_text_failure {
                return Err(e.clone());
            }
        }

        let batch = if attachments.is_empty() {
            AttachmentBatch::empty()
        } else {
            adapter.send_attachments(attachments, config, &self.stager).await
        };

        let report = DeliveryReport::new(provider, text_result, batch);
        if !attachments.is_empty() && report.successes.is_empty() {
            warn!(provider = %provider, count = attachments.len(), "Every attachment failed");
            return Err(DeliveryError::AllAttachmentsFailed {
                failures: report.failures,
                text_error: report.text_error,
            });
        }
        if let Some(reason) = report.text_error.clone() {
            return Err(DeliveryError::TextNotDelivered {
                provider: provider.to_string(),
                reason,
                report: Box::new(report),
            });
        }

        info!(
            provider = %provider,
            message_sent = report.message_sent,
            delivered = report.successes.len(),
            failed = report.failures.len(),
            "Delivery finished"
        );
        Ok(report)
    }
}
