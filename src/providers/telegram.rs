//! Telegram Bot API adapter.
//!
//! Text is sent with `sendMessage`, split into chunks under Telegram's
//! length limit. Attachments are zipped into one archive, staged in the blob
//! store, and sent with `sendDocument` by URL so Telegram fetches the file
//! itself. The staged archive is deleted once the send has been attempted.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::Value;
use tracing::{info, warn};

use super::ProviderAdapter;
use super::archive::{self, ARCHIVE_CONTENT_TYPE, ARCHIVE_NAME};
use super::http::{expect_ok_flag, read_json};
use crate::delivery::report::{
    Announcement, Attachment, AttachmentBatch, AttachmentOutcome, DeliveredRef,
};
use crate::error::DeliveryError;
use crate::rules::model::{ProviderType, TelegramConfig};
use crate::staging::{BlobStager, new_blob_id};
use crate::store::BlobMetadata;

const NAME: &str = "telegram";

/// Telegram's maximum message length.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

pub struct TelegramAdapter {
    client: reqwest::Client,
    api_base: String,
}

impl TelegramAdapter {
    pub fn new(client: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn api_url(&self, token: &str, method: &str) -> String {
        format!("{}/bot{token}/{method}", self.api_base)
    }

    async fn call(&self, config: &TelegramConfig, method: &str, body: &Value) -> Result<Value, DeliveryError> {
        let resp = self
            .client
            .post(self.api_url(config.token.expose_secret(), method))
            .json(body)
            .send()
            .await
            .map_err(|e| DeliveryError::transport(NAME, e))?;
        let reply = read_json(NAME, resp).await?;
        expect_ok_flag(NAME, &reply)?;
        Ok(reply)
    }

    /// Send a staged document by URL. Returns Telegram's file id when the
    /// reply carries one.
    async fn send_document_by_url(&self, config: &TelegramConfig, url: &str) -> Result<Option<String>, DeliveryError> {
        let body = serde_json::json!({
            "chat_id": config.chat_id,
            "document": url,
        });
        let reply = self.call(config, "sendDocument", &body).await?;
        Ok(reply
            .pointer("/result/document/file_id")
            .and_then(Value::as_str)
            .map(String::from))
    }

    /// Bundle and stage the archive. On failure every attachment fails with
    /// the same cause.
    async fn stage_archive(
        &self,
        attachments: &[Attachment],
        stager: &BlobStager,
    ) -> Result<crate::staging::StagedBlob, String> {
        let bytes = archive::bundle(attachments).map_err(|e| format!("bundling failed: {e}"))?;
        stager
            .put(
                &new_blob_id(),
                bytes,
                BlobMetadata::attachment(ARCHIVE_NAME, Some(ARCHIVE_CONTENT_TYPE)),
            )
            .await
            .map_err(|e| e.to_string())
    }
}

fn all_failed(attachments: &[Attachment], error: impl Fn(&str) -> DeliveryError) -> Vec<AttachmentOutcome> {
    attachments
        .iter()
        .map(|a| AttachmentOutcome::failed(&a.filename, &error(&a.filename)))
        .collect()
}

#[async_trait]
impl ProviderAdapter for TelegramAdapter {
    type Config = TelegramConfig;

    fn provider(&self) -> ProviderType {
        ProviderType::Telegram
    }

    fn validate(&self, config: &TelegramConfig) -> Result<(), DeliveryError> {
        config.validate()
    }

    async fn send_text(&self, body: &str, config: &TelegramConfig) -> Result<(), DeliveryError> {
        let chunks = split_message(body, TELEGRAM_MAX_MESSAGE_LENGTH);
        for chunk in &chunks {
            let payload = serde_json::json!({
                "chat_id": config.chat_id,
                "text": chunk,
            });
            self.call(config, "sendMessage", &payload).await?;
        }
        info!(chunks = chunks.len(), "Telegram message sent");
        Ok(())
    }

    async fn send_attachments(
        &self,
        attachments: &[Attachment],
        config: &TelegramConfig,
        stager: &BlobStager,
    ) -> AttachmentBatch {
        if attachments.is_empty() {
            return AttachmentBatch::empty();
        }

        let staged = match self.stage_archive(attachments, stager).await {
            Ok(staged) => staged,
            Err(reason) => {
                warn!(error = %reason, "Telegram archive staging failed");
                return AttachmentBatch {
                    outcomes: all_failed(attachments, |f| DeliveryError::AttachmentStagingFailed {
                        filename: f.to_string(),
                        reason: reason.clone(),
                    }),
                    announcement: Announcement::Skipped,
                };
            }
        };

        let sent = self.send_document_by_url(config, &staged.url).await;

        if let Err(e) = stager.delete(&staged.id).await {
            warn!(blob_id = %staged.id, error = %e, "Failed to delete staged archive");
        }

        match sent {
            Ok(file_id) => {
                let reference = match file_id {
                    Some(id) => DeliveredRef::ProviderFileId(id),
                    None => DeliveredRef::Url(staged.url.clone()),
                };
                info!(count = attachments.len(), "Telegram archive sent");
                AttachmentBatch {
                    outcomes: attachments
                        .iter()
                        .map(|a| AttachmentOutcome::delivered(&a.filename, reference.clone()))
                        .collect(),
                    announcement: Announcement::Sent,
                }
            }
            Err(e) => {
                warn!(error = %e, "Telegram sendDocument failed");
                let reason = e.to_string();
                AttachmentBatch {
                    outcomes: all_failed(attachments, |f| DeliveryError::AttachmentUploadFailed {
                        filename: f.to_string(),
                        reason: reason.clone(),
                    }),
                    announcement: Announcement::Failed(reason.clone()),
                }
            }
        }
    }
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        let limit = match remaining.char_indices().nth(max_chars) {
            Some((byte_idx, _)) => byte_idx,
            None => {
                chunks.push(remaining.to_string());
                break;
            }
        };

        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(limit);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_embeds_token() {
        let a = TelegramAdapter::new(reqwest::Client::new(), "https://api.telegram.org/");
        assert_eq!(
            a.api_url("123:ABC", "sendMessage"),
            "https://api.telegram.org/bot123:ABC/sendMessage"
        );
    }

    #[test]
    fn split_short_message_is_single_chunk() {
        assert_eq!(split_message("hello", 4096), vec!["hello"]);
    }

    #[test]
    fn split_prefers_newlines() {
        let text = "aaaa\nbbbb\ncccc";
        assert_eq!(split_message(text, 10), vec!["aaaa\nbbbb", "cccc"]);
    }

    #[test]
    fn split_falls_back_to_spaces() {
        assert_eq!(split_message("aaaa bbbb cccc", 10), vec!["aaaa bbbb", "cccc"]);
    }

    #[test]
    fn split_hard_cuts_without_separators() {
        let chunks = split_message(&"x".repeat(25), 10);
        assert_eq!(chunks, vec!["x".repeat(10), "x".repeat(10), "x".repeat(5)]);
    }

    #[test]
    fn split_respects_multibyte_boundaries() {
        let text = "é".repeat(9000);
        let chunks = split_message(&text, TELEGRAM_MAX_MESSAGE_LENGTH);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= TELEGRAM_MAX_MESSAGE_LENGTH));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn all_failed_covers_every_attachment() {
        let list = vec![
            Attachment::new("a", None, vec![]),
            Attachment::new("b", None, vec![]),
        ];
        let out = all_failed(&list, |f| DeliveryError::AttachmentUploadFailed {
            filename: f.into(),
            reason: "x".into(),
        });
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|o| !o.is_delivered()));
        assert_eq!(out[1].filename(), "b");
    }
}
