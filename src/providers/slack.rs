//! Slack Web API adapter.
//!
//! Text goes through `chat.postMessage`. Attachments use the external upload
//! flow: `files.getUploadURLExternal` per file, a multipart POST of the bytes
//! to the returned URL, and one `files.completeUploadExternal` call that
//! shares every uploaded file into the channel.

use async_trait::async_trait;
use futures::FutureExt;
use reqwest::multipart::{Form, Part};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::http::{expect_ok_flag, read_json};
use super::{ProviderAdapter, process_in_order};
use crate::delivery::report::{
    Announcement, Attachment, AttachmentBatch, AttachmentOutcome, DeliveredRef,
};
use crate::error::DeliveryError;
use crate::rules::model::{ProviderType, SlackConfig};
use crate::staging::BlobStager;

const NAME: &str = "slack";

/// A file uploaded but not yet shared into a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedFile {
    pub id: String,
    pub title: String,
}

pub struct SlackAdapter {
    client: reqwest::Client,
    api_base: String,
    concurrency: usize,
}

impl SlackAdapter {
    pub fn new(client: reqwest::Client, api_base: impl Into<String>, concurrency: usize) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            concurrency,
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/{method}", self.api_base)
    }

    /// Steps (a) and (b) of the upload flow for a single file.
    async fn upload_one(
        &self,
        attachment: &Attachment,
        config: &SlackConfig,
    ) -> Result<UploadedFile, DeliveryError> {
        let upload_failed = |reason: String| DeliveryError::AttachmentUploadFailed {
            filename: attachment.filename.clone(),
            reason,
        };

        let length = attachment.content.len().to_string();
        let resp = self
            .client
            .post(self.api_url("files.getUploadURLExternal"))
            .bearer_auth(config.token.expose_secret())
            .form(&[
                ("filename", attachment.filename.as_str()),
                ("length", length.as_str()),
            ])
            .send()
            .await
            .map_err(|e| upload_failed(format!("getUploadURLExternal: {e}")))?;
        let body = read_json(NAME, resp)
            .await
            .and_then(|b| expect_ok_flag(NAME, &b).map(|()| b))
            .map_err(|e| upload_failed(format!("getUploadURLExternal: {e}")))?;

        let (upload_url, file_id) = match (
            body.get("upload_url").and_then(Value::as_str),
            body.get("file_id").and_then(Value::as_str),
        ) {
            (Some(url), Some(id)) => (url.to_string(), id.to_string()),
            _ => {
                return Err(upload_failed(
                    "getUploadURLExternal response lacks upload_url or file_id".into(),
                ));
            }
        };

        let form = Form::new().part("filename", file_part(attachment));
        let resp = self
            .client
            .post(&upload_url)
            .bearer_auth(config.token.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| upload_failed(format!("upload: {e}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(upload_failed(format!("upload returned HTTP {status}: {text}")));
        }

        debug!(file = %attachment.filename, file_id = %file_id, "Uploaded file to Slack");
        Ok(UploadedFile {
            id: file_id,
            title: attachment.filename.clone(),
        })
    }

    /// Step (c): share every uploaded file into the configured channel.
    async fn complete_upload(
        &self,
        files: &[UploadedFile],
        config: &SlackConfig,
    ) -> Result<(), DeliveryError> {
        let body = serde_json::json!({
            "files": files,
            "channel_id": config.channel_id,
        });
        let resp = self
            .client
            .post(self.api_url("files.completeUploadExternal"))
            .bearer_auth(config.token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::transport(NAME, e))?;
        let body = read_json(NAME, resp).await?;
        expect_ok_flag(NAME, &body)
    }
}

fn file_part(attachment: &Attachment) -> Part {
    let part = || Part::bytes(attachment.content.clone()).file_name(attachment.filename.clone());
    match attachment.mime_type.as_deref() {
        Some(mime) => part().mime_str(mime).unwrap_or_else(|_| part()),
        None => part(),
    }
}

#[async_trait]
impl ProviderAdapter for SlackAdapter {
    type Config = SlackConfig;

    fn provider(&self) -> ProviderType {
        ProviderType::Slack
    }

    fn validate(&self, config: &SlackConfig) -> Result<(), DeliveryError> {
        config.validate()
    }

    async fn send_text(&self, body: &str, config: &SlackConfig) -> Result<(), DeliveryError> {
        let payload = serde_json::json!({
            "channel": config.channel_id,
            "text": body,
        });
        let resp = self
            .client
            .post(self.api_url("chat.postMessage"))
            .bearer_auth(config.token.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| DeliveryError::transport(NAME, e))?;
        let body = read_json(NAME, resp).await?;
        expect_ok_flag(NAME, &body)?;
        info!(channel = %config.channel_id, "Slack message sent");
        Ok(())
    }

    async fn send_attachments(
        &self,
        attachments: &[Attachment],
        config: &SlackConfig,
        _stager: &BlobStager,
    ) -> AttachmentBatch {
        let results = process_in_order(
            attachments
                .iter()
                .map(|a| self.upload_one(a, config).boxed())
                .collect(),
            self.concurrency,
        )
        .await;

        let mut uploaded = Vec::new();
        let outcomes = attachments
            .iter()
            .zip(results)
            .map(|(a, result)| match result {
                Ok(file) => {
                    let reference = DeliveredRef::ProviderFileId(file.id.clone());
                    uploaded.push(file);
                    AttachmentOutcome::delivered(&a.filename, reference)
                }
                Err(e) => {
                    warn!(file = %a.filename, error = %e, "Slack attachment upload failed");
                    AttachmentOutcome::failed(&a.filename, &e)
                }
            })
            .collect();

        let announcement = if uploaded.is_empty() {
            Announcement::Skipped
        } else {
            match self.complete_upload(&uploaded, config).await {
                Ok(()) => {
                    info!(count = uploaded.len(), channel = %config.channel_id, "Slack files shared");
                    Announcement::Sent
                }
                Err(e) => {
                    warn!(error = %e, "Slack completeUploadExternal failed");
                    Announcement::Failed(e.to_string())
                }
            }
        };

        AttachmentBatch {
            outcomes,
            announcement,
        }
    }
}
