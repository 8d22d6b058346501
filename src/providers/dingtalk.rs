//! DingTalk custom robot adapter.
//!
//! Robots authenticate either by HMAC signature (`secret`) or by requiring a
//! keyword in every message body. When a secret is configured the robot URL
//! carries `timestamp` and `sign` query parameters computed at send time.
//! Attachments are staged in the blob store and announced with a single
//! action card linking to each retrieval URL.

use async_trait::async_trait;
use futures::FutureExt;
use base64::Engine;
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use sha2::Sha256;
use tracing::{debug, info, warn};

use super::http::read_json;
use super::{ProviderAdapter, process_in_order};
use crate::delivery::report::{
    Announcement, Attachment, AttachmentBatch, AttachmentOutcome, DeliveredRef,
};
use crate::error::DeliveryError;
use crate::rules::model::{DingTalkConfig, ProviderType};
use crate::staging::BlobStager;

const NAME: &str = "dingtalk";

type HmacSha256 = Hmac<Sha256>;

/// `urlencode(base64(HMAC-SHA256(secret, "{timestamp}\n{secret}")))`
pub fn sign(secret: &str, timestamp_ms: i64) -> Result<String, DeliveryError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| DeliveryError::config_invalid(NAME, format!("secret: {e}")))?;
    mac.update(format!("{timestamp_ms}\n{secret}").as_bytes());
    let digest = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());
    Ok(urlencoding::encode(&digest).into_owned())
}

/// Plain text message, with the keyword appended when one is configured.
pub fn text_message(body: &str, keyword: &str) -> Value {
    let content = if keyword.is_empty() {
        body.to_string()
    } else {
        format!("{body}{keyword}")
    };
    json!({
        "msgtype": "text",
        "text": { "content": content },
    })
}

/// The robot accepted the message only when `errcode` is present and zero.
fn check_reply(reply: &Value) -> Result<(), DeliveryError> {
    let msg = reply.get("errmsg").and_then(Value::as_str).unwrap_or("");
    match reply.get("errcode").and_then(Value::as_i64) {
        Some(0) => Ok(()),
        Some(code) => Err(DeliveryError::rejected(NAME, format!("errcode {code}: {msg}"))),
        None => Err(DeliveryError::rejected(NAME, format!("reply without errcode: {reply}"))),
    }
}

/// A staged attachment ready to be linked from the action card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedFile {
    pub filename: String,
    pub url: String,
}

/// Action card summarizing an attachment batch: one button per staged file
/// and one line per failure.
pub fn action_card(linked: &[LinkedFile], failed: &[&str], keyword: &str) -> Value {
    let mut text = format!(
        "Successfully uploaded {} attachments:\nFailed to upload {} attachments\n\
         Attachment links have an expiration date, please download them as soon as possible...\n\n",
        linked.len(),
        failed.len()
    );
    let mut btns = Vec::with_capacity(linked.len());
    for file in linked {
        text.push_str(&format!("- [{}]\n", file.filename));
        btns.push(json!({
            "title": file.filename,
            "actionURL": format!(
                "dingtalk://dingtalkclient/page/link?url={}&pc_slide=false",
                urlencoding::encode(&file.url)
            ),
        }));
    }
    for name in failed {
        text.push_str(&format!("- [{name}] failed\n"));
    }
    if !keyword.is_empty() {
        text.push_str(&format!("\n{keyword}"));
    }

    json!({
        "msgtype": "actionCard",
        "actionCard": {
            "title": format!("{} attachments in the email", linked.len() + failed.len()),
            "text": text,
            "btnOrientation": "0",
            "btns": btns,
        },
    })
}

pub struct DingTalkAdapter {
    client: reqwest::Client,
    api_base: String,
    concurrency: usize,
}

impl DingTalkAdapter {
    pub fn new(client: reqwest::Client, api_base: impl Into<String>, concurrency: usize) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            concurrency,
        }
    }

    /// Robot webhook URL. `timestamp_ms` is used for both the `timestamp`
    /// parameter and the signature.
    fn robot_url(&self, config: &DingTalkConfig, timestamp_ms: i64) -> Result<String, DeliveryError> {
        let mut url = format!(
            "{}/robot/send?access_token={}",
            self.api_base,
            urlencoding::encode(config.token.expose_secret())
        );
        let secret = config.secret.expose_secret();
        if !secret.is_empty() {
            let sign = sign(secret, timestamp_ms)?;
            url.push_str(&format!("&timestamp={timestamp_ms}&sign={sign}"));
        }
        Ok(url)
    }

    async fn post(&self, body: &Value, config: &DingTalkConfig) -> Result<(), DeliveryError> {
        let url = self.robot_url(config, chrono::Utc::now().timestamp_millis())?;
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| DeliveryError::transport(NAME, e))?;
        check_reply(&read_json(NAME, resp).await?)
    }

    async fn stage_one(&self, attachment: &Attachment, stager: &BlobStager) -> Result<LinkedFile, DeliveryError> {
        let staged = stager
            .stage(
                &attachment.filename,
                attachment.mime_type.as_deref(),
                attachment.content.clone(),
            )
            .await
            .map_err(|e| DeliveryError::AttachmentStagingFailed {
                filename: attachment.filename.clone(),
                reason: e.to_string(),
            })?;
        debug!(file = %attachment.filename, blob_id = %staged.id, "Attachment staged");
        Ok(LinkedFile {
            filename: attachment.filename.clone(),
            url: staged.url,
        })
    }
}

#[async_trait]
impl ProviderAdapter for DingTalkAdapter {
    type Config = DingTalkConfig;

    fn provider(&self) -> ProviderType {
        ProviderType::DingTalk
    }

    fn validate(&self, config: &DingTalkConfig) -> Result<(), DeliveryError> {
        config.validate()
    }

    async fn send_text(&self, body: &str, config: &DingTalkConfig) -> Result<(), DeliveryError> {
        self.post(&text_message(body, &config.keyword), config).await?;
        info!("DingTalk message sent");
        Ok(())
    }

    async fn send_attachments(
        &self,
        attachments: &[Attachment],
        config: &DingTalkConfig,
        stager: &BlobStager,
    ) -> AttachmentBatch {
        let results = process_in_order(
            attachments
                .iter()
                .map(|a| self.stage_one(a, stager).boxed())
                .collect(),
            self.concurrency,
        )
        .await;

        let mut linked = Vec::new();
        let mut failed = Vec::new();
        let outcomes = attachments
            .iter()
            .zip(results)
            .map(|(a, result)| match result {
                Ok(file) => {
                    let reference = DeliveredRef::Url(file.url.clone());
                    linked.push(file);
                    AttachmentOutcome::delivered(&a.filename, reference)
                }
                Err(e) => {
                    warn!(file = %a.filename, error = %e, "DingTalk attachment staging failed");
                    failed.push(a.filename.as_str());
                    AttachmentOutcome::failed(&a.filename, &e)
                }
            })
            .collect();

        let announcement = if linked.is_empty() {
            Announcement::Skipped
        } else {
            let card = action_card(&linked, &failed, &config.keyword);
            match self.post(&card, config).await {
                Ok(()) => {
                    info!(linked = linked.len(), failed = failed.len(), "DingTalk action card sent");
                    Announcement::Sent
                }
                Err(e) => {
                    warn!(error = %e, "DingTalk action card failed");
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

#[cfg(test)]
mod tests {
    use super::*;

    fn config(secret: &str, keyword: &str) -> DingTalkConfig {
        serde_json::from_value(json!({
            "token": "tok", "secret": secret, "keyword": keyword
        }))
        .unwrap()
    }

    #[test]
    fn sign_matches_known_vector() {
        assert_eq!(
            sign("SECabc123", 1_700_000_000_000).unwrap(),
            "N5P09a4%2Bp1AMJIJWnIvQd2Yxw9%2Bfu%2FoEBnPrjCcsLXk%3D"
        );
    }

    #[test]
    fn robot_url_without_secret_has_no_signature() {
        let a = DingTalkAdapter::new(reqwest::Client::new(), "http://mock", 1);
        let url = a.robot_url(&config("", "mail"), 42).unwrap();
        assert_eq!(url, "http://mock/robot/send?access_token=tok");
    }

    #[test]
    fn robot_url_with_secret_shares_timestamp() {
        let a = DingTalkAdapter::new(reqwest::Client::new(), "http://mock/", 1);
        let url = a.robot_url(&config("SECabc123", ""), 1_700_000_000_000).unwrap();
        assert_eq!(
            url,
            "http://mock/robot/send?access_token=tok&timestamp=1700000000000\
             &sign=N5P09a4%2Bp1AMJIJWnIvQd2Yxw9%2Bfu%2FoEBnPrjCcsLXk%3D"
        );
    }

    #[test]
    fn text_message_appends_keyword() {
        let v = text_message("hello", "mail");
        assert_eq!(v["msgtype"], "text");
        assert_eq!(v["text"]["content"], "hellomail");
        assert_eq!(text_message("hello", "")["text"]["content"], "hello");
    }

    #[test]
    fn action_card_lists_links_and_failures() {
        let linked = vec![LinkedFile {
            filename: "a.pdf".into(),
            url: "https://files.example.com/abc".into(),
        }];
        let card = action_card(&linked, &["b.pdf"], "mail");
        let card = &card["actionCard"];

        assert_eq!(card["title"], "2 attachments in the email");
        let text = card["text"].as_str().unwrap();
        assert!(text.starts_with("Successfully uploaded 1 attachments:\nFailed to upload 1 attachments\n"));
        assert!(text.contains("- [a.pdf]\n"));
        assert!(text.contains("- [b.pdf] failed\n"));
        assert!(text.ends_with("\nmail"));

        let btns = card["btns"].as_array().unwrap();
        assert_eq!(btns.len(), 1);
        assert_eq!(btns[0]["title"], "a.pdf");
        assert_eq!(
            btns[0]["actionURL"],
            "dingtalk://dingtalkclient/page/link?url=https%3A%2F%2Ffiles.example.com%2Fabc&pc_slide=false"
        );
    }

    #[test]
    fn reply_needs_zero_errcode() {
        assert!(check_reply(&json!({"errcode": 0, "errmsg": "ok"})).is_ok());
        let err = check_reply(&json!({"errcode": 310000, "errmsg": "sign not match"})).unwrap_err();
        assert!(err.to_string().contains("sign not match"));
        assert!(matches!(
            check_reply(&json!({"status": "fine"})).unwrap_err(),
            DeliveryError::ProviderRejected { .. }
        ));
    }

    #[test]
    fn action_card_without_keyword_ends_after_lines() {
        let card = action_card(&[], &["x"], "");
        assert!(card["actionCard"]["text"].as_str().unwrap().ends_with("- [x] failed\n"));
    }
}
