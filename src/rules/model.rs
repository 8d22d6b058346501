//! Rule and provider configuration types.
//!
//! A stored rule value looks like:
//!
//! ```json
//! {"im_type": "dingtalk", "im_config": {"token": "...", "secret": "", "keyword": "mail"}}
//! ```
//!
//! and is keyed in the rule store by its destination pattern.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::DeliveryError;

/// Which provider protocol a rule routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Slack,
    DingTalk,
    Telegram,
}

impl ProviderType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "slack" => Some(ProviderType::Slack),
            "dingtalk" => Some(ProviderType::DingTalk),
            "telegram" => Some(ProviderType::Telegram),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Slack => "slack",
            ProviderType::DingTalk => "dingtalk",
            ProviderType::Telegram => "telegram",
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Slack bot credentials and target channel.
#[derive(Debug, Clone, Deserialize)]
pub struct SlackConfig {
    #[serde(default = "empty_secret", deserialize_with = "secret_string")]
    pub token: SecretString,
    #[serde(default)]
    pub channel_id: String,
}

/// DingTalk robot credentials.
///
/// `secret` and `keyword` are alternative authenticity mechanisms; at least
/// one of them must be set.
#[derive(Debug, Clone, Deserialize)]
pub struct DingTalkConfig {
    #[serde(default = "empty_secret", deserialize_with = "secret_string")]
    pub token: SecretString,
    #[serde(default = "empty_secret", deserialize_with = "secret_string")]
    pub secret: SecretString,
    #[serde(default)]
    pub keyword: String,
}

/// Telegram bot credentials and target chat.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "empty_secret", deserialize_with = "secret_string")]
    pub token: SecretString,
    /// Numeric chat id. Anything that is not an integer deserializes to `None`
    /// and is rejected by validation.
    #[serde(default, deserialize_with = "numeric_chat_id")]
    pub chat_id: Option<i64>,
}

/// Provider configuration, one variant per supported protocol.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "im_type", content = "im_config", rename_all = "lowercase")]
pub enum ProviderConfig {
    Slack(SlackConfig),
    DingTalk(DingTalkConfig),
    Telegram(TelegramConfig),
}

impl ProviderConfig {
    pub fn provider_type(&self) -> ProviderType {
        match self {
            ProviderConfig::Slack(_) => ProviderType::Slack,
            ProviderConfig::DingTalk(_) => ProviderType::DingTalk,
            ProviderConfig::Telegram(_) => ProviderType::Telegram,
        }
    }

    /// Serialize back to the stored wire format (credentials included).
    pub fn to_stored_json(&self) -> serde_json::Value {
        match self {
            ProviderConfig::Slack(c) => serde_json::json!({
                "im_type": "slack",
                "im_config": {
                    "token": c.token.expose_secret(),
                    "channel_id": c.channel_id,
                },
            }),
            ProviderConfig::DingTalk(c) => serde_json::json!({
                "im_type": "dingtalk",
                "im_config": {
                    "token": c.token.expose_secret(),
                    "secret": c.secret.expose_secret(),
                    "keyword": c.keyword,
                },
            }),
            ProviderConfig::Telegram(c) => serde_json::json!({
                "im_type": "telegram",
                "im_config": {
                    "token": c.token.expose_secret(),
                    "chat_id": c.chat_id,
                },
            }),
        }
    }
}

/// A destination pattern bound to a provider configuration.
#[derive(Debug, Clone)]
pub struct Rule {
    pub pattern: String,
    pub config: ProviderConfig,
}

impl Rule {
    pub fn new(pattern: impl Into<String>, config: ProviderConfig) -> Self {
        Self {
            pattern: pattern.into(),
            config,
        }
    }

    /// Build a rule from a store key and its serialized value.
    ///
    /// An `im_type` naming no known provider is reported as
    /// [`DeliveryError::UnsupportedProvider`], any other defect as
    /// `ConfigInvalid`.
    pub fn from_stored(pattern: &str, raw: &str) -> Result<Self, DeliveryError> {
        let invalid = |e: serde_json::Error| {
            DeliveryError::config_invalid("rule", format!("rule {pattern}: {e}"))
        };
        let value: serde_json::Value = serde_json::from_str(raw).map_err(invalid)?;
        match value.get("im_type").and_then(serde_json::Value::as_str) {
            Some(im_type) if ProviderType::parse(im_type).is_none() => {
                return Err(DeliveryError::UnsupportedProvider {
                    im_type: im_type.to_string(),
                });
            }
            _ => {}
        }
        let config: ProviderConfig = serde_json::from_value(value).map_err(invalid)?;
        Ok(Self::new(pattern, config))
    }

    pub fn provider_type(&self) -> ProviderType {
        self.config.provider_type()
    }
}

// ── Validation ──────────────────────────────────────────────────────

impl SlackConfig {
    pub fn validate(&self) -> Result<(), DeliveryError> {
        if self.token.expose_secret().is_empty() {
            return Err(DeliveryError::config_invalid("slack", "token is empty"));
        }
        if self.channel_id.trim().is_empty() {
            return Err(DeliveryError::config_invalid("slack", "channel_id is empty"));
        }
        Ok(())
    }
}

impl DingTalkConfig {
    pub fn validate(&self) -> Result<(), DeliveryError> {
        if self.token.expose_secret().is_empty() {
            return Err(DeliveryError::config_invalid("dingtalk", "token is empty"));
        }
        if self.secret.expose_secret().is_empty() && self.keyword.is_empty() {
            return Err(DeliveryError::config_invalid(
                "dingtalk",
                "either secret or keyword must be set",
            ));
        }
        Ok(())
    }
}

impl TelegramConfig {
    pub fn validate(&self) -> Result<(), DeliveryError> {
        if self.token.expose_secret().is_empty() {
            return Err(DeliveryError::config_invalid("telegram", "token is empty"));
        }
        match self.chat_id {
            Some(id) if id != 0 => Ok(()),
            _ => Err(DeliveryError::config_invalid(
                "telegram",
                "chat_id must be a non-zero integer",
            )),
        }
    }
}

// ── Serde helpers ───────────────────────────────────────────────────

fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}

fn secret_string<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(SecretString::from(value.unwrap_or_default()))
}

fn numeric_chat_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_i64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_slack_rule() {
        let rule = Rule::from_stored(
            "alerts@example.com",
            r#"{"im_type":"slack","im_config":{"token":"xoxb-1","channel_id":"C01"}}"#,
        )
        .unwrap();
        assert_eq!(rule.provider_type(), ProviderType::Slack);
        match rule.config {
            ProviderConfig::Slack(c) => {
                assert_eq!(c.token.expose_secret(), "xoxb-1");
                assert_eq!(c.channel_id, "C01");
            }
            other => panic!("expected slack config, got {other:?}"),
        }
    }

    #[test]
    fn parses_dingtalk_rule_with_missing_optional_fields() {
        let rule = Rule::from_stored(
            ".*@co.com",
            r#"{"im_type":"dingtalk","im_config":{"token":"t","keyword":"mail"}}"#,
        )
        .unwrap();
        let ProviderConfig::DingTalk(c) = rule.config else {
            panic!("expected dingtalk");
        };
        assert!(c.secret.expose_secret().is_empty());
        assert_eq!(c.keyword, "mail");
        assert!(c.validate().is_ok());
    }

    #[test]
    fn telegram_string_chat_id_fails_validation() {
        let rule = Rule::from_stored(
            "bot@x.com",
            r#"{"im_type":"telegram","im_config":{"token":"1:abc","chat_id":"12345"}}"#,
        )
        .unwrap();
        let ProviderConfig::Telegram(c) = rule.config else {
            panic!("expected telegram");
        };
        assert_eq!(c.chat_id, None);
        assert!(matches!(
            c.validate(),
            Err(DeliveryError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn telegram_negative_group_chat_is_valid() {
        let c: TelegramConfig =
            serde_json::from_str(r#"{"token":"1:abc","chat_id":-100200300}"#).unwrap();
        assert!(c.validate().is_ok());
    }

    #[test]
    fn unknown_provider_type_is_unsupported() {
        let err = Rule::from_stored("x", r#"{"im_type":"teams","im_config":{}}"#).unwrap_err();
        assert!(matches!(err, DeliveryError::UnsupportedProvider { ref im_type } if im_type == "teams"));
    }

    #[test]
    fn missing_provider_type_is_config_invalid() {
        let err = Rule::from_stored("x", r#"{"im_config":{"token":"t"}}"#).unwrap_err();
        assert!(matches!(err, DeliveryError::ConfigInvalid { .. }));
        let err = Rule::from_stored("x", "not json").unwrap_err();
        assert!(matches!(err, DeliveryError::ConfigInvalid { .. }));
    }

    #[test]
    fn slack_empty_channel_rejected() {
        let c: SlackConfig = serde_json::from_str(r#"{"token":"x","channel_id":""}"#).unwrap();
        assert!(c.validate().is_err());
    }

    #[test]
    fn dingtalk_requires_secret_or_keyword() {
        let c: DingTalkConfig = serde_json::from_str(r#"{"token":"x"}"#).unwrap();
        assert!(c.validate().is_err());
        let c: DingTalkConfig = serde_json::from_str(r#"{"token":"x","secret":"s"}"#).unwrap();
        assert!(c.validate().is_ok());
    }

    #[test]
    fn debug_output_redacts_credentials() {
        let c: DingTalkConfig =
            serde_json::from_str(r#"{"token":"tok-123","secret":"sec-456"}"#).unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("tok-123"));
        assert!(!dbg.contains("sec-456"));
    }

    #[test]
    fn stored_json_round_trips_through_rule_parser() {
        let original = ProviderConfig::Telegram(TelegramConfig {
            token: SecretString::from("1:abc".to_string()),
            chat_id: Some(42),
        });
        let raw = original.to_stored_json().to_string();
        let rule = Rule::from_stored("p", &raw).unwrap();
        assert_eq!(rule.provider_type(), ProviderType::Telegram);
    }
}
