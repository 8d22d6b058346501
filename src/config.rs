//! Process configuration, built from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;

use crate::delivery::DeliveryOptions;
use crate::error::ConfigError;
use crate::providers::ProviderEndpoints;
use crate::rules::{PatternMode, ProviderConfig, Rule};

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind: SocketAddr,
    pub db_path: PathBuf,
    /// Public prefix of the retrieval endpoint (`{prefix}/{id}`).
    pub storage_url_prefix: String,
    pub pattern_mode: PatternMode,
    pub max_message_bytes: usize,
    pub delivery: DeliveryOptions,
    pub endpoints: ProviderEndpoints,
    /// Optional JSON file of `[{pattern, config}]` loaded into the rule store at startup.
    pub rules_file: Option<PathBuf>,
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let storage_url_prefix = var("MAIL_RELAY_STORAGE_URL_PREFIX")
            .ok_or_else(|| ConfigError::MissingEnvVar("MAIL_RELAY_STORAGE_URL_PREFIX".into()))?;

        let bind = parse_or(&var, "MAIL_RELAY_BIND", SocketAddr::from(([0, 0, 0, 0], 8787)))?;

        let db_path = var("MAIL_RELAY_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/mail-relay.db"));

        let pattern_mode = parse_or(&var, "MAIL_RELAY_RULE_PATTERN_MODE", PatternMode::default())?;
        let max_message_bytes = parse_or(&var, "MAIL_RELAY_MAX_MESSAGE_BYTES", 25 * 1024 * 1024)?;

        let attachment_concurrency: usize = parse_or(&var, "MAIL_RELAY_ATTACHMENT_CONCURRENCY", 1)?;
        if attachment_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MAIL_RELAY_ATTACHMENT_CONCURRENCY".into(),
                message: "must be at least 1".into(),
            });
        }
        let proceed_on_text_failure = parse_or(&var, "MAIL_RELAY_PROCEED_ON_TEXT_FAILURE", true)?;

        let defaults = ProviderEndpoints::default();
        let endpoints = ProviderEndpoints {
            slack_api_base: var("MAIL_RELAY_SLACK_API_BASE").unwrap_or(defaults.slack_api_base),
            dingtalk_api_base: var("MAIL_RELAY_DINGTALK_API_BASE")
                .unwrap_or(defaults.dingtalk_api_base),
            telegram_api_base: var("MAIL_RELAY_TELEGRAM_API_BASE")
                .unwrap_or(defaults.telegram_api_base),
        };

        Ok(Self {
            bind,
            db_path,
            storage_url_prefix,
            pattern_mode,
            max_message_bytes,
            delivery: DeliveryOptions {
                attachment_concurrency,
                proceed_on_text_failure,
            },
            endpoints,
            rules_file: var("MAIL_RELAY_RULES_FILE").map(PathBuf::from),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RuleEntry {
    pattern: String,
    config: ProviderConfig,
}

/// Parse a rules file: a JSON array of `{"pattern": .., "config": {"im_type": .., "im_config": ..}}`,
/// in match order.
pub fn parse_rules(json: &str) -> Result<Vec<Rule>, ConfigError> {
    let entries: Vec<RuleEntry> = serde_json::from_str(json).map_err(|e| ConfigError::InvalidValue {
        key: "MAIL_RELAY_RULES_FILE".into(),
        message: e.to_string(),
    })?;
    Ok(entries
        .into_iter()
        .map(|e| Rule::new(e.pattern, e.config))
        .collect())
}

pub fn load_rules_file(path: &std::path::Path) -> Result<Vec<Rule>, ConfigError> {
    let json = std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidValue {
        key: "MAIL_RELAY_RULES_FILE".into(),
        message: format!("{}: {e}", path.display()),
    })?;
    parse_rules(&json)
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<RelayConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RelayConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn storage_prefix_is_required() {
        let err = config(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "MAIL_RELAY_STORAGE_URL_PREFIX"));
    }

    #[test]
    fn defaults_apply() {
        let c = config(&[("MAIL_RELAY_STORAGE_URL_PREFIX", "https://files.example.com")]).unwrap();
        assert_eq!(c.bind.port(), 8787);
        assert_eq!(c.db_path, PathBuf::from("./data/mail-relay.db"));
        assert_eq!(c.pattern_mode, PatternMode::Regex);
        assert_eq!(c.max_message_bytes, 26_214_400);
        assert_eq!(c.delivery.attachment_concurrency, 1);
        assert!(c.delivery.proceed_on_text_failure);
        assert_eq!(c.endpoints, ProviderEndpoints::default());
        assert!(c.rules_file.is_none());
    }

    #[test]
    fn overrides_are_read() {
        let c = config(&[
            ("MAIL_RELAY_STORAGE_URL_PREFIX", "https://f"),
            ("MAIL_RELAY_BIND", "127.0.0.1:9000"),
            ("MAIL_RELAY_RULE_PATTERN_MODE", "literal"),
            ("MAIL_RELAY_ATTACHMENT_CONCURRENCY", "4"),
            ("MAIL_RELAY_PROCEED_ON_TEXT_FAILURE", "false"),
            ("MAIL_RELAY_TELEGRAM_API_BASE", "http://mock"),
        ])
        .unwrap();
        assert_eq!(c.bind.to_string(), "127.0.0.1:9000");
        assert_eq!(c.pattern_mode, PatternMode::Literal);
        assert_eq!(c.delivery.attachment_concurrency, 4);
        assert!(!c.delivery.proceed_on_text_failure);
        assert_eq!(c.endpoints.telegram_api_base, "http://mock");
        assert_eq!(c.endpoints.slack_api_base, "https://slack.com/api");
    }

    #[test]
    fn invalid_numbers_are_reported() {
        let err = config(&[
            ("MAIL_RELAY_STORAGE_URL_PREFIX", "https://f"),
            ("MAIL_RELAY_MAX_MESSAGE_BYTES", "lots"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "MAIL_RELAY_MAX_MESSAGE_BYTES"));
    }

    #[test]
    fn rules_file_keeps_order() {
        let rules = parse_rules(
            r#"[
                {"pattern": "alice@co\\.com", "config": {"im_type": "dingtalk", "im_config": {"token": "t", "secret": "", "keyword": "mail"}}},
                {"pattern": ".*@co\\.com", "config": {"im_type": "telegram", "im_config": {"token": "t", "chat_id": -42}}}
            ]"#,
        )
        .unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].pattern, r"alice@co\.com");
        assert_eq!(rules[1].provider_type(), crate::rules::ProviderType::Telegram);
    }

    #[test]
    fn malformed_rules_file_is_invalid_value() {
        assert!(matches!(
            parse_rules("{not json").unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        assert!(
            config(&[
                ("MAIL_RELAY_STORAGE_URL_PREFIX", "https://f"),
                ("MAIL_RELAY_ATTACHMENT_CONCURRENCY", "0"),
            ])
            .is_err()
        );
    }
}
