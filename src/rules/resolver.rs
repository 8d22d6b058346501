//! Destination → provider rule resolution.
//!
//! Patterns are matched in the store's iteration order and the first match
//! wins. Backends do not promise a stable order, so overlapping patterns
//! are resolved differently depending on the store in use.

use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{DeliveryError, InboundError};
use crate::rules::model::Rule;
use crate::store::RuleStore;

/// How a stored pattern is turned into a matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PatternMode {
    /// The pattern is a regular expression, anchored at both ends.
    /// `a.b@x.com` also matches `aXb@x.com`.
    #[default]
    Regex,
    /// Every character of the pattern is literal.
    Literal,
}

impl std::str::FromStr for PatternMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "regex" => Ok(PatternMode::Regex),
            "literal" => Ok(PatternMode::Literal),
            other => Err(format!("unknown pattern mode '{other}' (expected regex or literal)")),
        }
    }
}

/// Compile a stored pattern into a fully anchored matcher.
pub fn compile_pattern(pattern: &str, mode: PatternMode) -> Result<Regex, regex::Error> {
    let body = match mode {
        PatternMode::Regex => pattern.to_string(),
        PatternMode::Literal => regex::escape(pattern),
    };
    Regex::new(&format!("^(?:{body})$"))
}

/// Resolves destinations against a [`RuleStore`].
#[derive(Clone)]
pub struct RuleResolver {
    store: Arc<dyn RuleStore>,
    mode: PatternMode,
}

impl RuleResolver {
    pub fn new(store: Arc<dyn RuleStore>, mode: PatternMode) -> Self {
        Self { store, mode }
    }

    /// Return the first rule whose pattern matches `destination`.
    ///
    /// Malformed patterns are logged and skipped. A destination that
    /// matches nothing yields [`DeliveryError::RuleNotFound`]; a matching
    /// rule whose stored value cannot be parsed yields
    /// [`DeliveryError::ConfigInvalid`], or `UnsupportedProvider` when only
    /// its `im_type` is unknown.
    pub async fn resolve(&self, destination: &str) -> Result<Rule, InboundError> {
        let names = self.store.list().await?;
        debug!(count = names.len(), "Loaded rule list");

        for name in &names {
            let re = match compile_pattern(name, self.mode) {
                Ok(re) => re,
                Err(e) => {
                    warn!(pattern = %name, error = %e, "Skipping malformed rule pattern");
                    continue;
                }
            };

            if !re.is_match(destination) {
                continue;
            }

            let Some(raw) = self.store.get(name).await? else {
                warn!(pattern = %name, "Rule listed but has no stored value, skipping");
                continue;
            };

            let rule = Rule::from_stored(name, &raw)?;
            info!(
                pattern = %name,
                destination,
                provider = %rule.provider_type(),
                "Matched rule"
            );
            return Ok(rule);
        }

        info!(destination, "No matching rule found");
        Err(DeliveryError::RuleNotFound {
            destination: destination.to_string(),
        }
        .into())
    }
}
