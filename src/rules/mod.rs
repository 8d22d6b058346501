//! Routing rules: which provider receives mail for which destination.

pub mod model;
pub mod resolver;

pub use model::{DingTalkConfig, ProviderConfig, ProviderType, Rule, SlackConfig, TelegramConfig};
pub use resolver::{PatternMode, RuleResolver};
