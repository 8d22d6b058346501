//! Mail Relay — routes inbound email to chat providers.

pub mod config;
pub mod delivery;
pub mod error;
pub mod inbound;
pub mod providers;
pub mod rules;
pub mod server;
pub mod staging;
pub mod store;
