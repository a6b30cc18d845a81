//! Raid Core - shared types, configuration, and error handling

pub mod config;
pub mod error;
pub mod messages;

pub use config::{BrokerConfig, LlmBackendConfig, RaidConfig};
pub use error::{Error, Result};
pub use messages::{ResultMessage, ResultStatus, TaskMessage};
