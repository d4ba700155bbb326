//! Runtime configuration.

mod types;

pub use types::{BotConfig, DbConfig, NotificationConfig, StrategyKind, TelegramConfig};
