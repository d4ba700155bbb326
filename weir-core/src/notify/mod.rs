//! Notification fan-out.
//!
//! User-visible events (executions, funding problems, lifecycle changes)
//! are published on the bus as `Notification` events and forwarded to
//! every configured channel. A channel failing to deliver never disturbs
//! trading.

mod telegram;

pub use telegram::TelegramChannel;

use tracing::info;

use crate::config::NotificationConfig;
use crate::core::{Event, Result};

/// A single notification sink.
pub trait NotificationChannel: Send + Sync {
    /// Deliver the message; returns whether the channel accepted it.
    fn send(&self, message: &str) -> bool;
}

/// Fans messages out over all configured channels.
pub struct NotificationService {
    channels: Vec<Box<dyn NotificationChannel>>,
}

impl NotificationService {
    pub fn new(config: &NotificationConfig) -> Self {
        let mut service = Self {
            channels: Vec::new(),
        };
        if let Some(telegram) = &config.telegram {
            service.add_channel(Box::new(TelegramChannel::new(
                &telegram.bot_token,
                &telegram.chat_id,
            )));
        }
        service
    }

    pub fn add_channel(&mut self, channel: Box<dyn NotificationChannel>) {
        self.channels.push(channel);
    }

    /// Send through all channels; true when at least one accepted the
    /// message.
    pub fn notify(&self, message: &str) -> bool {
        info!("Sending notification: {message}");
        let mut accepted = false;
        for channel in &self.channels {
            if channel.send(message) {
                accepted = true;
            }
        }
        accepted
    }

    /// Bus subscriber forwarding `Notification` events.
    pub fn on_notification(&self, event: &Event) -> Result<()> {
        if let Event::Notification { message } = event {
            self.notify(message);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct Recording {
        messages: Arc<Mutex<Vec<String>>>,
        accept: bool,
    }

    impl NotificationChannel for Recording {
        fn send(&self, message: &str) -> bool {
            self.messages.lock().push(message.to_owned());
            self.accept
        }
    }

    #[test]
    fn test_no_channels_rejects() {
        let service = NotificationService::new(&NotificationConfig::default());
        assert!(!service.notify("hello"));
    }

    #[test]
    fn test_fan_out_and_acceptance() {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let mut service = NotificationService::new(&NotificationConfig::default());
        service.add_channel(Box::new(Recording {
            messages: messages.clone(),
            accept: false,
        }));
        service.add_channel(Box::new(Recording {
            messages: messages.clone(),
            accept: true,
        }));
        assert!(service.notify("grid is live"));
        assert_eq!(messages.lock().len(), 2);
    }

    #[test]
    fn test_on_notification_forwards_message() {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let mut service = NotificationService::new(&NotificationConfig::default());
        service.add_channel(Box::new(Recording {
            messages: messages.clone(),
            accept: true,
        }));
        service
            .on_notification(&Event::Notification {
                message: "filled".into(),
            })
            .unwrap();
        service.on_notification(&Event::PrepareForTrading).unwrap();
        assert_eq!(*messages.lock(), vec!["filled".to_string()]);
    }
}
