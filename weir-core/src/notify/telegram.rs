//! Telegram notification channel.

use reqwest::blocking::Client;
use std::time::Duration;
use tracing::{debug, error};

use crate::notify::NotificationChannel;

pub struct TelegramChannel {
    chat_id: String,
    base_url: String,
    http: Client,
}

impl TelegramChannel {
    pub fn new(bot_token: &str, chat_id: &str) -> Self {
        Self {
            chat_id: chat_id.to_owned(),
            base_url: format!("https://api.telegram.org/bot{bot_token}"),
            http: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }
}

impl NotificationChannel for TelegramChannel {
    fn send(&self, message: &str) -> bool {
        debug!("Sending Telegram notification: {message}");
        let response = self
            .http
            .post(format!("{}/sendMessage", self.base_url))
            .form(&[
                ("chat_id", self.chat_id.as_str()),
                ("text", message),
                ("parse_mode", "markdown"),
            ])
            .send();
        match response {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                error!("Failed to send Telegram notification: {err}");
                false
            }
        }
    }
}
