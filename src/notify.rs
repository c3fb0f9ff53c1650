//! Outbound chat notifications.

use crate::error::NotifyError;
use async_trait::async_trait;
use serde_json::json;

/// Discord caps message content at 2000 characters.
const MAX_CONTENT_LEN: usize = 2000;

/// Seam between the poll loop and the chat service. One message per call,
/// single attempt, no delivery guarantee beyond the HTTP status check.
#[async_trait]
pub trait Notifier {
    async fn send(&self, message: &str) -> Result<(), NotifyError>;
}

/// Sends plain-text messages to one channel through the Discord bot API.
pub struct DiscordNotifier {
    http: reqwest::Client,
    token: String,
    channel_id: u64,
}

impl DiscordNotifier {
    pub fn new(token: impl Into<String>, channel_id: u64) -> Self {
        Self {
            http: reqwest::Client::new(),
            token: token.into(),
            channel_id,
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "https://discord.com/api/v10/channels/{}/messages",
            self.channel_id
        )
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn send(&self, message: &str) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(self.messages_url())
            .header("Authorization", format!("Bot {}", self.token))
            .json(&json!({ "content": truncate_content(message) }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Api { status, body });
        }

        tracing::debug!(channel_id = self.channel_id, "notification delivered");
        Ok(())
    }
}

/// Trim to the API limit on a char boundary, marking the cut.
fn truncate_content(message: &str) -> String {
    if message.chars().count() <= MAX_CONTENT_LEN {
        return message.to_string();
    }
    let cut: String = message.chars().take(MAX_CONTENT_LEN - 1).collect();
    format!("{cut}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_messages_pass_through_untouched() {
        assert_eq!(truncate_content("hello"), "hello");
    }

    #[test]
    fn long_messages_are_cut_to_the_api_limit() {
        let long = "a".repeat(MAX_CONTENT_LEN + 50);
        let trimmed = truncate_content(&long);
        assert_eq!(trimmed.chars().count(), MAX_CONTENT_LEN);
        assert!(trimmed.ends_with('…'));
    }

    #[test]
    fn channel_url_targets_the_configured_channel() {
        let notifier = DiscordNotifier::new("token", 42);
        assert_eq!(
            notifier.messages_url(),
            "https://discord.com/api/v10/channels/42/messages"
        );
    }
}
