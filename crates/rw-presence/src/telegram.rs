use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use crate::errors::{PresenceError, Result};

pub const TELEGRAM_API: &str = "https://api.telegram.org";

/// Edit failures after which a fresh message is posted instead
const REPOST_ON: &[&str] = &[
    "message is too old",
    "can't be edited",
    "message to edit not found",
];

/// Destination for the rendered status block
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    /// Show `text`, reusing the message `previous` when possible.
    ///
    /// Returns the id of the message now carrying the status.
    async fn publish(&self, text: &str, previous: Option<i64>) -> Result<i64>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

/// Publishes into one chat through the Telegram Bot API, keeping a single
/// pinned status message up to date
#[derive(Clone)]
pub struct TelegramPublisher {
    http: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramPublisher {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            api_base: TELEGRAM_API.to_string(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: Value) -> Result<T> {
        let url = format!(
            "{}/bot{}/{}",
            self.api_base.trim_end_matches('/'),
            self.bot_token,
            method
        );
        debug!("Calling Telegram {}", method);

        // The request URL carries the bot token
        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PresenceError::Network(e.without_url()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PresenceError::Network(e.without_url()))?;

        let parsed: ApiResponse<T> = serde_json::from_str(&text).map_err(|_| PresenceError::Telegram {
            description: format!("HTTP {}: {}", status, text.chars().take(200).collect::<String>()),
        })?;

        match parsed {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { description, .. } => Err(PresenceError::Telegram {
                description: description.unwrap_or_else(|| format!("HTTP {}", status)),
            }),
        }
    }

    async fn edit(&self, message_id: i64, text: &str) -> Result<()> {
        self.call::<Value>(
            "editMessageText",
            json!({
                "chat_id": self.chat_id,
                "message_id": message_id,
                "text": text,
                "parse_mode": "Markdown",
            }),
        )
        .await
        .map(|_| ())
    }

    async fn send_pinned(&self, text: &str) -> Result<i64> {
        let sent: SentMessage = self
            .call(
                "sendMessage",
                json!({
                    "chat_id": self.chat_id,
                    "text": text,
                    "parse_mode": "Markdown",
                    "disable_notification": true,
                }),
            )
            .await?;

        let pinned = self
            .call::<Value>(
                "pinChatMessage",
                json!({
                    "chat_id": self.chat_id,
                    "message_id": sent.message_id,
                    "disable_notification": true,
                }),
            )
            .await;
        if let Err(e) = pinned {
            warn!(message_id = sent.message_id, "Could not pin status message: {}", e);
        }

        Ok(sent.message_id)
    }
}

impl std::fmt::Debug for TelegramPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramPublisher")
            .field("api_base", &self.api_base)
            .field("bot_token", &"[REDACTED]")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

#[async_trait]
impl StatusPublisher for TelegramPublisher {
    #[instrument(skip(self, text))]
    async fn publish(&self, text: &str, previous: Option<i64>) -> Result<i64> {
        if let Some(message_id) = previous {
            match self.edit(message_id, text).await {
                Ok(()) => return Ok(message_id),
                Err(PresenceError::Telegram { description }) => {
                    let lowered = description.to_lowercase();
                    if lowered.contains("message is not modified") {
                        debug!("Status unchanged");
                        return Ok(message_id);
                    }
                    if !REPOST_ON.iter().any(|reason| lowered.contains(reason)) {
                        return Err(PresenceError::Telegram { description });
                    }
                    info!("Status message {} can no longer be edited: {}", message_id, description);
                }
                Err(e) => return Err(e),
            }
        }

        let message_id = self.send_pinned(text).await?;
        info!("Posted new status message {}", message_id);
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn publisher(server: &MockServer) -> TelegramPublisher {
        TelegramPublisher::new("123:abc", "-100200", Duration::from_secs(5))
            .unwrap()
            .with_api_base(server.uri())
    }

    fn telegram_error(description: &str) -> ResponseTemplate {
        ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": description
        }))
    }

    async fn mount_send_and_pin(server: &MockServer, message_id: i64) {
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(json!({"chat_id": "-100200", "disable_notification": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": message_id, "date": 0, "chat": {"id": -100200}}
            })))
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/pinChatMessage"))
            .and(body_partial_json(json!({"message_id": message_id, "disable_notification": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": true})))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_edit_existing_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/editMessageText"))
            .and(body_partial_json(json!({"message_id": 42, "parse_mode": "Markdown"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": 42}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let id = publisher(&server).publish("status", Some(42)).await.unwrap();
        assert_eq!(id, 42);
    }

    #[tokio::test]
    async fn test_not_modified_is_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/editMessageText"))
            .respond_with(telegram_error(
                "Bad Request: message is not modified: specified new message content and reply markup are exactly the same",
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let id = publisher(&server).publish("status", Some(42)).await.unwrap();
        assert_eq!(id, 42);
    }

    #[tokio::test]
    async fn test_too_old_message_is_reposted_and_pinned() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/editMessageText"))
            .respond_with(telegram_error("Bad Request: message can't be edited"))
            .expect(1)
            .mount(&server)
            .await;
        mount_send_and_pin(&server, 77).await;

        let id = publisher(&server).publish("status", Some(42)).await.unwrap();
        assert_eq!(id, 77);
    }

    #[tokio::test]
    async fn test_first_publish_sends_new_message() {
        let server = MockServer::start().await;
        mount_send_and_pin(&server, 5).await;

        let id = publisher(&server).publish("status", None).await.unwrap();
        assert_eq!(id, 5);
    }

    #[tokio::test]
    async fn test_other_edit_errors_propagate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/editMessageText"))
            .respond_with(telegram_error("Bad Request: chat not found"))
            .mount(&server)
            .await;

        let error = publisher(&server).publish("status", Some(42)).await.unwrap_err();
        assert!(matches!(error, PresenceError::Telegram { description } if description.contains("chat not found")));
    }

    #[tokio::test]
    async fn test_network_errors_hide_bot_token() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let publisher = TelegramPublisher::new("123:SECRET", "-100200", Duration::from_secs(5))
            .unwrap()
            .with_api_base(format!("http://127.0.0.1:{}", port));

        let error = publisher.publish("status", None).await.unwrap_err();
        assert!(matches!(error, PresenceError::Network(_)));
        assert!(!error.to_string().contains("SECRET"));
        assert!(!format!("{:?}", error).contains("SECRET"));
    }

    #[tokio::test]
    async fn test_failed_pin_keeps_new_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": 9}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/pinChatMessage"))
            .respond_with(telegram_error("Bad Request: not enough rights to pin a message"))
            .mount(&server)
            .await;

        let id = publisher(&server).publish("status", None).await.unwrap();
        assert_eq!(id, 9);
    }
}
