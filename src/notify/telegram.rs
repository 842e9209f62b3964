//! Telegram Bot API delivery.

use std::time::Duration;

use super::NotifyError;
use crate::db::Store;

/// HTTP request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends messages through a bot's `sendMessage` method.
#[derive(Clone)]
pub struct TelegramSender {
    client: reqwest::Client,
    api_base: String,
}

impl TelegramSender {
    pub fn new(api_base: impl Into<String>) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_base: api_base.into(),
        })
    }

    /// Deliver `text` using the settings currently in the store.
    ///
    /// Returns `Ok(false)` without sending when notifications are disabled or
    /// not fully configured.
    pub async fn deliver(&self, store: &Store, text: &str) -> Result<bool, NotifyError> {
        let config = store.get_notifier_config()?;
        let (Some(token), Some(chat_id)) = (config.bot_token.as_deref(), config.chat_id.as_deref())
        else {
            return Ok(false);
        };
        if !config.is_active() {
            return Ok(false);
        }

        self.send(token, chat_id, text).await?;
        Ok(true)
    }

    async fn send(&self, token: &str, chat_id: &str, text: &str) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, token);
        let payload = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });

        let response = self.client.post(&url).json(&payload).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Notifier: Telegram rejected message ({}): {}", status, body);
            return Err(NotifyError::HttpStatus(status));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NotifierConfig;
    use crate::notify::{Dispatcher, Notification};
    use crate::testutil::{serve, temp_store};
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use std::sync::{Arc, Mutex};

    type Inbox = Arc<Mutex<Vec<serde_json::Value>>>;

    async fn fake_telegram(status: StatusCode) -> (String, Inbox) {
        let inbox: Inbox = Arc::default();
        let router = Router::new()
            .route(
                "/{*path}",
                post(
                    move |State(inbox): State<Inbox>, Json(body): Json<serde_json::Value>| async move {
                        inbox.lock().unwrap().push(body);
                        status
                    },
                ),
            )
            .with_state(inbox.clone());
        let addr = serve(router).await;
        (format!("http://{}", addr), inbox)
    }

    fn enable(store: &Store) {
        store
            .update_notifier_config(&NotifierConfig {
                bot_token: Some("123:abc".to_string()),
                chat_id: Some("42".to_string()),
                enabled: true,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn test_deliver_posts_markdown_message() {
        let (base, inbox) = fake_telegram(StatusCode::OK).await;
        let (_tmp, store) = temp_store();
        enable(&store);

        let sender = TelegramSender::new(base).unwrap();
        assert!(sender.deliver(&store, "hello").await.unwrap());

        let sent = inbox.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["chat_id"], "42");
        assert_eq!(sent[0]["text"], "hello");
        assert_eq!(sent[0]["parse_mode"], "Markdown");
    }

    #[tokio::test]
    async fn test_deliver_skips_when_disabled() {
        let (base, inbox) = fake_telegram(StatusCode::OK).await;
        let (_tmp, store) = temp_store();

        let sender = TelegramSender::new(base).unwrap();
        assert!(!sender.deliver(&store, "hello").await.unwrap());
        assert!(inbox.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deliver_reports_rejection() {
        let (base, _inbox) = fake_telegram(StatusCode::BAD_REQUEST).await;
        let (_tmp, store) = temp_store();
        enable(&store);

        let sender = TelegramSender::new(base).unwrap();
        let result = sender.deliver(&store, "hello").await;
        assert!(matches!(result, Err(NotifyError::HttpStatus(400))));
    }

    #[tokio::test]
    async fn test_worker_drains_queue_on_shutdown() {
        let (base, inbox) = fake_telegram(StatusCode::OK).await;
        let (_tmp, store) = temp_store();
        enable(&store);

        let sender = TelegramSender::new(base).unwrap();
        let (dispatcher, handle) = Dispatcher::start(Arc::new(store), sender);
        dispatcher.dispatch(Notification::info("one"));
        dispatcher.dispatch(Notification::info("two"));
        drop(dispatcher);
        handle.await.unwrap();

        let texts: Vec<_> = inbox.lock().unwrap().iter().map(|m| m["text"].clone()).collect();
        assert_eq!(texts, vec!["one", "two"]);
    }
}
