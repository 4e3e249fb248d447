//! Operator notifications. Best effort by design: a failed delivery is
//! logged and swallowed, never an error for the pipeline.

use async_trait::async_trait;
use tracing::warn;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `content` as a named text file attachment.
    async fn send_document(&self, filename: &str, content: &str, caption: &str);

    /// Deliver a short plain-text message.
    async fn send_message(&self, text: &str);
}

/// Telegram Bot API notifier targeting a single operator chat.
pub struct TelegramNotifier {
    client: reqwest::Client,
    base_url: String,
    chat_id: i64,
}

impl TelegramNotifier {
    pub fn new(bot_token: &str, chat_id: i64) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("https://api.telegram.org/bot{}", bot_token),
            chat_id,
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_document(&self, filename: &str, content: &str, caption: &str) {
        let part = reqwest::multipart::Part::text(content.to_string())
            .file_name(filename.to_string())
            .mime_str("text/plain")
            .unwrap_or_else(|_| {
                reqwest::multipart::Part::text(content.to_string()).file_name(filename.to_string())
            });
        let form = reqwest::multipart::Form::new()
            .text("chat_id", self.chat_id.to_string())
            .text("caption", caption.to_string())
            .part("document", part);

        let result = self
            .client
            .post(format!("{}/sendDocument", self.base_url))
            .multipart(form)
            .send()
            .await
            .and_then(|response| response.error_for_status());

        if let Err(err) = result {
            warn!("sendDocument failed: {}", err);
        }
    }

    async fn send_message(&self, text: &str) {
        let result = self
            .client
            .post(format!("{}/sendMessage", self.base_url))
            .json(&serde_json::json!({"chat_id": self.chat_id, "text": text}))
            .send()
            .await
            .and_then(|response| response.error_for_status());

        if let Err(err) = result {
            warn!("sendMessage failed: {}", err);
        }
    }
}

/// Drops everything. Used when no operator channel is configured.
#[derive(Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send_document(&self, _filename: &str, _content: &str, _caption: &str) {}

    async fn send_message(&self, _text: &str) {}
}

#[cfg(test)]
pub mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Captures everything sent, for assertions in pipeline tests.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub documents: Mutex<Vec<(String, String, String)>>,
        pub messages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_document(&self, filename: &str, content: &str, caption: &str) {
            self.documents.lock().unwrap().push((
                filename.to_string(),
                content.to_string(),
                caption.to_string(),
            ));
        }

        async fn send_message(&self, text: &str) {
            self.messages.lock().unwrap().push(text.to_string());
        }
    }

    #[tokio::test]
    async fn noop_notifier_accepts_everything() {
        let notifier = NoopNotifier;
        notifier.send_document("a.txt", "body", "caption").await;
        notifier.send_message("hello").await;
    }

    #[tokio::test]
    async fn recording_notifier_captures_in_order() {
        let notifier = RecordingNotifier::default();
        notifier.send_message("first").await;
        notifier.send_message("second").await;
        let messages = notifier.messages.lock().unwrap();
        assert_eq!(messages.as_slice(), ["first", "second"]);
    }
}
