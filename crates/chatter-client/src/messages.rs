use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;
use tracing::warn;

use chatter_notify::Notifier;
use chatter_store::{Store, StoreError, Subscription};
use chatter_types::models::{Message, Session};

use crate::storage::ImageBucket;

const MESSAGES_PATH: &str = "messages";

/// Message send/receive orchestration for one client.
///
/// A send writes to the per-channel log at `messages/{channelId}/{key}` and,
/// once the write is accepted, hands the message to the notification
/// dispatcher; the fan-out outcome never reaches the sender.
pub struct MessagePipeline {
    store: Arc<Store>,
    bucket: ImageBucket,
    notifier: Arc<Notifier>,
    /// This device's push registration token, when it has one.
    device_token: Option<String>,
}

impl MessagePipeline {
    pub fn new(
        store: Arc<Store>,
        bucket: ImageBucket,
        notifier: Arc<Notifier>,
        device_token: Option<String>,
    ) -> Self {
        Self {
            store,
            bucket,
            notifier,
            device_token,
        }
    }

    pub async fn send_text(
        &self,
        text: &str,
        channel_id: &str,
        channel_name: &str,
        session: &Session,
    ) -> Result<()> {
        self.send(Some(text.to_string()), None, channel_id, channel_name, session)
            .await
    }

    /// Upload first, write second: a failed upload leaves the channel log
    /// untouched.
    pub async fn send_image(
        &self,
        local_image: &Path,
        channel_id: &str,
        channel_name: &str,
        session: &Session,
    ) -> Result<()> {
        let image_url = self
            .bucket
            .upload(local_image)
            .await
            .context("failed to upload image")?;

        self.send(None, Some(image_url), channel_id, channel_name, session)
            .await
    }

    async fn send(
        &self,
        text: Option<String>,
        image_url: Option<String>,
        channel_id: &str,
        channel_name: &str,
        session: &Session,
    ) -> Result<()> {
        let message = Message {
            id: self.store.push_id(),
            sender_id: session.user_id.clone(),
            sender_name: session.display_name.clone(),
            message: text,
            created_at: Utc::now().timestamp_millis(),
            sender_image: None,
            image_url,
        };

        self.store
            .put(
                &format!("{MESSAGES_PATH}/{channel_id}/{}", message.id),
                &message,
                Some(&session.id_token),
            )
            .await
            .context("failed to write message")?;

        self.notifier.notify(channel_name, &message, channel_id);
        Ok(())
    }

    /// Live view of a channel's message log, ordered for display. Also
    /// registers this device on the channel's push topic when the device
    /// has a registration token; that registration runs in the background
    /// and its failure only logs.
    pub fn messages(&self, channel_id: &str, session: &Session) -> MessageFeed {
        if let Some(token) = self.device_token.clone() {
            let notifier = self.notifier.clone();
            let channel = channel_id.to_string();
            tokio::spawn(async move {
                if let Err(e) = notifier.subscribe_device(&token, &channel).await {
                    warn!("device topic subscription for {channel} failed: {e:#}");
                }
            });
        }

        MessageFeed {
            inner: self
                .store
                .subscribe(&format!("{MESSAGES_PATH}/{channel_id}"), Some(&session.id_token)),
        }
    }
}

pub struct MessageFeed {
    inner: Subscription,
}

impl MessageFeed {
    pub async fn next(&mut self) -> Option<Result<Vec<Message>, StoreError>> {
        let update = self.inner.next().await?;
        Some(update.map(|snapshot| messages_from_snapshot(&snapshot)))
    }

    /// Release the underlying listener.
    pub fn cancel(self) {
        self.inner.cancel();
    }
}

/// Sender clocks order the log; the store key breaks ties so two messages
/// stamped in the same millisecond still display deterministically.
pub(crate) fn messages_from_snapshot(snapshot: &Value) -> Vec<Message> {
    let Value::Object(entries) = snapshot else {
        return Vec::new();
    };

    let mut messages: Vec<Message> = entries
        .values()
        .filter_map(|value| serde_json::from_value(value.clone()).ok())
        .collect();

    messages.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire_message(id: &str, created_at: i64, text: &str) -> Value {
        json!({
            "id": id,
            "senderId": "u1",
            "senderName": "Ada",
            "message": text,
            "createdAt": created_at,
        })
    }

    #[test]
    fn snapshot_orders_by_timestamp_then_key() {
        let snapshot = json!({
            "kb": wire_message("kb", 200, "second"),
            "kc": wire_message("kc", 100, "tied-late-key"),
            "ka": wire_message("ka", 100, "tied-early-key"),
        });

        let texts: Vec<_> = messages_from_snapshot(&snapshot)
            .into_iter()
            .map(|m| m.message.unwrap())
            .collect();

        assert_eq!(texts, vec!["tied-early-key", "tied-late-key", "second"]);
    }

    #[test]
    fn records_that_do_not_parse_are_skipped() {
        let snapshot = json!({
            "ka": wire_message("ka", 100, "ok"),
            "kb": "not a message",
        });

        let messages = messages_from_snapshot(&snapshot);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message.as_deref(), Some("ok"));
    }

    #[test]
    fn empty_log_is_an_empty_list() {
        assert!(messages_from_snapshot(&Value::Null).is_empty());
    }
}
