pub mod token;

pub use token::{AccessTokenProvider, MESSAGING_SCOPE, ServiceAccountKey};

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use uuid::Uuid;

use chatter_types::models::Message;

const DEFAULT_SEND_BASE: &str = "https://fcm.googleapis.com/v1";
const DEFAULT_TOPIC_BASE: &str = "https://iid.googleapis.com/iid/v1";

/// Devices viewing a channel subscribe to this topic; sends fan out to it.
pub fn channel_topic(channel_id: &str) -> String {
    format!("group_{channel_id}")
}

#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Attempt budget per dispatch. Exhausting it yields a `Failed` outcome.
    pub max_attempts: u32,
    /// Base delay between attempts, scaled by the attempt number.
    pub retry_delay: Duration,
    /// Override for the send endpoint (self-hosted relays, loopback tests).
    pub send_url: Option<String>,
    /// Override for the topic-relationship endpoint.
    pub topic_base: Option<String>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_millis(500),
            send_url: None,
            topic_base: None,
        }
    }
}

/// One queued push broadcast.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub id: Uuid,
    pub topic: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    Delivered {
        id: Uuid,
        topic: String,
        attempts: u32,
    },
    Failed {
        id: Uuid,
        topic: String,
        attempts: u32,
        error: String,
    },
}

/// Push-notification dispatcher.
///
/// `notify` is fire-and-forget for the caller: dispatches are queued to a
/// background worker that sends with a bounded retry budget. Outcomes never
/// reach the message-send path; they are logged and published on the
/// outcome channel for anyone who cares to watch.
pub struct Notifier {
    tx: mpsc::UnboundedSender<Dispatch>,
    outcome_tx: broadcast::Sender<DispatchOutcome>,
    tokens: Arc<AccessTokenProvider>,
    http: reqwest::Client,
    topic_base: String,
}

impl Notifier {
    pub fn new(key: ServiceAccountKey, config: NotifyConfig) -> Result<Self> {
        let send_url = config.send_url.clone().unwrap_or_else(|| {
            format!(
                "{DEFAULT_SEND_BASE}/projects/{}/messages:send",
                key.project_id
            )
        });
        let topic_base = config
            .topic_base
            .clone()
            .unwrap_or_else(|| DEFAULT_TOPIC_BASE.to_string());

        let tokens = Arc::new(AccessTokenProvider::new(key)?);
        let http = reqwest::Client::new();

        let (tx, rx) = mpsc::unbounded_channel();
        let (outcome_tx, _) = broadcast::channel(256);

        let worker = Worker {
            http: http.clone(),
            tokens: tokens.clone(),
            send_url,
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay,
            outcome_tx: outcome_tx.clone(),
        };
        tokio::spawn(worker.run(rx));

        Ok(Self {
            tx,
            outcome_tx,
            tokens,
            http,
            topic_base,
        })
    }

    /// Queue a broadcast to every subscriber of the channel's topic,
    /// the sender's own devices included.
    pub fn notify(&self, channel_name: &str, message: &Message, channel_id: &str) {
        let dispatch = Dispatch {
            id: Uuid::new_v4(),
            topic: channel_topic(channel_id),
            title: format!("You have new messages in {channel_name}"),
            body: format!("{}: {}", message.sender_name, message.preview()),
        };

        if self.tx.send(dispatch).is_err() {
            warn!("notification worker is gone, dropping dispatch");
        }
    }

    /// Watch dispatch outcomes. Slow receivers miss old entries rather than
    /// blocking the worker.
    pub fn outcomes(&self) -> broadcast::Receiver<DispatchOutcome> {
        self.outcome_tx.subscribe()
    }

    /// Register a device's push token on a channel's topic.
    pub async fn subscribe_device(&self, registration_token: &str, channel_id: &str) -> Result<()> {
        let topic = channel_topic(channel_id);
        let url = format!("{}/{registration_token}/rel/topics/{topic}", self.topic_base);

        let token = self.tokens.token().await?;
        let resp = self
            .http
            .post(&url)
            .bearer_auth(token)
            .header("access_token_auth", "true")
            .send()
            .await
            .context("topic subscription request failed")?;

        if !resp.status().is_success() {
            bail!("topic subscription for {topic} rejected: {}", resp.status());
        }

        info!("device subscribed to {topic}");
        Ok(())
    }
}

struct Worker {
    http: reqwest::Client,
    tokens: Arc<AccessTokenProvider>,
    send_url: String,
    max_attempts: u32,
    retry_delay: Duration,
    outcome_tx: broadcast::Sender<DispatchOutcome>,
}

impl Worker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<Dispatch>) {
        while let Some(dispatch) = rx.recv().await {
            let outcome = self.deliver(&dispatch).await;
            match &outcome {
                DispatchOutcome::Delivered { topic, attempts, .. } => {
                    info!("push to {topic} delivered after {attempts} attempt(s)");
                }
                DispatchOutcome::Failed {
                    topic,
                    attempts,
                    error,
                    ..
                } => {
                    warn!("push to {topic} failed after {attempts} attempt(s): {error}");
                }
            }
            // No receivers is the normal case.
            let _ = self.outcome_tx.send(outcome);
        }
    }

    async fn deliver(&self, dispatch: &Dispatch) -> DispatchOutcome {
        let payload = build_payload(&dispatch.topic, &dispatch.title, &dispatch.body);
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            match self.try_send(&payload).await {
                Ok(()) => {
                    return DispatchOutcome::Delivered {
                        id: dispatch.id,
                        topic: dispatch.topic.clone(),
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    last_error = format!("{e:#}");
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_delay * attempt).await;
                    }
                }
            }
        }

        DispatchOutcome::Failed {
            id: dispatch.id,
            topic: dispatch.topic.clone(),
            attempts: self.max_attempts,
            error: last_error,
        }
    }

    async fn try_send(&self, payload: &Value) -> Result<()> {
        let token = self.tokens.token().await?;

        let resp = self
            .http
            .post(&self.send_url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(payload)
            .send()
            .await
            .context("push send request failed")?;

        if !resp.status().is_success() {
            bail!("push endpoint rejected send: {}", resp.status());
        }

        Ok(())
    }
}

pub(crate) fn build_payload(topic: &str, title: &str, body: &str) -> Value {
    json!({
        "message": {
            "topic": topic,
            "notification": {
                "title": title,
                "body": body,
            },
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_follows_group_naming_convention() {
        assert_eq!(channel_topic("c1"), "group_c1");
    }

    #[test]
    fn payload_matches_the_send_contract() {
        let payload = build_payload("group_c1", "You have new messages in General", "Ada: hello");
        assert_eq!(
            payload,
            json!({
                "message": {
                    "topic": "group_c1",
                    "notification": {
                        "title": "You have new messages in General",
                        "body": "Ada: hello",
                    },
                },
            })
        );
    }

    #[test]
    fn notification_body_uses_image_label_for_attachments() {
        let message = Message {
            id: "m1".into(),
            sender_id: "u1".into(),
            sender_name: "Ada".into(),
            message: None,
            created_at: 0,
            sender_image: None,
            image_url: Some("https://bucket/123.jpg".into()),
        };
        assert_eq!(
            format!("{}: {}", message.sender_name, message.preview()),
            "Ada: Image"
        );
    }
}
