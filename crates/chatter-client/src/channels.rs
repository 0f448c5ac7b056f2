use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::info;

use chatter_store::{Store, StoreError, Subscription};
use chatter_types::models::{Channel, Session};

const CHANNELS_PATH: &str = "channel";

/// The flat list of named channels under `channel/{key}`.
pub struct ChannelDirectory {
    store: Arc<Store>,
}

impl ChannelDirectory {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Live view of the channel list. Every change to the collection
    /// delivers the complete updated list.
    pub fn channels(&self, session: &Session) -> ChannelFeed {
        ChannelFeed {
            inner: self.store.subscribe(CHANNELS_PATH, Some(&session.id_token)),
        }
    }

    /// Only the name is written; the store key becomes the channel id.
    pub async fn add_channel(&self, name: &str, session: &Session) -> Result<()> {
        let key = self.store.push_id();
        self.store
            .put(
                &format!("{CHANNELS_PATH}/{key}"),
                &name,
                Some(&session.id_token),
            )
            .await
            .with_context(|| format!("failed to add channel '{name}'"))?;

        info!("channel '{name}' added as {key}");
        Ok(())
    }
}

pub struct ChannelFeed {
    inner: Subscription,
}

impl ChannelFeed {
    pub async fn next(&mut self) -> Option<Result<Vec<Channel>, StoreError>> {
        let update = self.inner.next().await?;
        Some(update.map(|snapshot| channels_from_snapshot(&snapshot)))
    }

    /// Release the underlying listener.
    pub fn cancel(self) {
        self.inner.cancel();
    }
}

pub(crate) fn channels_from_snapshot(snapshot: &Value) -> Vec<Channel> {
    let Value::Object(entries) = snapshot else {
        return Vec::new();
    };

    entries
        .iter()
        .map(|(key, value)| Channel {
            id: key.clone(),
            name: value
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_maps_keys_to_ids_and_values_to_names() {
        let snapshot = json!({"-Na1": "General", "-Na2": "Random"});
        let channels = channels_from_snapshot(&snapshot);
        assert_eq!(
            channels,
            vec![
                Channel {
                    id: "-Na1".into(),
                    name: "General".into()
                },
                Channel {
                    id: "-Na2".into(),
                    name: "Random".into()
                },
            ]
        );
    }

    #[test]
    fn empty_or_missing_collection_is_an_empty_list() {
        assert!(channels_from_snapshot(&Value::Null).is_empty());
        assert!(channels_from_snapshot(&json!({})).is_empty());
    }
}
