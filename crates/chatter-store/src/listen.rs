use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::StoreError;

/// A live view of one store subtree.
///
/// Each delivery is the full updated snapshot after a change, not a diff.
/// The listener runs until the store closes it (delivered as a final `Err`)
/// or until the subscription is cancelled or dropped, which aborts the
/// listener task. Nothing is delivered after that.
pub struct Subscription {
    rx: mpsc::Receiver<Result<Value, StoreError>>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Wait for the next snapshot. `None` once the listener has shut down.
    pub async fn next(&mut self) -> Option<Result<Value, StoreError>> {
        self.rx.recv().await
    }

    /// Release the underlying listener.
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub(crate) fn spawn(http: reqwest::Client, url: String, path: String) -> Subscription {
    let (tx, rx) = mpsc::channel(32);

    let task = tokio::spawn(async move {
        if let Err(e) = run_listener(&http, &url, &path, &tx).await {
            // The receiver may already be gone; that is fine.
            let _ = tx.send(Err(e)).await;
        }
        debug!("listener on {} closed", path);
    });

    Subscription { rx, task }
}

async fn run_listener(
    http: &reqwest::Client,
    url: &str,
    path: &str,
    tx: &mpsc::Sender<Result<Value, StoreError>>,
) -> Result<(), StoreError> {
    let resp = http
        .get(url)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .send()
        .await?;

    if !resp.status().is_success() {
        return Err(StoreError::Rejected {
            path: path.to_string(),
            status: resp.status(),
        });
    }

    debug!("listener on {} open", path);

    let mut body = resp.bytes_stream();
    let mut pending = String::new();
    let mut snapshot = Value::Null;

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        pending.push_str(&String::from_utf8_lossy(&chunk));

        // Events are blank-line separated blocks.
        while let Some(pos) = pending.find("\n\n") {
            let block: String = pending.drain(..pos + 2).collect();
            if block.trim().is_empty() {
                continue;
            }

            match parse_event(block.trim_end())? {
                StreamEvent::Put { path, data } => {
                    apply_put(&mut snapshot, &path, data);
                    if tx.send(Ok(snapshot.clone())).await.is_err() {
                        return Ok(());
                    }
                }
                StreamEvent::Patch { path, data } => {
                    apply_patch(&mut snapshot, &path, data);
                    if tx.send(Ok(snapshot.clone())).await.is_err() {
                        return Ok(());
                    }
                }
                StreamEvent::KeepAlive => {}
                StreamEvent::Cancel => return Err(StoreError::Cancelled),
                StreamEvent::AuthRevoked => return Err(StoreError::AuthRevoked),
            }
        }
    }

    Ok(())
}

#[derive(Debug)]
pub(crate) enum StreamEvent {
    Put { path: String, data: Value },
    Patch { path: String, data: Value },
    KeepAlive,
    Cancel,
    AuthRevoked,
}

#[derive(Deserialize)]
struct EventPayload {
    path: String,
    data: Value,
}

pub(crate) fn parse_event(block: &str) -> Result<StreamEvent, StoreError> {
    let mut name: Option<&str> = None;
    let mut data = String::new();

    for line in block.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            name = Some(rest.trim());
        } else if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.trim_start());
        }
    }

    match name {
        Some("put") | Some("patch") => {
            let payload: EventPayload = serde_json::from_str(&data)
                .map_err(|e| StoreError::BadEvent(e.to_string()))?;
            if name == Some("put") {
                Ok(StreamEvent::Put {
                    path: payload.path,
                    data: payload.data,
                })
            } else {
                Ok(StreamEvent::Patch {
                    path: payload.path,
                    data: payload.data,
                })
            }
        }
        Some("keep-alive") => Ok(StreamEvent::KeepAlive),
        Some("cancel") => Ok(StreamEvent::Cancel),
        Some("auth_revoked") => Ok(StreamEvent::AuthRevoked),
        Some(other) => Err(StoreError::BadEvent(format!("unknown event '{other}'"))),
        None => Err(StoreError::BadEvent("event without a name".into())),
    }
}

/// Replace the subtree at `path` with `data`; a null `data` deletes the key.
pub(crate) fn apply_put(snapshot: &mut Value, path: &str, data: Value) {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let Some((last, parents)) = segments.split_last() else {
        *snapshot = data;
        return;
    };

    let mut current = snapshot;
    for segment in parents {
        if !current.is_object() {
            *current = Value::Object(serde_json::Map::new());
        }
        current = current
            .as_object_mut()
            .unwrap()
            .entry(segment.to_string())
            .or_insert(Value::Null);
    }

    if !current.is_object() {
        *current = Value::Object(serde_json::Map::new());
    }
    let map = current.as_object_mut().unwrap();
    if data.is_null() {
        map.remove(*last);
    } else {
        map.insert(last.to_string(), data);
    }
}

/// Merge the children of `data` into the subtree at `path`.
pub(crate) fn apply_patch(snapshot: &mut Value, path: &str, data: Value) {
    if let Value::Object(entries) = data {
        for (key, value) in entries {
            let child = format!("{}/{}", path.trim_end_matches('/'), key);
            apply_put(snapshot, &child, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_put_event() {
        let block = "event: put\ndata: {\"path\":\"/c1\",\"data\":{\"a\":1}}";
        match parse_event(block).unwrap() {
            StreamEvent::Put { path, data } => {
                assert_eq!(path, "/c1");
                assert_eq!(data, json!({"a": 1}));
            }
            other => panic!("expected put, got {other:?}"),
        }
    }

    #[test]
    fn parse_keep_alive_and_cancel() {
        assert!(matches!(
            parse_event("event: keep-alive\ndata: null").unwrap(),
            StreamEvent::KeepAlive
        ));
        assert!(matches!(
            parse_event("event: cancel\ndata: null").unwrap(),
            StreamEvent::Cancel
        ));
        assert!(matches!(
            parse_event("event: auth_revoked\ndata: credential is no longer valid").unwrap(),
            StreamEvent::AuthRevoked
        ));
    }

    #[test]
    fn unknown_event_is_rejected() {
        assert!(matches!(
            parse_event("event: mystery\ndata: {}"),
            Err(StoreError::BadEvent(_))
        ));
    }

    #[test]
    fn put_at_root_replaces_snapshot() {
        let mut snapshot = json!({"old": true});
        apply_put(&mut snapshot, "/", json!({"k1": "General"}));
        assert_eq!(snapshot, json!({"k1": "General"}));
    }

    #[test]
    fn put_at_child_creates_intermediate_objects() {
        let mut snapshot = Value::Null;
        apply_put(&mut snapshot, "/m1/text", json!("hello"));
        assert_eq!(snapshot, json!({"m1": {"text": "hello"}}));
    }

    #[test]
    fn put_null_deletes_the_key() {
        let mut snapshot = json!({"m1": {"text": "hello"}, "m2": {"text": "bye"}});
        apply_put(&mut snapshot, "/m1", Value::Null);
        assert_eq!(snapshot, json!({"m2": {"text": "bye"}}));
    }

    #[test]
    fn patch_merges_children_without_clearing_siblings() {
        let mut snapshot = json!({"c": {"a": 1, "b": 2}});
        apply_patch(&mut snapshot, "/c", json!({"b": 3, "d": 4}));
        assert_eq!(snapshot, json!({"c": {"a": 1, "b": 3, "d": 4}}));
    }
}
