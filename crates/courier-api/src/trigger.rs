use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use courier_types::events::RowChange;

/// Row-change trigger for the `profiles` table.
///
/// Every fired change goes to in-process subscribers and, when a webhook is
/// configured, is posted to it from a detached task. Delivery is at most
/// once: nothing waits for the webhook, and a failed post is only logged.
#[derive(Clone)]
pub struct Trigger {
    inner: Arc<TriggerInner>,
}

struct TriggerInner {
    broadcast_tx: broadcast::Sender<RowChange>,
    webhook: Option<Webhook>,
}

struct Webhook {
    url: String,
    http: reqwest::Client,
}

impl Trigger {
    pub fn new(webhook_url: Option<String>) -> Self {
        let (broadcast_tx, _) = broadcast::channel(256);
        let webhook = webhook_url.map(|url| Webhook {
            url,
            http: reqwest::Client::new(),
        });
        Self {
            inner: Arc::new(TriggerInner {
                broadcast_tx,
                webhook,
            }),
        }
    }

    /// Subscribe to row changes. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<RowChange> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Fire a row change. Never blocks the caller on delivery.
    pub fn fire(&self, change: RowChange) {
        let _ = self.inner.broadcast_tx.send(change.clone());

        let Some(webhook) = &self.inner.webhook else {
            return;
        };
        let url = webhook.url.clone();
        let http = webhook.http.clone();
        let row_id = change.record.id;

        tokio::spawn(async move {
            match http.post(&url).json(&change).send().await {
                Ok(resp) => {
                    debug!(%row_id, status = resp.status().as_u16(), "Row-change webhook delivered")
                }
                Err(e) => warn!(%row_id, "Row-change webhook failed: {}", e),
            }
        });
    }
}
