use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use crate::model::Problem;

/// Receives the problems found for one domain during one sweep.
///
/// Fire-and-forget: delivery failures belong to the implementation and are
/// never retried by the engine.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, owner_id: i64, domain: &str, problems: &[Problem]);
}

/// Everything a notifier was told about one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub owner_id: i64,
    pub domain: String,
    pub problems: Vec<Problem>,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(owner_id: i64, domain: &str, problems: &[Problem]) -> Self {
        Self {
            owner_id,
            domain: domain.to_string(),
            problems: problems.to_vec(),
            raised_at: Utc::now(),
        }
    }
}

/// Emits one structured warning per problem.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, owner_id: i64, domain: &str, problems: &[Problem]) {
        for problem in problems {
            warn!(
                owner_id,
                domain,
                kind = %problem.kind,
                message = %problem.message,
                "Domain problem detected"
            );
        }
    }
}

/// Forwards alerts to a channel, for embedding the engine in a larger
/// service that owns delivery.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<Alert>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::Sender<Alert>) -> Self {
        Self { tx }
    }

    /// A notifier and the receiving end of its channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Alert>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, owner_id: i64, domain: &str, problems: &[Problem]) {
        if let Err(e) = self.tx.send(Alert::new(owner_id, domain, problems)).await {
            warn!(owner_id, domain, error = %e, "Alert receiver gone, dropping alert");
        }
    }
}
