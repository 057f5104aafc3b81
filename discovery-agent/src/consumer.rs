//! Receivers of reconciled catalog actions.

use apigee_discovery::{CatalogAction, SyncError, SyncResult};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

/// Downstream catalog that applies create/update/delete actions.
///
/// A failed `apply` fails the job cycle; the job's last-known listing is not
/// advanced, so the same changes are offered again next cycle.
#[async_trait]
pub trait CatalogConsumer: Send + Sync {
    async fn apply(&self, actions: &[CatalogAction]) -> SyncResult<()>;
}

/// Logs every action.
#[derive(Clone, Debug, Default)]
pub struct LoggingConsumer;

#[async_trait]
impl CatalogConsumer for LoggingConsumer {
    async fn apply(&self, actions: &[CatalogAction]) -> SyncResult<()> {
        for action in actions {
            info!(
                action = action.verb(),
                kind = %action.kind(),
                id = %action.id(),
                "Catalog action"
            );
        }
        Ok(())
    }
}

/// Forwards actions over a bounded tokio channel.
#[derive(Clone, Debug)]
pub struct ChannelConsumer {
    tx: mpsc::Sender<CatalogAction>,
}

impl ChannelConsumer {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<CatalogAction>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl CatalogConsumer for ChannelConsumer {
    async fn apply(&self, actions: &[CatalogAction]) -> SyncResult<()> {
        for action in actions {
            self.tx.send(action.clone()).await.map_err(|_| {
                SyncError::TransientFetchFailure("catalog consumer channel closed".to_string())
            })?;
        }
        Ok(())
    }
}
