use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};

use crate::{
    error::{AchError, Result},
    nacha::File,
};

/// A built file waiting for its routing number's next cutoff.
#[derive(Debug, Clone)]
pub struct OutboundFile {
    pub transfer_id: String,
    /// Distinguishes the files of one transfer (`single`, `debit`, `credit`, `reversal`).
    pub leg: String,
    pub file: File,
}

pub enum OutboundEvent {
    /// Stage a file. Delivering the same transfer and leg twice overwrites.
    FileStaged(OutboundFile),
    /// Tombstone every staged file of a transfer.
    TransferCanceled { transfer_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InboundKind {
    Inbound,
    Return,
}

/// Summary emitted after each processed inbound file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboundNotice {
    pub filename: String,
    pub kind: InboundKind,
    pub entries: usize,
    pub returns: usize,
    pub corrections: usize,
    pub prenotes: usize,
    pub processed_at: DateTime<Utc>,
}

/// Fire-and-forget event delivery. Consumers must tolerate duplicates.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish_file(&self, file: OutboundFile) -> Result<()>;

    async fn cancel_transfer(&self, transfer_id: &str) -> Result<()>;

    async fn notify_inbound(&self, notice: InboundNotice) -> Result<()>;
}

/// In-process publisher: outbound events over mpsc to the aggregator,
/// inbound notices broadcast to any subscriber.
#[derive(Clone)]
pub struct ChannelPublisher {
    outbound: mpsc::Sender<OutboundEvent>,
    notices: broadcast::Sender<InboundNotice>,
}

impl ChannelPublisher {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<OutboundEvent>) {
        let (outbound, receiver) = mpsc::channel(capacity);
        let (notices, _) = broadcast::channel(capacity);
        (Self { outbound, notices }, receiver)
    }

    pub fn subscribe_inbound(&self) -> broadcast::Receiver<InboundNotice> {
        self.notices.subscribe()
    }

    async fn send(&self, event: OutboundEvent) -> Result<()> {
        self.outbound
            .send(event)
            .await
            .map_err(|_| AchError::Other(anyhow::anyhow!("outbound event channel closed")))
    }
}

#[async_trait]
impl Publisher for ChannelPublisher {
    async fn publish_file(&self, file: OutboundFile) -> Result<()> {
        self.send(OutboundEvent::FileStaged(file)).await
    }

    async fn cancel_transfer(&self, transfer_id: &str) -> Result<()> {
        self.send(OutboundEvent::TransferCanceled {
            transfer_id: transfer_id.to_string(),
        })
        .await
    }

    async fn notify_inbound(&self, notice: InboundNotice) -> Result<()> {
        // No subscribers is not an error.
        self.notices.send(notice).ok();
        Ok(())
    }
}
