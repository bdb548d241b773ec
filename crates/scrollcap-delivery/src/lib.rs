//! Delivery of encoded captures and real-time event publication.

use std::path::PathBuf;

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use scrollcap_types::{events::CaptureEvent, output::EncodedOutput, Result, ScrollCapError};
use tokio::sync::{broadcast, Mutex};
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

/// Where a delivered capture ended up.
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    pub location: String,
    pub bytes: u64,
}

/// Persists or offers the final payload to the user. The pipeline does not
/// depend on how the payload is presented.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    async fn save(&self, output: &EncodedOutput) -> Result<DeliveryReceipt>;
}

#[async_trait]
impl<T> DeliveryChannel for std::sync::Arc<T>
where
    T: DeliveryChannel + ?Sized,
{
    async fn save(&self, output: &EncodedOutput) -> Result<DeliveryReceipt> {
        self.as_ref().save(output).await
    }
}

/// Writes captures into a directory, creating it on demand.
pub struct DiskDelivery {
    output_dir: PathBuf,
}

impl DiskDelivery {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl DeliveryChannel for DiskDelivery {
    async fn save(&self, output: &EncodedOutput) -> Result<DeliveryReceipt> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|err| {
                delivery_error(format!(
                    "failed to create output dir {:?}: {err}",
                    self.output_dir
                ))
            })?;
        let path = self.output_dir.join(&output.suggested_filename);
        tokio::fs::write(&path, &output.bytes)
            .await
            .map_err(|err| delivery_error(format!("failed to write {:?}: {err}", path)))?;
        info!(path = %path.display(), bytes = output.bytes.len(), "capture saved");
        Ok(DeliveryReceipt {
            location: path.display().to_string(),
            bytes: output.bytes.len() as u64,
        })
    }
}

/// In-memory channel used by tests and early integration.
#[derive(Default)]
pub struct MemoryDelivery {
    saved: Mutex<Vec<EncodedOutput>>,
}

impl MemoryDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn saved(&self) -> Vec<EncodedOutput> {
        self.saved.lock().await.clone()
    }
}

#[async_trait]
impl DeliveryChannel for MemoryDelivery {
    async fn save(&self, output: &EncodedOutput) -> Result<DeliveryReceipt> {
        let mut saved = self.saved.lock().await;
        saved.push(output.clone());
        Ok(DeliveryReceipt {
            location: format!("memory:{}", output.suggested_filename),
            bytes: output.bytes.len() as u64,
        })
    }
}

/// Real-time publication of capture events to any number of observers.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: CaptureEvent) -> Result<()>;
    fn subscribe(&self) -> BoxStream<'static, CaptureEvent>;
}

/// Simple in-process feed backed by a broadcast channel.
#[derive(Clone)]
pub struct LocalFeed {
    tx: broadcast::Sender<CaptureEvent>,
}

impl LocalFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }
}

#[async_trait]
impl EventSink for LocalFeed {
    async fn publish(&self, event: CaptureEvent) -> Result<()> {
        let _ = self.tx.send(event);
        Ok(())
    }

    fn subscribe(&self) -> BoxStream<'static, CaptureEvent> {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(|event| async move { event.ok() })
            .boxed()
    }
}

/// Generate an error aligned with delivery semantics.
pub fn delivery_error(message: impl Into<String>) -> ScrollCapError {
    ScrollCapError::DeliveryFailed(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrollcap_types::events::{EventKind, EventPayload, OpsEvent};

    fn sample_output() -> EncodedOutput {
        EncodedOutput {
            bytes: vec![1, 2, 3, 4],
            mime_type: "image/png".into(),
            suggested_filename: format!("screenshot-test-{}.png", std::process::id()),
        }
    }

    #[tokio::test]
    async fn disk_delivery_writes_the_payload() {
        let dir = std::env::temp_dir().join(format!("scrollcap-delivery-{}", std::process::id()));
        let delivery = DiskDelivery::new(&dir);
        let output = sample_output();

        let receipt = delivery.save(&output).await.expect("save");
        assert_eq!(receipt.bytes, 4);
        let on_disk = std::fs::read(dir.join(&output.suggested_filename)).expect("read back");
        assert_eq!(on_disk, output.bytes);
        std::fs::remove_dir_all(&dir).expect("cleanup");
    }

    #[tokio::test]
    async fn memory_delivery_records_outputs() {
        let delivery = MemoryDelivery::new();
        let receipt = delivery.save(&sample_output()).await.expect("save");
        assert!(receipt.location.starts_with("memory:"));
        assert_eq!(delivery.saved().await.len(), 1);
    }

    #[tokio::test]
    async fn feed_delivers_to_subscribers() {
        let feed = LocalFeed::new(16);
        let mut events = feed.subscribe();
        feed.publish(CaptureEvent::new(
            EventKind::Ops,
            EventPayload::Ops(OpsEvent {
                message: "hello".into(),
                tags: vec![],
            }),
        ))
        .await
        .expect("publish");

        let received = events.next().await.expect("event");
        assert_eq!(received.kind, EventKind::Ops);
    }
}
