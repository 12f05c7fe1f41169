//! In-memory analytics sink.
//!
//! Keeps every captured event in process and fans them out to live
//! subscribers over a tokio broadcast channel. Suitable for tests and local
//! development; nothing leaves the process.

use async_trait::async_trait;
use stash_analytics::{Analytics, AnalyticsError, AnalyticsEvent, EventStream};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

const CHANNEL_CAPACITY: usize = 100;

pub struct MemoryAnalytics {
    captured: Arc<Mutex<Vec<AnalyticsEvent>>>,
    tx: broadcast::Sender<AnalyticsEvent>,
}

impl MemoryAnalytics {
    pub fn new() -> Self {
        Self {
            captured: Arc::new(Mutex::new(Vec::new())),
            tx: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    /// Snapshot of everything captured so far, in capture order.
    pub fn events(&self) -> Vec<AnalyticsEvent> {
        match self.captured.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Live stream of events captured after this call.
    pub fn subscribe(&self) -> EventStream {
        // Lagged receivers skip what they missed; `events()` still has it.
        let stream = BroadcastStream::new(self.tx.subscribe()).filter_map(|result| result.ok());
        Box::pin(stream)
    }
}

impl Default for MemoryAnalytics {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Analytics for MemoryAnalytics {
    async fn capture(&self, event: &AnalyticsEvent) -> Result<(), AnalyticsError> {
        self.captured
            .lock()
            .map_err(|e| AnalyticsError::Backend(e.to_string()))?
            .push(event.clone());

        // No subscribers is fine.
        let _ = self.tx.send(event.clone());
        Ok(())
    }
}
