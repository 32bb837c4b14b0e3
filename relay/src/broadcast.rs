//! Annotation fan-out.
//!
//! Every stream record is decoded, optionally persisted, and then delivered
//! to every live recipient. Persistence and delivery failures are isolated
//! per record and per recipient; one bad record or one dead connection never
//! stalls the rest of the batch.

use crate::events::{ControlEvent, EventType, RecordBatch};
use crate::push::RecipientPush;
use crate::registry::ConnectionRegistry;
use crate::store::{TranscriptStore, extract_final_transcript};
use awsio::ServiceError;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct AnnotationRelay {
    registry: Arc<dyn ConnectionRegistry>,
    store: Arc<dyn TranscriptStore>,
    push: Arc<dyn RecipientPush>,
}

impl AnnotationRelay {
    pub fn new(
        registry: Arc<dyn ConnectionRegistry>,
        store: Arc<dyn TranscriptStore>,
        push: Arc<dyn RecipientPush>,
    ) -> Self {
        Self {
            registry,
            store,
            push,
        }
    }

    /// Applies a connection lifecycle notice to the registry.
    pub async fn handle_control(&self, event: &ControlEvent) -> Result<(), ServiceError> {
        match event.event_type {
            EventType::Connect => self.registry.register(&event.connection_id).await,
            EventType::Disconnect => self.registry.deregister(&event.connection_id).await,
        }
    }

    /// Processes a batch of stream records in order.
    pub async fn handle_batch(&self, batch: &RecordBatch) {
        for record in &batch.records {
            match record.kinesis.decode() {
                Ok(payload) => self.process_record(&payload).await,
                Err(err) => {
                    warn!(error = %err, "skipping record with undecodable payload");
                }
            }
        }
    }

    async fn process_record(&self, payload: &[u8]) {
        let envelope = match serde_json::from_slice(payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "skipping record with unparsable payload");
                return;
            }
        };
        if let Some(record) = extract_final_transcript(&envelope) {
            if let Err(err) = self.store.persist(&record).await {
                warn!(
                    error = %err,
                    transaction_id = %record.transaction_id,
                    "failed to persist transcript; broadcasting anyway"
                );
            }
        }
        self.broadcast(payload).await;
    }

    /// Delivers one payload to every live recipient. The registry is
    /// re-read for each record so departures and arrivals between records
    /// take effect immediately.
    async fn broadcast(&self, payload: &[u8]) {
        let connections = match self.registry.live_connections().await {
            Ok(connections) => connections,
            Err(err) => {
                error!(error = %err, "failed to read live connections; dropping broadcast");
                return;
            }
        };
        for connection_id in connections {
            match self.push.push(&connection_id, payload).await {
                Ok(()) => {}
                Err(ServiceError::ConnectionGone { .. }) => {
                    info!(connection_id, "pruning departed connection");
                    if let Err(err) = self.registry.deregister(&connection_id).await {
                        warn!(error = %err, connection_id, "failed to prune connection");
                    }
                }
                Err(err) => {
                    warn!(error = %err, connection_id, "delivery failed");
                }
            }
        }
    }
}
