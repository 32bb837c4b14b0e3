//! Wire shapes of the events delivered to the relay.
//!
//! Two kinds arrive on the same endpoint: connection lifecycle notices from
//! the push gateway and batches of stream records carrying annotation
//! payloads. The record payloads are base64 in transit and JSON once
//! decoded; only the dispatch fields are modeled here, everything else rides
//! along untouched in the raw payload.

use base64::Engine;
use serde::Deserialize;

pub const DETAIL_TYPE_TRANSCRIBE: &str = "Transcribe";

/// Top-level input event.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RelayEvent {
    Control(ControlEvent),
    Batch(RecordBatch),
}

/// Connection lifecycle notice.
#[derive(Debug, Deserialize)]
pub struct ControlEvent {
    #[serde(rename = "eventType")]
    pub event_type: EventType,
    #[serde(rename = "connectionId")]
    pub connection_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum EventType {
    #[serde(rename = "CONNECT")]
    Connect,
    #[serde(rename = "DISCONNECT")]
    Disconnect,
}

/// Ordered batch of stream records.
#[derive(Debug, Deserialize)]
pub struct RecordBatch {
    #[serde(rename = "Records")]
    pub records: Vec<StreamRecord>,
}

#[derive(Debug, Deserialize)]
pub struct StreamRecord {
    pub kinesis: KinesisPayload,
}

#[derive(Debug, Deserialize)]
pub struct KinesisPayload {
    /// Base64-encoded event payload.
    pub data: String,
}

impl KinesisPayload {
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        base64::engine::general_purpose::STANDARD.decode(&self.data)
    }
}

/// Decoded annotation envelope. Unknown event kinds parse with all optional
/// fields absent and are broadcast without persistence.
#[derive(Debug, Deserialize)]
pub struct AnnotationEnvelope {
    #[serde(rename = "detail-type")]
    pub detail_type: Option<String>,
    pub time: Option<String>,
    #[serde(rename = "TranscriptEvent")]
    pub transcript_event: Option<TranscriptEvent>,
    /// JSON-encoded call metadata.
    pub metadata: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TranscriptEvent {
    #[serde(rename = "IsPartial")]
    pub is_partial: Option<bool>,
    #[serde(rename = "ChannelId")]
    pub channel_id: Option<String>,
    #[serde(rename = "StartTime")]
    pub start_time: Option<f64>,
    #[serde(rename = "EndTime")]
    pub end_time: Option<f64>,
    #[serde(rename = "Alternatives")]
    pub alternatives: Option<Vec<Alternative>>,
}

#[derive(Debug, Deserialize)]
pub struct Alternative {
    #[serde(rename = "Transcript")]
    pub transcript: Option<String>,
}

/// The call metadata nested inside an envelope's `metadata` string.
#[derive(Debug, Deserialize)]
pub struct CallMetadata {
    #[serde(rename = "transactionId")]
    pub transaction_id: Option<String>,
}
