//! Transcript persistence.

use crate::events::{AnnotationEnvelope, CallMetadata, DETAIL_TYPE_TRANSCRIBE};
use async_trait::async_trait;
use awsio::ServiceError;
use awsio::dynamodb::{AttributeValue, DynamoDbClient, Item};
use std::collections::HashMap;
use tracing::warn;

/// One final transcript segment, ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptRecord {
    pub transaction_id: String,
    pub timestamp_ms: i64,
    pub channel_id: String,
    pub start_time: f64,
    pub end_time: f64,
    pub transcript: String,
}

#[async_trait]
pub trait TranscriptStore: Send + Sync {
    async fn persist(&self, record: &TranscriptRecord) -> Result<(), ServiceError>;
}

/// Store backed by a key-value table, keyed by call and segment timestamp.
pub struct DynamoTranscriptStore {
    db: DynamoDbClient,
    table: String,
}

impl DynamoTranscriptStore {
    pub fn new(db: DynamoDbClient, table: impl Into<String>) -> Self {
        Self {
            db,
            table: table.into(),
        }
    }
}

fn transcript_item(record: &TranscriptRecord) -> Item {
    HashMap::from([
        (
            "transactionId".to_string(),
            AttributeValue::S(record.transaction_id.clone()),
        ),
        (
            "timestamp".to_string(),
            AttributeValue::N(record.timestamp_ms.to_string()),
        ),
        (
            "channelId".to_string(),
            AttributeValue::S(record.channel_id.clone()),
        ),
        (
            "startTime".to_string(),
            AttributeValue::N(record.start_time.to_string()),
        ),
        (
            "endTime".to_string(),
            AttributeValue::N(record.end_time.to_string()),
        ),
        (
            "transcript".to_string(),
            AttributeValue::S(record.transcript.clone()),
        ),
    ])
}

#[async_trait]
impl TranscriptStore for DynamoTranscriptStore {
    async fn persist(&self, record: &TranscriptRecord) -> Result<(), ServiceError> {
        self.db.put_item(&self.table, &transcript_item(record)).await
    }
}

/// Pulls a persistable record out of an annotation envelope.
///
/// Only final segments from the transcription engine come back as `Some`;
/// partial segments and other annotation kinds pass through untouched. A
/// missing `IsPartial` counts as final. A final segment with required fields
/// absent is logged and dropped.
pub fn extract_final_transcript(envelope: &AnnotationEnvelope) -> Option<TranscriptRecord> {
    if envelope.detail_type.as_deref() != Some(DETAIL_TYPE_TRANSCRIBE) {
        return None;
    }
    let Some(event) = &envelope.transcript_event else {
        warn!("transcription annotation carries no transcript event");
        return None;
    };
    if event.is_partial.unwrap_or(false) {
        return None;
    }
    let record = (|| {
        let metadata: CallMetadata = serde_json::from_str(envelope.metadata.as_deref()?).ok()?;
        let timestamp_ms = chrono::DateTime::parse_from_rfc3339(envelope.time.as_deref()?)
            .ok()?
            .timestamp_millis();
        Some(TranscriptRecord {
            transaction_id: metadata.transaction_id?,
            timestamp_ms,
            channel_id: event.channel_id.clone()?,
            start_time: event.start_time?,
            end_time: event.end_time?,
            transcript: event.alternatives.as_ref()?.first()?.transcript.clone()?,
        })
    })();
    if record.is_none() {
        warn!("final transcript event is missing required fields; not persisting");
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    fn final_envelope() -> AnnotationEnvelope {
        serde_json::from_str(
            r#"{
                "detail-type": "Transcribe",
                "time": "2024-01-01T00:00:00Z",
                "metadata": "{\"transactionId\":\"tx-1\"}",
                "TranscriptEvent": {
                    "IsPartial": false,
                    "ChannelId": "ch_0",
                    "StartTime": 1.02,
                    "EndTime": 3.5,
                    "Alternatives": [{"Transcript": "hello there"}]
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn final_segments_extract_every_field() {
        let record = extract_final_transcript(&final_envelope()).unwrap();
        assert_eq!(
            record,
            TranscriptRecord {
                transaction_id: "tx-1".to_string(),
                timestamp_ms: 1_704_067_200_000,
                channel_id: "ch_0".to_string(),
                start_time: 1.02,
                end_time: 3.5,
                transcript: "hello there".to_string(),
            }
        );
    }

    #[test]
    fn partial_segments_are_not_extracted() {
        let envelope: AnnotationEnvelope = serde_json::from_str(
            r#"{
                "detail-type": "Transcribe",
                "time": "2024-01-01T00:00:00Z",
                "metadata": "{\"transactionId\":\"tx-1\"}",
                "TranscriptEvent": {"IsPartial": true}
            }"#,
        )
        .unwrap();
        assert!(extract_final_transcript(&envelope).is_none());
    }

    #[test]
    fn missing_is_partial_counts_as_final() {
        let envelope: AnnotationEnvelope = serde_json::from_str(
            r#"{
                "detail-type": "Transcribe",
                "time": "2024-01-01T00:00:00Z",
                "metadata": "{\"transactionId\":\"tx-1\"}",
                "TranscriptEvent": {
                    "ChannelId": "ch_1",
                    "StartTime": 0.0,
                    "EndTime": 0.5,
                    "Alternatives": [{"Transcript": "yes"}]
                }
            }"#,
        )
        .unwrap();
        let record = extract_final_transcript(&envelope).unwrap();
        assert_eq!(record.channel_id, "ch_1");
    }

    #[test]
    fn other_annotation_kinds_are_ignored() {
        let envelope: AnnotationEnvelope =
            serde_json::from_str(r#"{"detail-type":"CallAnalyticsMetadata"}"#).unwrap();
        assert!(extract_final_transcript(&envelope).is_none());
    }

    #[test]
    fn unparsable_metadata_drops_the_record() {
        let envelope: AnnotationEnvelope = serde_json::from_str(
            r#"{
                "detail-type": "Transcribe",
                "time": "2024-01-01T00:00:00Z",
                "metadata": "not json",
                "TranscriptEvent": {
                    "IsPartial": false,
                    "ChannelId": "ch_0",
                    "StartTime": 1.0,
                    "EndTime": 2.0,
                    "Alternatives": [{"Transcript": "hello"}]
                }
            }"#,
        )
        .unwrap();
        assert!(extract_final_transcript(&envelope).is_none());
    }

    #[test]
    fn items_carry_segment_times_as_numbers() {
        let record = extract_final_transcript(&final_envelope()).unwrap();
        let item = transcript_item(&record);
        assert_eq!(item["transactionId"].as_s(), Some("tx-1"));
        assert_eq!(item["timestamp"].as_n(), Some("1704067200000"));
        assert_eq!(item["channelId"].as_s(), Some("ch_0"));
        assert_eq!(item["startTime"].as_n(), Some("1.02"));
        assert_eq!(item["endTime"].as_n(), Some("3.5"));
        assert_eq!(item["transcript"].as_s(), Some("hello there"));
    }
}
