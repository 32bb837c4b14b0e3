//! Media-insights pipeline start call.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::credentials::ProvideCredentials;
use crate::error::ServiceError;
use crate::http::HttpHandle;

pub struct MediaPipelinesClient {
    http: HttpHandle,
    credentials: Arc<dyn ProvideCredentials>,
}

/// Which call participant a channel carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantRole {
    Agent,
    Customer,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChannelDefinition {
    pub channel_id: u8,
    pub participant_role: ParticipantRole,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StreamChannelDefinition {
    pub number_of_channels: u8,
    pub channel_definitions: Vec<ChannelDefinition>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StreamConfiguration {
    pub stream_arn: String,
    pub fragment_number: String,
    pub stream_channel_definition: StreamChannelDefinition,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SourceRuntimeConfiguration {
    pub streams: Vec<StreamConfiguration>,
    pub media_encoding: String,
    pub media_sample_rate: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreatePipelineRequest {
    pub media_insights_pipeline_configuration_arn: String,
    pub media_insights_runtime_metadata: HashMap<String, String>,
    pub kinesis_video_stream_source_runtime_configuration: SourceRuntimeConfiguration,
}

/// Identifier pair of a started pipeline.
#[derive(Debug, Clone)]
pub struct StartedPipeline {
    pub id: String,
    pub arn: Option<String>,
}

#[derive(Deserialize)]
struct CreatePipelineResponse {
    #[serde(rename = "MediaInsightsPipeline")]
    pipeline: Option<PipelineSummary>,
}

#[derive(Deserialize)]
struct PipelineSummary {
    #[serde(rename = "MediaPipelineId")]
    id: Option<String>,
    #[serde(rename = "MediaPipelineArn")]
    arn: Option<String>,
}

impl MediaPipelinesClient {
    pub fn new(http: HttpHandle, credentials: Arc<dyn ProvideCredentials>) -> Self {
        Self { http, credentials }
    }

    pub async fn create_media_insights_pipeline(
        &self,
        request: &CreatePipelineRequest,
    ) -> Result<StartedPipeline, ServiceError> {
        let host = format!("media-pipelines-chime.{}.amazonaws.com", self.http.region());
        let url = self.http.url_for(&host, "/media-insights-pipelines")?;
        let body = serde_json::to_vec(request).map_err(|e| ServiceError::Encode {
            operation: "CreateMediaInsightsPipeline",
            source: e,
        })?;
        let headers = [("content-type", "application/json".to_string())];

        let credentials = self.credentials.credentials().await?;
        let response = self
            .http
            .send_signed(
                "chime",
                "CreateMediaInsightsPipeline",
                Method::POST,
                url,
                &headers,
                body,
                &credentials,
            )
            .await?;

        let decoded: CreatePipelineResponse = response.json().await?;
        let summary = decoded.pipeline.ok_or(ServiceError::missing_field(
            "CreateMediaInsightsPipeline",
            "MediaInsightsPipeline",
        ))?;
        let id = summary.id.ok_or(ServiceError::missing_field(
            "CreateMediaInsightsPipeline",
            "MediaPipelineId",
        ))?;
        Ok(StartedPipeline {
            id,
            arn: summary.arn,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_with_service_field_names() {
        let request = CreatePipelineRequest {
            media_insights_pipeline_configuration_arn: "arn:aws:chime:conf".to_string(),
            media_insights_runtime_metadata: HashMap::from([(
                "transactionId".to_string(),
                "tx-1".to_string(),
            )]),
            kinesis_video_stream_source_runtime_configuration: SourceRuntimeConfiguration {
                streams: vec![StreamConfiguration {
                    stream_arn: "arn:aws:kinesisvideo:stream/a".to_string(),
                    fragment_number: "91343852333".to_string(),
                    stream_channel_definition: StreamChannelDefinition {
                        number_of_channels: 1,
                        channel_definitions: vec![ChannelDefinition {
                            channel_id: 0,
                            participant_role: ParticipantRole::Agent,
                        }],
                    },
                }],
                media_encoding: "pcm".to_string(),
                media_sample_rate: 8000,
            },
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value["MediaInsightsRuntimeMetadata"]["transactionId"],
            "tx-1"
        );
        let stream = &value["KinesisVideoStreamSourceRuntimeConfiguration"]["Streams"][0];
        assert_eq!(stream["StreamArn"], "arn:aws:kinesisvideo:stream/a");
        assert_eq!(
            stream["StreamChannelDefinition"]["ChannelDefinitions"][0]["ParticipantRole"],
            "AGENT"
        );
        assert_eq!(
            value["KinesisVideoStreamSourceRuntimeConfiguration"]["MediaSampleRate"],
            8000
        );
    }
}
