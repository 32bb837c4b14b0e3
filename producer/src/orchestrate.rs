//! Analysis pipeline start.
//!
//! Runs once per job, after both channel uploads have confirmed their start
//! fragments. Channel order is fixed by recording convention: channel 0 is
//! the agent leg, channel 1 the customer leg.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use awsio::media_pipelines::{
    ChannelDefinition, CreatePipelineRequest, MediaPipelinesClient, ParticipantRole,
    SourceRuntimeConfiguration, StartedPipeline, StreamChannelDefinition, StreamConfiguration,
};
use awsio::ServiceError;

use crate::error::{Error, Result};
use crate::split::MEDIA_SAMPLE_RATE;
use crate::upload::UploadedStream;

const MEDIA_ENCODING_PCM: &str = "pcm";

/// Seam for the pipeline-start call.
#[async_trait]
pub trait PipelineStarter: Send + Sync {
    async fn start_pipeline(
        &self,
        request: &CreatePipelineRequest,
    ) -> std::result::Result<StartedPipeline, ServiceError>;
}

#[async_trait]
impl PipelineStarter for MediaPipelinesClient {
    async fn start_pipeline(
        &self,
        request: &CreatePipelineRequest,
    ) -> std::result::Result<StartedPipeline, ServiceError> {
        self.create_media_insights_pipeline(request).await
    }
}

/// Analysis run started for one recording.
#[derive(Debug, Clone)]
pub struct StartedAnalysis {
    /// Correlation id carried by every downstream annotation event.
    pub transaction_id: String,
    pub pipeline_id: String,
}

pub struct PipelineOrchestrator {
    starter: Arc<dyn PipelineStarter>,
    configuration_arn: String,
}

impl PipelineOrchestrator {
    pub fn new(starter: Arc<dyn PipelineStarter>, configuration_arn: impl Into<String>) -> Self {
        Self {
            starter,
            configuration_arn: configuration_arn.into(),
        }
    }

    /// Bind both uploaded streams to one pipeline run under a fresh
    /// transaction id. Rejections surface to the caller unretried.
    pub async fn start(
        &self,
        agent: &UploadedStream,
        customer: &UploadedStream,
    ) -> Result<StartedAnalysis> {
        let transaction_id = Uuid::new_v4().to_string();
        let request = CreatePipelineRequest {
            media_insights_pipeline_configuration_arn: self.configuration_arn.clone(),
            media_insights_runtime_metadata: HashMap::from([(
                "transactionId".to_string(),
                transaction_id.clone(),
            )]),
            kinesis_video_stream_source_runtime_configuration: SourceRuntimeConfiguration {
                streams: vec![
                    stream_configuration(agent, 0, ParticipantRole::Agent),
                    stream_configuration(customer, 1, ParticipantRole::Customer),
                ],
                media_encoding: MEDIA_ENCODING_PCM.to_string(),
                media_sample_rate: MEDIA_SAMPLE_RATE,
            },
        };

        let started = self
            .starter
            .start_pipeline(&request)
            .await
            .map_err(|e| Error::orchestration(e.to_string()))?;
        info!(transaction_id, pipeline_id = started.id, "analysis pipeline started");
        Ok(StartedAnalysis {
            transaction_id,
            pipeline_id: started.id,
        })
    }
}

fn stream_configuration(
    upload: &UploadedStream,
    channel_id: u8,
    role: ParticipantRole,
) -> StreamConfiguration {
    StreamConfiguration {
        stream_arn: upload.stream_arn.clone(),
        fragment_number: upload.start_fragment.clone(),
        stream_channel_definition: StreamChannelDefinition {
            number_of_channels: 1,
            channel_definitions: vec![ChannelDefinition {
                channel_id,
                participant_role: role,
            }],
        },
    }
}
