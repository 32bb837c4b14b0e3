//! One recording end to end: stage, split, upload both channels, start
//! analysis.

use std::sync::Arc;
use tracing::{error, info};

use crate::error::Result;
use crate::fetch::{ChunkedFetcher, ObjectRangeStore};
use crate::orchestrate::{PipelineOrchestrator, StartedAnalysis};
use crate::split::MediaSplitter;
use crate::upload::ChannelUploader;

pub struct JobRunner {
    store: Arc<dyn ObjectRangeStore>,
    fetcher: ChunkedFetcher,
    splitter: Arc<dyn MediaSplitter>,
    uploader: Arc<dyn ChannelUploader>,
    orchestrator: Arc<PipelineOrchestrator>,
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn ObjectRangeStore>,
        fetcher: ChunkedFetcher,
        splitter: Arc<dyn MediaSplitter>,
        uploader: Arc<dyn ChannelUploader>,
        orchestrator: Arc<PipelineOrchestrator>,
    ) -> Self {
        Self {
            store,
            fetcher,
            splitter,
            uploader,
            orchestrator,
        }
    }

    /// Process one recording. Returns once both channel uploads are
    /// confirmed and the analysis pipeline is started; media keeps flowing
    /// in the background until the recording ends.
    pub async fn process_recording(&self, bucket: &str, key: &str) -> Result<StartedAnalysis> {
        info!(bucket, key, "processing recording");

        // Stage the object locally so both extractions read the same file.
        let staged = tempfile::NamedTempFile::new()?;
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .open(staged.path())
            .await?;
        let bytes = self
            .fetcher
            .download_to(self.store.as_ref(), bucket, key, &mut file)
            .await?;
        drop(file);
        info!(bucket, key, bytes, "staged recording");

        let channels = self.splitter.split(staged.path()).await?;

        // Both uploads run to completion even when one fails; a failed
        // attempt has already torn down its own stream by the time it
        // reports.
        let (left, right) = tokio::join!(
            self.uploader.upload_channel(channels.left),
            self.uploader.upload_channel(channels.right),
        );

        match (left, right) {
            (Ok(agent), Ok(customer)) => {
                let analysis = self.orchestrator.start(&agent, &customer).await?;
                info!(
                    bucket,
                    key,
                    transaction_id = analysis.transaction_id,
                    pipeline_id = analysis.pipeline_id,
                    "recording is feeding the analysis pipeline"
                );
                Ok(analysis)
                // The staged file is unlinked on return. Both transcoders
                // hold it open and keep reading until the recording ends.
            }
            (Err(e), Ok(customer)) => {
                error!(
                    stream_arn = customer.stream_arn,
                    error = %e,
                    "agent channel upload failed; skipping pipeline start"
                );
                Err(e)
            }
            (Ok(agent), Err(e)) => {
                error!(
                    stream_arn = agent.stream_arn,
                    error = %e,
                    "customer channel upload failed; skipping pipeline start"
                );
                Err(e)
            }
            (Err(e), Err(sibling)) => {
                error!(error = %sibling, "customer channel upload failed");
                Err(e)
            }
        }
    }
}
