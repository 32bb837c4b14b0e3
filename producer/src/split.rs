//! Stereo-to-dual-mono channel extraction.
//!
//! One transcoder process per channel, both reading the same input file at
//! native pace. Each process writes containerized PCM to stdout, which is
//! forwarded chunk-by-chunk into a bounded channel so upload can start while
//! transcoding is still running. The two extractions are independent failure
//! domains: one failing ends its own stream and leaves the other alone.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};

/// Sample rate declared to the analysis pipeline. The transcoder resamples
/// to it so the declaration always holds.
pub const MEDIA_SAMPLE_RATE: u32 = 8000;

const CHANNEL_CAPACITY: usize = 16;
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Which call participant a mono channel carries. Left is the agent leg,
/// right the customer leg, by recording convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    Agent,
    Customer,
}

impl ChannelRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelRole::Agent => "AGENT",
            ChannelRole::Customer => "CUSTOMER",
        }
    }

    /// Source channel selector for the pan filter.
    fn source_channel(&self) -> &'static str {
        match self {
            ChannelRole::Agent => "c0",
            ChannelRole::Customer => "c1",
        }
    }
}

impl std::fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One live mono output stream.
pub struct ChannelStream {
    pub role: ChannelRole,
    pub bytes: ReceiverStream<Bytes>,
}

/// Both channels of one recording, created together, independently lived.
pub struct SplitChannels {
    pub left: ChannelStream,
    pub right: ChannelStream,
}

/// Seam for the channel extraction step.
#[async_trait]
pub trait MediaSplitter: Send + Sync {
    async fn split(&self, input: &Path) -> Result<SplitChannels>;
}

/// ffmpeg-backed splitter.
pub struct FfmpegSplitter {
    binary_path: String,
    version: Option<String>,
}

impl FfmpegSplitter {
    pub fn new() -> Self {
        Self::with_binary("ffmpeg")
    }

    pub fn with_binary(binary_path: impl Into<String>) -> Self {
        let binary_path = binary_path.into();
        let version = Self::detect_version(&binary_path);
        Self {
            binary_path,
            version,
        }
    }

    /// Detect transcoder version.
    fn detect_version(path: &str) -> Option<String> {
        std::process::Command::new(path)
            .arg("-version")
            .output()
            .ok()
            .and_then(|output| {
                String::from_utf8(output.stdout)
                    .ok()
                    .and_then(|s| s.lines().next().map(|l| l.to_string()))
            })
    }

    pub fn is_available(&self) -> bool {
        self.version.is_some()
    }

    pub fn version(&self) -> Option<String> {
        self.version.clone()
    }

    /// Arguments for one channel's extraction. `-re` paces the read at
    /// native speed so the ingestion side sees a live stream.
    fn build_args(&self, input: &Path, role: ChannelRole) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-re".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-af".to_string(),
            format!("pan=mono|c0={}", role.source_channel()),
            "-ar".to_string(),
            MEDIA_SAMPLE_RATE.to_string(),
            "-f".to_string(),
            "matroska".to_string(),
            "-c:a".to_string(),
            "pcm_s16le".to_string(),
            "pipe:1".to_string(),
        ]
    }

    fn spawn_channel(&self, input: &Path, role: ChannelRole) -> Result<ChannelStream> {
        let args = self.build_args(input, role);
        debug!(%role, ?args, "starting channel extraction");

        let mut child = Command::new(&self.binary_path)
            .args(&args)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::split(format!("failed to spawn transcoder: {e}")))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::split("failed to capture transcoder stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::split("failed to capture transcoder stderr"))?;

        // Diagnostics reader. The transcoder narrates on stderr; only error
        // lines are worth surfacing.
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.contains("Error") || line.contains("error") {
                    warn!(%role, "transcoder: {line}");
                }
            }
        });

        let (tx, rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);

        // Output forwarder. Owns the child; kills it when the consumer goes
        // away so the process cannot sit blocked on a full pipe.
        tokio::spawn(async move {
            let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
            loop {
                match stdout.read_buf(&mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        if tx.send(buf.split().freeze()).await.is_err() {
                            debug!(%role, "output consumer dropped; stopping extraction");
                            let _ = child.kill().await;
                            return;
                        }
                    }
                    Err(e) => {
                        error!(%role, error = %e, "failed to read transcoder output");
                        break;
                    }
                }
            }
            drop(tx);
            match child.wait().await {
                Ok(status) if !status.success() => {
                    warn!(%role, %status, "transcoder exited with failure");
                }
                Ok(_) => {}
                Err(e) => error!(%role, error = %e, "failed to reap transcoder"),
            }
        });

        Ok(ChannelStream {
            role,
            bytes: ReceiverStream::new(rx),
        })
    }
}

impl Default for FfmpegSplitter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaSplitter for FfmpegSplitter {
    async fn split(&self, input: &Path) -> Result<SplitChannels> {
        let left = self.spawn_channel(input, ChannelRole::Agent)?;
        let right = self.spawn_channel(input, ChannelRole::Customer)?;
        Ok(SplitChannels { left, right })
    }
}
