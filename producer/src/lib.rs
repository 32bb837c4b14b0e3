//! Call-audio producer service.
//!
//! Pulls a stereo call recording out of object storage, splits it into one
//! mono stream per participant, uploads both as live ingestion streams and
//! starts the analysis pipeline that consumes them.

pub mod config;
pub mod error;
pub mod fetch;
pub mod job;
pub mod orchestrate;
pub mod server;
pub mod split;
pub mod upload;

pub use error::{Error, Result};
