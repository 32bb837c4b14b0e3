//! Annotation fan-out relay.
//!
//! Consumes annotation events produced by the analysis pipeline, persists
//! final transcript segments and broadcasts every event payload to the
//! recipients registered through the push gateway.

pub mod broadcast;
pub mod config;
pub mod error;
pub mod events;
pub mod push;
pub mod registry;
pub mod server;
pub mod store;

pub use error::{Error, Result};
