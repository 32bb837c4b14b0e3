//! Minimal hand-signed clients for the managed services this system talks to.
//!
//! Each module covers one service at its documented HTTP boundary; requests
//! are signed with [`sigv4`] and sent over a shared [`HttpHandle`], whose
//! endpoint override lets tests run every client against a local fake.

pub mod apigateway;
pub mod credentials;
pub mod dynamodb;
pub mod error;
pub mod http;
pub mod kinesis_video;
pub mod media_pipelines;
pub mod s3;
pub mod sts;

pub use credentials::{EnvCredentials, ProvideCredentials, SigningCredentials, StaticCredentials};
pub use error::ServiceError;
pub use http::{HttpHandle, control_plane_client, install_rustls_provider};
