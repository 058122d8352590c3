//! Modelrun HTTP collaborators
//!
//! The runner never talks HTTP itself. Everything that leaves the process
//! goes through this crate:
//! - Webhook delivery of prediction snapshots (ordered, throttled, retried)
//! - Uploading output files to a pre-signed endpoint
//! - Downloading URL inputs into local temporary files
//!
//! Each collaborator is a trait with one reqwest-backed implementation, so
//! the runner can be exercised against fakes.
//!
//! # Example
//!
//! ```no_run
//! use modelrun_client::{FileUploader, SignedUrlUploader};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let uploader = SignedUrlUploader::new("https://store.example.com/uploads/")?;
//!     let url = uploader.upload(Path::new("/tmp/out.png")).await?;
//!     println!("Uploaded to {}", url);
//!     Ok(())
//! }
//! ```

pub mod error;
mod fetch;
mod retry;
mod upload;
mod webhook;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use fetch::{HttpFetcher, RemoteFetcher};
pub use retry::RetryPolicy;
pub use upload::{FileUploader, SignedUrlUploader, content_type_for_extension, strip_query};
pub use webhook::{ResponseThrottle, WebhookClient, WebhookConfig, WebhookSender};
