//! `model-distribution` is a content-addressed local store and dual-protocol puller for
//! local-inference model artifacts.
//!
//! # Overview
//!
//! This crate pulls model weights from either an OCI Distribution v2 registry or the
//! HuggingFace Hub's native file protocol into a single content-addressed local store, so a
//! local inference host can treat both origins identically once a model has landed on disk. It
//! handles:
//! - Reference parsing and normalization (registry/org/repo/tag/digest/short-ID)
//! - Registry authentication (Docker-style credential resolution, bearer token exchange)
//! - Resumable, range-based blob download with integrity verification
//! - A flat content-addressed store (blobs, manifests, tags) plus bundle materialization for the
//!   runtime formats this build understands (GGUF, safetensors)
//!
//! # Modules
//!
//! - [`client`] - The distribution client orchestrator (pull/push/load/tag/delete)
//! - [`config`] - Client configuration, defaults, and environment overrides
//! - [`concurrency`] - The pull gate, digest lock table, and tag-index lock
//! - [`error`] - The crate's error taxonomy
//! - [`keychain`] - Credential resolution for registry hosts
//! - [`log`] - File-based progress log retention
//! - [`model`] - Shared data types: media types, resolved manifests, model config
//! - [`progress`] - The progress event stream
//! - [`reference`] - Model reference parsing and normalization
//! - [`source`] - The `ArtifactSource` abstraction and its OCI/HuggingFace implementations
//! - [`store`] - The content-addressed local store and bundle materialization
//! - [`transport`] - Registry HTTP transport (auth challenge/exchange, ranged GET)
//! - [`utils`] - Small shared free functions
//!
//! # Usage Example
//!
//! ```no_run
//! use model_distribution::{
//!     client::DistributionClient,
//!     config::DistributionClientConfig,
//!     progress::{ProgressEncoding, ProgressSink},
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = DistributionClientConfig::builder()
//!         .store_root_path("/var/lib/model-distribution".into())
//!         .build();
//!     let client = DistributionClient::new(config).await?;
//!
//!     let mut buf = Vec::new();
//!     let mut progress = ProgressSink::new(&mut buf, ProgressEncoding::Json);
//!     let cancel = CancellationToken::new();
//!     client
//!         .pull_model("huggingface.co/TheBloke/Llama-2-7B-GGUF:latest", &mut progress, &cancel)
//!         .await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod client;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod keychain;
pub mod log;
pub mod model;
pub mod progress;
pub mod reference;
pub mod source;
pub mod store;
pub mod transport;
pub mod utils;

pub use client::DistributionClient;
pub use config::DistributionClientConfig;
pub use error::{DistributionError, DistributionResult};
pub use reference::Reference;
