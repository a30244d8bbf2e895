//! The remote artifact source abstraction (§4.4): a single trait implemented once for OCI
//! Distribution registries and once for the HuggingFace Hub, so the distribution client can
//! drive either backend through the same pull pipeline.

pub mod huggingface;
pub mod oci;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::{
    error::DistributionResult,
    model::ResolvedManifest,
    reference::Reference,
};

pub use huggingface::HuggingFaceSource;
pub use oci::OciSource;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// One layer of a resolved manifest, paired with the byte stream of its contents.
pub type BlobStream = BoxStream<'static, DistributionResult<Bytes>>;

/// A source capable of resolving a [`Reference`] to a manifest and streaming the blobs it
/// names.
///
/// Implementations own their own transport and credentials; the distribution client only ever
/// calls through this trait, so adding a third backend (e.g. a plain HTTPS file server) means
/// writing one more implementation rather than touching the orchestrator.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Resolves `reference` against this source, returning its manifest, canonical digest, and
    /// raw bytes.
    ///
    /// For a tag selector this performs the registry/Hub lookup; for a digest selector the
    /// implementation may still need one round trip to fetch the manifest body itself.
    async fn resolve(&self, reference: &Reference) -> DistributionResult<ResolvedManifest>;

    /// Fetches the config blob named by a resolved manifest.
    async fn fetch_config(
        &self,
        reference: &Reference,
        config_digest: &str,
    ) -> DistributionResult<Bytes>;

    /// Opens a byte stream for the blob `digest`, optionally resuming from a byte offset.
    ///
    /// `range` follows the same convention as [`crate::utils::convert_bounds`]: an unbounded
    /// start means "from the beginning," and callers requesting a resume pass `offset..`.
    async fn fetch_blob(
        &self,
        reference: &Reference,
        digest: &str,
        range: std::ops::Range<u64>,
    ) -> DistributionResult<BlobStream>;

    /// Pushes a manifest and its blobs to this source, if supported.
    ///
    /// The HuggingFace Hub source does not support push and returns
    /// [`crate::error::DistributionError::NotImplemented`].
    async fn push(
        &self,
        reference: &Reference,
        manifest: &ResolvedManifest,
        blob_provider: &(dyn BlobProvider),
    ) -> DistributionResult<()>;
}

/// Supplies blob bytes by digest during a push, so [`ArtifactSource::push`] does not need to
/// know how the caller's local store is laid out.
#[async_trait]
pub trait BlobProvider: Send + Sync {
    /// Returns the full contents of the blob named by `digest`.
    async fn blob_bytes(&self, digest: &str) -> DistributionResult<Bytes>;
}

/// Narrows an unbounded-start range the way [`ArtifactSource::fetch_blob`] callers expect: a
/// plain `0..` for a full fetch, or `offset..` to resume.
pub fn full_range() -> std::ops::Range<u64> {
    0..u64::MAX
}

/// Builds a resume range starting at `offset`.
pub fn resume_range(offset: u64) -> std::ops::Range<u64> {
    offset..u64::MAX
}
