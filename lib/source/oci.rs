//! The OCI Distribution v2 [`ArtifactSource`] implementation (§4.4.1): registry ping, bearer
//! token exchange, manifest/index resolution with platform selection, and ranged blob fetch.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use oci_spec::image::{Descriptor, ImageIndex, ImageManifest, MediaType};
use reqwest::StatusCode;

use crate::{
    error::{DistributionError, DistributionResult},
    keychain::{Authenticator, Keychain},
    model::{ResolvedManifest, ACCEPTED_MANIFEST_MEDIA_TYPES, MODEL_MANIFEST_MEDIA_TYPE},
    reference::{Reference, ReferenceSelector},
    transport::{classify_status, RegistryTransport, Scope},
    utils::digest_bytes,
};

use super::{ArtifactSource, BlobProvider, BlobStream};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The platform this build selects from a manifest list/index when the caller does not
/// override it. The teacher hardcodes Linux-first; this build takes the host triple instead so
/// it behaves correctly when cross-building or inspecting non-Linux model artifacts.
pub fn default_platform() -> (String, String) {
    (std::env::consts::OS.to_string(), std::env::consts::ARCH.to_string())
}

/// Docker Registry v2's annotation key marking an attestation manifest, which platform
/// selection must skip over (it carries no pullable layers).
const REFERRERS_ATTESTATION_ANNOTATION: &str = "vnd.docker.reference.type";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An [`ArtifactSource`] backed by an OCI Distribution v2 registry.
#[derive(Clone)]
pub struct OciSource {
    transport: Arc<RegistryTransport>,
    keychain: Arc<Keychain>,
    plain_http: bool,
    platform_override: Option<(String, String)>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl OciSource {
    /// Builds a source over `transport`, resolving credentials through `keychain`.
    pub fn new(transport: RegistryTransport, keychain: Keychain, plain_http: bool) -> Self {
        Self {
            transport: Arc::new(transport),
            keychain: Arc::new(keychain),
            plain_http,
            platform_override: None,
        }
    }

    /// Overrides the `(os, arch)` pair used to select a manifest from a manifest list/index.
    pub fn with_platform_override(mut self, os: impl Into<String>, arch: impl Into<String>) -> Self {
        self.platform_override = Some((os.into(), arch.into()));
        self
    }

    fn scheme(&self) -> &'static str {
        if self.plain_http {
            "http"
        } else {
            "https"
        }
    }

    async fn authenticator_for(&self, registry: &str) -> DistributionResult<Authenticator> {
        self.keychain.resolve(registry).await
    }

    async fn bearer_token(
        &self,
        reference: &Reference,
        scope: Scope,
    ) -> DistributionResult<Option<String>> {
        let Some(challenge) = self
            .transport
            .ping(reference.get_registry(), self.plain_http)
            .await?
        else {
            return std::result::Result::Ok(None);
        };

        let authenticator = self.authenticator_for(reference.get_registry()).await?;
        let token = self
            .transport
            .exchange_token(&challenge, reference.get_repository(), scope, &authenticator)
            .await?;

        std::result::Result::Ok(Some(token))
    }

    fn manifest_url(&self, reference: &Reference, selector_value: &str) -> String {
        format!(
            "{}://{}/v2/{}/manifests/{}",
            self.scheme(),
            reference.get_registry(),
            reference.get_repository(),
            selector_value
        )
    }

    fn blob_url(&self, reference: &Reference, digest: &str) -> String {
        format!(
            "{}://{}/v2/{}/blobs/{}",
            self.scheme(),
            reference.get_registry(),
            reference.get_repository(),
            digest
        )
    }

    fn selector_value(reference: &Reference) -> String {
        match reference.get_selector() {
            ReferenceSelector::Tag { tag, digest } => digest
                .as_ref()
                .map(|d| d.to_string())
                .unwrap_or_else(|| tag.clone()),
            ReferenceSelector::Digest(digest) => digest.to_string(),
            ReferenceSelector::ShortId(id) => id.clone(),
        }
    }

    /// Selects one manifest descriptor from an index, preferring an exact platform match and
    /// skipping attestation manifests, falling back to the first non-attestation entry.
    fn select_manifest<'a>(&self, index: &'a ImageIndex) -> DistributionResult<&'a Descriptor> {
        let (target_os, target_arch) = self
            .platform_override
            .clone()
            .unwrap_or_else(default_platform);

        let is_attestation = |d: &Descriptor| {
            d.annotations()
                .as_ref()
                .is_some_and(|a| a.contains_key(REFERRERS_ATTESTATION_ANNOTATION))
        };

        let exact = index.manifests().iter().find(|m| {
            !is_attestation(m)
                && m.platform().as_ref().is_some_and(|p| {
                    p.os().to_string().eq_ignore_ascii_case(&target_os)
                        && p.architecture().to_string().eq_ignore_ascii_case(&target_arch)
                })
        });

        let fallback = || {
            index
                .manifests()
                .iter()
                .find(|m| !is_attestation(m))
        };

        exact
            .or_else(fallback)
            .ok_or_else(|| DistributionError::NotFound("no matching manifest in index".to_string()))
    }

    /// Fetches a manifest's raw bytes and content type (§4.4.1).
    ///
    /// When `selector_value` is itself a digest, the standard fetcher tries `/blobs/<digest>`
    /// first: some registries serve manifests there but reject the equivalent `/manifests/<ref>`
    /// request. The `/manifests/<ref>` path is always tried next (or first, for a tag selector,
    /// which `/blobs/` can never resolve).
    async fn fetch_manifest_bytes(
        &self,
        reference: &Reference,
        selector_value: &str,
        token: Option<&str>,
    ) -> DistributionResult<(Vec<u8>, String)> {
        let accept = ACCEPTED_MANIFEST_MEDIA_TYPES.join(", ");

        if crate::utils::hex_of_digest(selector_value).is_some() {
            let blob_url = self.blob_url(reference, selector_value);
            let blob_response = self
                .transport
                .get(&blob_url, &accept, token, None, None)
                .await?;
            if blob_response.status().is_success() {
                return Self::read_manifest_response(blob_response).await;
            }
            tracing::debug!(
                repository = reference.get_repository(),
                digest = selector_value,
                status = %blob_response.status(),
                "manifest not served from blobs endpoint, falling back to manifests endpoint"
            );
        }

        let url = self.manifest_url(reference, selector_value);
        let response = self
            .transport
            .get(&url, &accept, token, None, None)
            .await?;

        if !response.status().is_success() {
            return Err(classify_status(response.status(), reference.get_repository()));
        }

        Self::read_manifest_response(response).await
    }

    async fn read_manifest_response(response: reqwest::Response) -> DistributionResult<(Vec<u8>, String)> {
        let media_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(MODEL_MANIFEST_MEDIA_TYPE)
            .to_string();

        let bytes = response.bytes().await?;
        std::result::Result::Ok((bytes.to_vec(), media_type))
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl ArtifactSource for OciSource {
    async fn resolve(&self, reference: &Reference) -> DistributionResult<ResolvedManifest> {
        let token = self.bearer_token(reference, Scope::Pull).await?;
        let selector_value = Self::selector_value(reference);

        let (mut raw, mut media_type) = self
            .fetch_manifest_bytes(reference, &selector_value, token.as_deref())
            .await?;

        // An index/manifest-list requires a second hop: pick a platform then fetch that
        // manifest's own bytes, so the digest we store is always of a leaf image manifest.
        if media_type.contains("manifest.list") || media_type.contains("image.index") {
            let index: ImageIndex = serde_json::from_slice(&raw)?;
            let chosen = self.select_manifest(&index)?.clone();
            let (leaf_raw, leaf_media_type) = self
                .fetch_manifest_bytes(reference, &chosen.digest().to_string(), token.as_deref())
                .await?;
            raw = leaf_raw;
            media_type = leaf_media_type;
        }

        if !ACCEPTED_MANIFEST_MEDIA_TYPES.iter().any(|accepted| &media_type == accepted) {
            return Err(DistributionError::UnsupportedMediaType(media_type));
        }

        let manifest: ImageManifest = serde_json::from_slice(&raw)?;
        let digest = digest_bytes(&raw);

        tracing::debug!(repository = reference.get_repository(), digest, "manifest resolved");
        std::result::Result::Ok(ResolvedManifest {
            manifest,
            digest,
            raw,
        })
    }

    async fn fetch_config(
        &self,
        reference: &Reference,
        config_digest: &str,
    ) -> DistributionResult<Bytes> {
        let token = self.bearer_token(reference, Scope::Pull).await?;
        let url = self.blob_url(reference, config_digest);
        let response = self
            .transport
            .get(&url, "*/*", token.as_deref(), None, None)
            .await?;

        if !response.status().is_success() {
            return Err(classify_status(response.status(), reference.get_repository()));
        }

        std::result::Result::Ok(response.bytes().await?)
    }

    async fn fetch_blob(
        &self,
        reference: &Reference,
        digest: &str,
        range: std::ops::Range<u64>,
    ) -> DistributionResult<BlobStream> {
        let token = self.bearer_token(reference, Scope::Pull).await?;
        let url = self.blob_url(reference, digest);

        let resume_offset = if range.start > 0 { Some(range.start) } else { None };
        let response = self
            .transport
            .get(&url, "*/*", token.as_deref(), resume_offset.or(Some(0)), Some(digest))
            .await?;

        if !response.status().is_success() && response.status() != StatusCode::PARTIAL_CONTENT {
            return Err(classify_status(response.status(), reference.get_repository()));
        }

        // A registry may honor a ranged request with either 206 (partial content) or a plain
        // 200 whose body still starts at the requested offset; the transport's range tracker
        // already recorded whichever one this was, so the store knows to append rather than
        // truncate.
        if resume_offset.is_some() && !self.transport.range_tracker().was_honored(digest).await {
            tracing::warn!(digest, "registry did not honor range resume, restart required");
            return Err(DistributionError::Interrupted(format!(
                "registry did not honor range resume for {digest}"
            )));
        }

        let stream = response.bytes_stream().map(|item| item.map_err(DistributionError::from));
        std::result::Result::Ok(stream.boxed())
    }

    async fn push(
        &self,
        reference: &Reference,
        resolved: &ResolvedManifest,
        blob_provider: &(dyn BlobProvider),
    ) -> DistributionResult<()> {
        let token = self.bearer_token(reference, Scope::Push).await?;

        let mut descriptors: Vec<&Descriptor> = resolved.manifest.layers().iter().collect();
        descriptors.push(resolved.manifest.config());

        for descriptor in descriptors {
            let digest = descriptor.digest().to_string();
            let url = self.blob_url(reference, &digest);

            let head = self
                .transport
                .get(&url, "*/*", token.as_deref(), None, None)
                .await;
            if let std::result::Result::Ok(response) = &head {
                if response.status().is_success() {
                    tracing::debug!(digest, "blob already present on registry, skipping upload");
                    continue;
                }
            }

            let bytes = blob_provider.blob_bytes(&digest).await?;
            let upload_url = format!(
                "{}://{}/v2/{}/blobs/uploads/",
                self.scheme(),
                reference.get_registry(),
                reference.get_repository()
            );

            let location = self.transport.start_upload(&upload_url, token.as_deref()).await?;
            self.transport
                .upload_blob(&location, &digest, token.as_deref(), bytes)
                .await?;
            tracing::debug!(digest, "blob uploaded");
        }

        let manifest_url = self.manifest_url(reference, &Self::selector_value(reference));
        self.transport
            .put_manifest(&manifest_url, MODEL_MANIFEST_MEDIA_TYPE, token.as_deref(), resolved.raw.clone())
            .await?;
        tracing::debug!(repository = reference.get_repository(), "manifest pushed");

        std::result::Result::Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
