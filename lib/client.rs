//! The distribution client (§4.6–4.7): the orchestrator that ties the reference parser, keychain,
//! sources, and local store together into `EnsureModel`/`PullModel`/`PushModel`/`LoadModel` and
//! the store-management operations built on top of them.

use std::sync::Arc;

use oci_spec::image::ImageConfiguration;
use tokio_util::sync::CancellationToken;

use crate::{
    concurrency::PullGate,
    config::DistributionClientConfig,
    error::{DistributionError, DistributionResult},
    keychain::Keychain,
    model::{ModelConfigData, ResolvedManifest, MODEL_CONFIG_MEDIA_TYPE},
    progress::{ProgressEvent, ProgressSink},
    reference::{Reference, ReferenceSelector},
    source::{huggingface::HuggingFaceSource, oci::OciSource, resume_range, ArtifactSource, BlobProvider},
    store::{bundle::ModelBundle, LocalStore, TagAction},
    transport::RegistryTransport,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The outcome of resolving a manifest's config against the formats this build can bundle
/// (§4.6 step 3, the compatibility gate).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompatibilityOutcome {
    /// The config names a format this build can bundle.
    Ok,
    /// The manifest's config media type is not one this build understands at all.
    UnsupportedMediaType(String),
    /// The config parsed, but names a format this build has no bundler for; the pull still
    /// completes, since the caller may only need the raw files (e.g. to re-push or inspect).
    UnsupportedFormatWarning(String),
}

/// The distribution client: one [`LocalStore`] plus one source per protocol.
pub struct DistributionClient {
    store: LocalStore,
    oci: OciSource,
    huggingface: HuggingFaceSource,
    gate: PullGate,
    default_registry: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DistributionClient {
    /// Builds a client from `config`, opening (and creating, if necessary) its local store.
    pub async fn new(config: DistributionClientConfig) -> DistributionResult<Self> {
        let store = LocalStore::new(config.store_root_path.clone()).await?;

        let transport = match &config.transport {
            Some(client) => RegistryTransport::new(client.clone(), config.user_agent.clone()),
            None => RegistryTransport::with_default_client(
                config.user_agent.clone(),
                config.request_retry_attempts,
            ),
        };

        let env_override = match (&config.registry_username, &config.registry_password) {
            (Some(u), Some(p)) => Some((u.clone(), p.clone())),
            _ => None,
        };
        let keychain = Keychain::new(
            dirs::home_dir()
                .unwrap_or_else(|| std::path::PathBuf::from("."))
                .join(".docker")
                .join("config.json"),
            env_override,
        );

        let oci = OciSource::new(transport, keychain_clone(&keychain), config.plain_http || config.insecure_registry);
        let huggingface = HuggingFaceSource::new(keychain, config.request_retry_attempts);

        Ok(Self {
            store,
            oci,
            huggingface,
            gate: PullGate::new(config.max_concurrent_pulls),
            default_registry: config.effective_default_registry(),
        })
    }

    /// The client's local store.
    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Ensures `reference` is present in the store, pulling it only if it is not already tagged
    /// and its manifest missing (§4.6 `EnsureModel`).
    pub async fn ensure_model(
        &self,
        reference: &str,
        progress: &mut ProgressSink<'_>,
        cancel: &CancellationToken,
    ) -> DistributionResult<String> {
        let parsed = Reference::parse_with_default_registry(reference, &self.default_registry)?;
        if let Some(digest) = self.store.resolve_tag(&parsed.to_string()).await? {
            if self.store.manifest_exists(&digest).await {
                progress.emit(&ProgressEvent::info(format!("{reference}: already present")))?;
                return Ok(digest);
            }
        }
        self.pull_model(reference, progress, cancel).await
    }

    /// Runs the full pull pipeline (§4.6 `PullModel`, §4.7 Pull state machine):
    /// `Start → ManifestResolved → (CacheHit|NeedsFetch) → LayersComplete → ManifestCommitted →
    /// TagsApplied → Done`.
    pub async fn pull_model(
        &self,
        reference: &str,
        progress: &mut ProgressSink<'_>,
        cancel: &CancellationToken,
    ) -> DistributionResult<String> {
        let parsed = Reference::parse_with_default_registry(reference, &self.default_registry)?;
        let source = self.source_for(&parsed);

        let permit = self.gate.acquire(cancel).await;
        if permit.is_none() {
            tracing::warn!(reference, "cancelled before a pull slot was available");
            return Err(DistributionError::Interrupted(format!(
                "{reference}: cancelled before a pull slot was available"
            )));
        }

        progress.emit(&ProgressEvent::info(format!("{reference}: resolving manifest")))?;
        let resolved = source.resolve(&parsed).await?;

        // Cache hit: this exact manifest digest is already committed, so only the tag needs
        // touching.
        if self.store.manifest_exists(&resolved.digest).await {
            tracing::info!(reference, digest = %resolved.digest, "manifest already in store, cache hit");
            progress.emit(&ProgressEvent::info(format!(
                "{reference}: manifest {} already in store",
                resolved.digest
            )))?;
            self.apply_tags(&parsed, &resolved.digest).await?;
            progress.emit(&ProgressEvent::info(format!("{reference}: done (cache hit)")))?;
            return Ok(resolved.digest);
        }

        let config_media_type = resolved.manifest.config().media_type().to_string();
        if config_media_type != MODEL_CONFIG_MEDIA_TYPE {
            tracing::warn!(reference, media_type = config_media_type, "unrecognized config media type");
            return Err(DistributionError::UnsupportedMediaType(config_media_type));
        }

        let config_bytes = self.fetch_or_read_config(&source, &parsed, &resolved).await?;
        let config: ModelConfigData = serde_json::from_slice(&config_bytes)?;
        if let CompatibilityOutcome::UnsupportedFormatWarning(format) = compatibility_outcome(&config) {
            tracing::warn!(reference, format, "config names a format with no bundler in this build");
            progress.emit(&ProgressEvent::warning(format!(
                "{reference}: format '{format}' has no bundler in this build; weights will still be stored"
            )))?;
        }
        self.store.write_blob_bytes(&config_bytes).await?;

        let diff_ids = self.diff_ids_for(&resolved).await;

        for (index, layer) in resolved.manifest.layers().iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(DistributionError::Interrupted(format!("{reference}: cancelled")));
            }

            let digest = layer.digest().to_string();
            if self.store.blob_exists(&digest).await {
                continue;
            }

            let diff_id = diff_ids.get(index).cloned().unwrap_or_else(|| digest.clone());
            let resume_offset = self.store.incomplete_size(&diff_id).await?;

            progress.emit(&ProgressEvent::transfer(
                format!("{reference}: fetching layer"),
                digest.clone(),
                resume_offset,
                layer.size(),
            ))?;

            let range = resume_range(resume_offset);
            let stream = source.fetch_blob(&parsed, &digest, range).await?;
            match self.store.write_blob(&diff_id, &digest, resume_offset, stream).await {
                Ok(_) => tracing::debug!(reference, digest, "layer committed"),
                Err(e @ DistributionError::Integrity(..)) => {
                    tracing::error!(reference, digest, error = %e, "layer failed integrity check");
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }

        progress.emit(&ProgressEvent::info(format!("{reference}: committing manifest")))?;
        let committed_digest = self.store.write_manifest(&resolved.raw).await?;
        self.apply_tags(&parsed, &committed_digest).await?;

        tracing::info!(reference, digest = %committed_digest, "pull complete");
        progress.emit(&ProgressEvent::info(format!("{reference}: done")))?;
        Ok(committed_digest)
    }

    /// Pushes `reference`'s current store contents to its source (OCI only; §4.6 `PushModel`).
    pub async fn push_model(
        &self,
        reference: &str,
        progress: &mut ProgressSink<'_>,
    ) -> DistributionResult<()> {
        let parsed = Reference::parse_with_default_registry(reference, &self.default_registry)?;
        let digest = self
            .store
            .resolve_tag(&parsed.to_string())
            .await?
            .ok_or_else(|| DistributionError::NotFound(format!("no such tag: {reference}")))?;

        let raw = self.store.read_manifest(&digest).await?;
        let manifest: oci_spec::image::ImageManifest = serde_json::from_slice(&raw)?;
        let resolved = ResolvedManifest { manifest, digest, raw };

        tracing::info!(reference, digest = %resolved.digest, "pushing to source");
        progress.emit(&ProgressEvent::info(format!("{reference}: pushing")))?;
        let source = self.source_for(&parsed);
        source.push(&parsed, &resolved, &StoreBlobProvider(&self.store)).await?;
        progress.emit(&ProgressEvent::info(format!("{reference}: pushed")))?;
        Ok(())
    }

    /// Ingests a self-contained tarball of blobs and a manifest (§4.6 `LoadModel`): every entry
    /// except `manifest.json` is committed as a blob keyed by its own digest, then the manifest
    /// is committed last so a crash mid-load never leaves a manifest referencing missing blobs.
    pub async fn load_model(
        &self,
        reader: impl std::io::Read,
        progress: &mut ProgressSink<'_>,
    ) -> DistributionResult<String> {
        let mut archive = tar::Archive::new(reader);
        let mut manifest_raw: Option<Vec<u8>> = None;

        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.to_path_buf();
            let mut bytes = Vec::new();
            std::io::Read::read_to_end(&mut entry, &mut bytes)?;

            if path.file_name().and_then(|n| n.to_str()) == Some("manifest.json") {
                manifest_raw = Some(bytes);
                continue;
            }

            let digest = self.store.write_blob_bytes(&bytes).await?;
            progress.emit(&ProgressEvent::info(format!("loaded blob {digest}")))?;
        }

        let manifest_raw = manifest_raw.ok_or_else(|| {
            DistributionError::StoreCorruption("tarball has no manifest.json entry".to_string())
        })?;
        let digest = self.store.write_manifest(&manifest_raw).await?;
        progress.emit(&ProgressEvent::info(format!("manifest committed as {digest}")))?;
        Ok(digest)
    }

    /// Lists every tagged reference in the store.
    pub async fn list_models(&self) -> DistributionResult<Vec<(String, String)>> {
        self.store.list_tags().await
    }

    /// Returns the manifest digest `reference` resolves to, if any: a tag or pinned-digest
    /// reference is looked up in the tag index, while a bare short ID or 64-hex ID (§4.1 step 2)
    /// is resolved by prefix against the manifests already committed to the store.
    pub async fn get_model(&self, reference: &str) -> DistributionResult<Option<String>> {
        let parsed = Reference::parse_with_default_registry(reference, &self.default_registry)?;
        if let ReferenceSelector::ShortId(id) = parsed.get_selector() {
            return self.store.resolve_id(id).await;
        }
        self.store.resolve_tag(&parsed.to_string()).await
    }

    /// Returns `true` if `reference` resolves to a manifest already committed in the store.
    pub async fn is_model_in_store(&self, reference: &str) -> DistributionResult<bool> {
        match self.get_model(reference).await? {
            Some(digest) => Ok(self.store.manifest_exists(&digest).await),
            None => Ok(false),
        }
    }

    /// Adds `tags` to the manifest `digest` currently points at.
    pub async fn tag(&self, digest: &str, tags: &[String]) -> DistributionResult<()> {
        self.store.add_tags(digest, tags).await
    }

    /// Deletes a model, following the same force/conflict semantics as [`LocalStore::delete`].
    pub async fn delete_model(&self, reference: &str, force: bool) -> DistributionResult<Vec<TagAction>> {
        let parsed = Reference::parse_with_default_registry(reference, &self.default_registry)?;
        let delete_key = if let ReferenceSelector::ShortId(id) = parsed.get_selector() {
            self.store
                .resolve_id(id)
                .await?
                .ok_or_else(|| DistributionError::NotFound(format!("no such id: {reference}")))?
        } else {
            parsed.to_string()
        };
        let result = self.store.delete(&delete_key, force).await;
        match &result {
            Ok(actions) => tracing::info!(reference, ?actions, "model deleted"),
            Err(e) => tracing::warn!(reference, error = %e, "delete rejected"),
        }
        result
    }

    /// Commits a manifest whose layers are asserted to already exist in the store, with no blob
    /// bytes crossing the boundary (§4.6 `WriteLightweightModel`).
    pub async fn write_lightweight_model(&self, manifest_raw: &[u8], tags: &[String]) -> DistributionResult<String> {
        let digest = self.store.write_lightweight(manifest_raw).await?;
        if !tags.is_empty() {
            self.store.add_tags(&digest, tags).await?;
        }
        Ok(digest)
    }

    /// Wipes the entire store.
    pub async fn reset_store(&self) -> DistributionResult<()> {
        self.store.reset().await
    }

    /// Materializes `reference`'s weights into `bundle_root` as a [`ModelBundle`].
    pub async fn get_bundle(
        &self,
        reference: &str,
        bundle_root: impl Into<std::path::PathBuf>,
    ) -> DistributionResult<ModelBundle> {
        let digest = self
            .get_model(reference)
            .await?
            .ok_or_else(|| DistributionError::NotFound(format!("no such tag: {reference}")))?;

        let raw = self.store.read_manifest(&digest).await?;
        let manifest: oci_spec::image::ImageManifest = serde_json::from_slice(&raw)?;
        let config_bytes = self.store.read_blob(&manifest.config().digest().to_string()).await?;
        let config: ModelConfigData = serde_json::from_slice(&config_bytes)?;

        ModelBundle::materialize(&self.store, &digest, &config, bundle_root).await
    }

    fn source_for(&self, reference: &Reference) -> Arc<dyn ArtifactSource> {
        if *reference.get_huggingface() {
            Arc::new(self.huggingface.clone())
        } else {
            Arc::new(self.oci.clone())
        }
    }

    async fn apply_tags(&self, reference: &Reference, digest: &str) -> DistributionResult<()> {
        if reference.is_id_only() {
            return Ok(());
        }
        self.store.add_tags(digest, &[reference.to_string()]).await
    }

    /// Fetches the config blob named by a resolved manifest, preferring an already-committed
    /// copy over a redundant round trip to the source.
    async fn fetch_or_read_config(
        &self,
        source: &Arc<dyn ArtifactSource>,
        reference: &Reference,
        resolved: &ResolvedManifest,
    ) -> DistributionResult<Vec<u8>> {
        let config_digest = resolved.manifest.config().digest().to_string();
        if self.store.blob_exists(&config_digest).await {
            return self.store.read_blob(&config_digest).await;
        }

        let bytes = source.fetch_config(reference, &config_digest).await?;
        Ok(bytes.to_vec())
    }

    /// Builds the diff-id list for a resolved manifest's layers, indexed by position: the OCI
    /// config's `RootFS.DiffIDs` when the config parses as one, or (for the HuggingFace source's
    /// custom config shape, where no such concept exists) each layer's own digest.
    async fn diff_ids_for(&self, resolved: &ResolvedManifest) -> Vec<String> {
        let config_digest = resolved.manifest.config().digest().to_string();
        let diff_ids = match self.store.read_blob(&config_digest).await {
            Ok(bytes) => serde_json::from_slice::<ImageConfiguration>(&bytes)
                .ok()
                .map(|c| c.root_fs().diff_ids().iter().map(|d| d.to_string()).collect::<Vec<_>>()),
            Err(_) => None,
        };

        diff_ids.unwrap_or_else(|| {
            resolved
                .manifest
                .layers()
                .iter()
                .map(|l| l.digest().to_string())
                .collect()
        })
    }
}

struct StoreBlobProvider<'a>(&'a LocalStore);

#[async_trait::async_trait]
impl BlobProvider for StoreBlobProvider<'_> {
    async fn blob_bytes(&self, digest: &str) -> DistributionResult<bytes::Bytes> {
        self.0.read_blob(digest).await.map(bytes::Bytes::from)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Determines whether a resolved config is something this build knows how to bundle
/// (§4.6 step 3, run once the config media type itself has already been accepted).
fn compatibility_outcome(config: &ModelConfigData) -> CompatibilityOutcome {
    if config.is_supported_format() {
        CompatibilityOutcome::Ok
    } else {
        CompatibilityOutcome::UnsupportedFormatWarning(config.format.to_string())
    }
}

/// Clones a keychain's configuration (no `Clone` derive since credential helpers should not be
/// invoked more often than necessary; this builds a fresh, independently-usable instance).
fn keychain_clone(keychain: &Keychain) -> Keychain {
    Keychain::new(
        keychain.get_credentials_file_path().clone(),
        keychain.get_env_override().clone(),
    )
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
