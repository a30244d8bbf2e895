//! Materializes a resolved model manifest into a ready-to-load directory (§4.5 Bundles):
//! single-file GGUF, or a safetensors shard directory, with an optional mmproj file alongside.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::{
    error::{DistributionError, DistributionResult},
    model::{ModelConfigData, ModelFormat},
};

use super::LocalStore;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A model's weights, materialized on disk in the shape its runtime expects.
#[derive(Debug, Clone)]
pub struct ModelBundle {
    root_dir: PathBuf,
    format: ModelFormat,
    primary_filename: String,
    mmproj_filename: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ModelBundle {
    /// Materializes `manifest_digest`'s layers into `bundle_root`, hard-linking each committed
    /// blob to its layer's annotated filename (falling back to the bare digest hex when a layer
    /// carries no filename annotation).
    ///
    /// Re-materializing an already up-to-date bundle is cheap: existing entries whose target
    /// already matches the source blob (same device and inode) are left untouched.
    pub async fn materialize(
        store: &LocalStore,
        manifest_digest: &str,
        config: &ModelConfigData,
        bundle_root: impl Into<PathBuf>,
    ) -> DistributionResult<Self> {
        let bundle_root = bundle_root.into();
        fs::create_dir_all(&bundle_root).await?;

        let raw = store.read_manifest(manifest_digest).await?;
        let manifest: oci_spec::image::ImageManifest = serde_json::from_slice(&raw)?;

        let mut primary_filename = None;
        let mut mmproj_filename = None;

        for layer in manifest.layers() {
            let filename = layer_filename(layer);
            let source = store.blob_path(&layer.digest().to_string())?;
            let target = bundle_root.join(&filename);
            materialize_one(&source, &target).await?;

            if config
                .mmproj_filename
                .as_deref()
                .is_some_and(|m| m == filename)
            {
                mmproj_filename = Some(filename);
            } else {
                primary_filename.get_or_insert(filename);
            }
        }

        let primary_filename = primary_filename.ok_or_else(|| {
            DistributionError::StoreCorruption(format!(
                "manifest {manifest_digest} has no weight layers to bundle"
            ))
        })?;

        Ok(Self {
            root_dir: bundle_root,
            format: config.format.clone(),
            primary_filename,
            mmproj_filename,
        })
    }

    /// The bundle's root directory.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// The path to the primary GGUF file. Only meaningful when [`Self::format`] is
    /// [`ModelFormat::Gguf`].
    pub fn gguf_path(&self) -> Option<PathBuf> {
        matches!(self.format, ModelFormat::Gguf).then(|| self.root_dir.join(&self.primary_filename))
    }

    /// The safetensors shard directory — the bundle root itself, since shards sit alongside one
    /// another with no further nesting. Only meaningful when [`Self::format`] is
    /// [`ModelFormat::Safetensors`].
    pub fn safetensors_path(&self) -> Option<PathBuf> {
        matches!(self.format, ModelFormat::Safetensors).then(|| self.root_dir.clone())
    }

    /// The path to the multimodal projector file, if the model carries one.
    pub fn mmproj_path(&self) -> Option<PathBuf> {
        self.mmproj_filename.as_ref().map(|f| self.root_dir.join(f))
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn layer_filename(layer: &oci_spec::image::Descriptor) -> String {
    layer
        .annotations()
        .as_ref()
        .and_then(|a| a.get("org.opencontainers.image.title"))
        .cloned()
        .unwrap_or_else(|| {
            crate::utils::hex_of_digest(&layer.digest().to_string())
                .unwrap_or("layer")
                .to_string()
        })
}

async fn materialize_one(source: &Path, target: &Path) -> DistributionResult<()> {
    if let Ok(existing) = fs::symlink_metadata(target).await {
        if let (Ok(source_meta), true) = (fs::metadata(source).await, existing.is_file()) {
            if same_file(&source_meta, &existing) {
                return Ok(());
            }
        }
        fs::remove_file(target).await.ok();
    }

    match fs::hard_link(source, target).await {
        Ok(()) => Ok(()),
        Err(_) => {
            // Cross-device or otherwise unlinkable; fall back to a copy.
            fs::copy(source, target).await?;
            Ok(())
        }
    }
}

#[cfg(unix)]
fn same_file(a: &std::fs::Metadata, b: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    a.dev() == b.dev() && a.ino() == b.ino()
}

#[cfg(not(unix))]
fn same_file(_a: &std::fs::Metadata, _b: &std::fs::Metadata) -> bool {
    false
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;
    use oci_spec::image::{DescriptorBuilder, ImageManifestBuilder, MediaType};
    use std::collections::HashMap;

    async fn store_with_gguf_layer(dir: &Path) -> (LocalStore, String, String) {
        let store = LocalStore::new(dir).await.unwrap();
        let data: &[u8] = b"fake gguf bytes";
        let digest = crate::utils::digest_bytes(data);
        store
            .write_blob(
                "diff-gguf",
                &digest,
                0,
                Box::pin(stream::iter(vec![Ok::<_, DistributionError>(Bytes::from_static(data))])),
            )
            .await
            .unwrap();

        let mut annotations = HashMap::new();
        annotations.insert(
            "org.opencontainers.image.title".to_string(),
            "model.Q4_K_M.gguf".to_string(),
        );
        let mut layer = DescriptorBuilder::default()
            .media_type(MediaType::Other(
                "application/vnd.model-distribution.layer.v1.raw".to_string(),
            ))
            .digest(digest.parse::<oci_spec::image::Digest>().unwrap())
            .size(data.len() as u64)
            .build()
            .unwrap();
        layer.set_annotations(Some(annotations));

        let config_data = br#"{"format":"gguf"}"#;
        let config_digest = store.write_blob_bytes(config_data).await.unwrap();
        let config_descriptor = DescriptorBuilder::default()
            .media_type(MediaType::Other(
                "application/vnd.model-distribution.config.v1+json".to_string(),
            ))
            .digest(config_digest.parse::<oci_spec::image::Digest>().unwrap())
            .size(config_data.len() as u64)
            .build()
            .unwrap();

        let manifest = ImageManifestBuilder::default()
            .schema_version(2u32)
            .config(config_descriptor)
            .layers(vec![layer])
            .build()
            .unwrap();
        let raw = serde_json::to_vec(&manifest).unwrap();
        let manifest_digest = store.write_manifest(&raw).await.unwrap();

        (store, manifest_digest, digest)
    }

    #[tokio::test]
    async fn test_materialize_gguf_bundle() {
        let store_dir = tempfile::tempdir().unwrap();
        let bundle_dir = tempfile::tempdir().unwrap();
        let (store, manifest_digest, _blob_digest) = store_with_gguf_layer(store_dir.path()).await;

        let config = ModelConfigData {
            format: ModelFormat::Gguf,
            architecture: None,
            quantization: Some("Q4_K_M".to_string()),
            parameters: None,
            context_size: None,
            mmproj_filename: None,
        };

        let bundle = ModelBundle::materialize(
            &store,
            &manifest_digest,
            &config,
            bundle_dir.path().join("bundle"),
        )
        .await
        .unwrap();

        let gguf_path = bundle.gguf_path().unwrap();
        assert!(gguf_path.exists());
        assert_eq!(tokio::fs::read(&gguf_path).await.unwrap(), b"fake gguf bytes");
        assert!(bundle.safetensors_path().is_none());
        assert!(bundle.mmproj_path().is_none());
    }

    #[tokio::test]
    async fn test_materialize_is_idempotent() {
        let store_dir = tempfile::tempdir().unwrap();
        let bundle_dir = tempfile::tempdir().unwrap();
        let (store, manifest_digest, _blob_digest) = store_with_gguf_layer(store_dir.path()).await;

        let config = ModelConfigData {
            format: ModelFormat::Gguf,
            architecture: None,
            quantization: None,
            parameters: None,
            context_size: None,
            mmproj_filename: None,
        };

        let root = bundle_dir.path().join("bundle");
        ModelBundle::materialize(&store, &manifest_digest, &config, &root)
            .await
            .unwrap();
        let second = ModelBundle::materialize(&store, &manifest_digest, &config, &root)
            .await
            .unwrap();

        assert!(second.gguf_path().unwrap().exists());
    }
}
