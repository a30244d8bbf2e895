//! Shared data model types: the media types this build recognizes, a resolved manifest, and
//! the model-config payload carried inside it (§3).

use oci_spec::image::{Descriptor, ImageManifest};
use serde::{Deserialize, Serialize};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The media type used for the synthetic/native model-config blob this crate writes.
pub const MODEL_CONFIG_MEDIA_TYPE: &str = "application/vnd.model-distribution.config.v1+json";

/// The media type used for the manifest this crate writes (OCI image-manifest shaped, but
/// scoped to model artifacts rather than container layers).
pub const MODEL_MANIFEST_MEDIA_TYPE: &str = "application/vnd.model-distribution.manifest.v1+json";

/// The media type for an opaque model weights layer (GGUF file, safetensors shard, ...).
pub const MODEL_LAYER_MEDIA_TYPE: &str = "application/vnd.model-distribution.layer.v1.raw";

/// Manifest media types accepted when classifying a fetched manifest response (§4.4.1).
pub const ACCEPTED_MANIFEST_MEDIA_TYPES: &[&str] = &[
    "application/vnd.oci.image.manifest.v1+json",
    "application/vnd.oci.image.index.v1+json",
    "application/vnd.docker.distribution.manifest.v1+json",
    "application/vnd.docker.distribution.manifest.v2+json",
    "application/vnd.docker.distribution.manifest.list.v2+json",
    "application/vnd.docker.distribution.manifest.v1+prettyjws",
];

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The recognized on-disk format of a model's primary weights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    /// A single-file GGUF model (llama.cpp family).
    Gguf,
    /// A safetensors model, usually sharded across a directory.
    Safetensors,
    /// Any other format this build does not specially understand.
    Other(String),
}

impl std::fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelFormat::Gguf => write!(f, "gguf"),
            ModelFormat::Safetensors => write!(f, "safetensors"),
            ModelFormat::Other(s) => write!(f, "{}", s),
        }
    }
}

/// This build's set of formats it knows how to serve as a [`crate::store::bundle::ModelBundle`].
pub const SUPPORTED_FORMATS: &[&str] = &["gguf", "safetensors"];

/// The model-config payload (§3's `ModelConfig` entity), carried as the manifest's config blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfigData {
    /// The model's on-disk format.
    pub format: ModelFormat,

    /// The model architecture (e.g. `"llama"`), if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,

    /// The quantization scheme selected (e.g. `"Q4_K_M"`), if applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantization: Option<String>,

    /// The parameter count, as a human string (e.g. `"7B"`), if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<String>,

    /// The model's maximum context size in tokens, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_size: Option<u64>,

    /// Name of the optional multimodal projector layer selected alongside the primary weights.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mmproj_filename: Option<String>,
}

impl ModelConfigData {
    /// Returns `true` if `self.format` is one this build knows how to bundle (§A.5's
    /// compatibility gate uses this to decide between hard failure and a warning).
    pub fn is_supported_format(&self) -> bool {
        SUPPORTED_FORMATS.contains(&self.format.to_string().as_str())
    }
}

/// A manifest resolved from a remote source, paired with its canonical digest and raw bytes.
///
/// The digest is captured once, at resolution time, and carried through the rest of the pull
/// (§4.6 step 2) — it is never recomputed from a second tag lookup.
#[derive(Debug, Clone)]
pub struct ResolvedManifest {
    /// The parsed manifest.
    pub manifest: ImageManifest,
    /// `sha256(raw)`.
    pub digest: String,
    /// The manifest's raw, exact bytes (hashing and storage both operate on this, not a
    /// re-serialization, so the digest always matches what's stored).
    pub raw: Vec<u8>,
}

/// A single layer slated for download, paired with the diff-id (uncompressed digest) used to
/// key the store's incomplete-download sidecar.
#[derive(Debug, Clone)]
pub struct LayerPlan {
    /// The layer's descriptor (compressed digest, size, media type) as it appears in the
    /// manifest.
    pub descriptor: Descriptor,
    /// The uncompressed digest, used as the incomplete-sidecar key.
    pub diff_id: String,
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_supported_format() {
        let gguf = ModelConfigData {
            format: ModelFormat::Gguf,
            architecture: None,
            quantization: None,
            parameters: None,
            context_size: None,
            mmproj_filename: None,
        };
        assert!(gguf.is_supported_format());

        let exotic = ModelConfigData {
            format: ModelFormat::Other("onnx".to_string()),
            ..gguf.clone()
        };
        assert!(!exotic.is_supported_format());
    }

    #[test]
    fn test_model_config_round_trips_through_json() {
        let config = ModelConfigData {
            format: ModelFormat::Gguf,
            architecture: Some("llama".to_string()),
            quantization: Some("Q4_K_M".to_string()),
            parameters: Some("7B".to_string()),
            context_size: Some(4096),
            mmproj_filename: None,
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: ModelConfigData = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
