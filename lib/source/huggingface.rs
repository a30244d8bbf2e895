//! The HuggingFace Hub native [`ArtifactSource`] implementation (§4.4.2): recursive tree
//! listing, GGUF quantization/mmproj selection, and file download via the Hub's `resolve` URLs.
//!
//! The Hub speaks a plain file-tree + file-download protocol, not OCI Distribution, so this
//! source synthesizes an [`ImageManifest`]/[`ResolvedManifest`] out of the tree listing instead
//! of fetching one from the server.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use oci_spec::image::{Descriptor, DescriptorBuilder, ImageManifestBuilder, MediaType};
use reqwest::{Client, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;

use crate::{
    error::{DistributionError, DistributionResult},
    keychain::{Authenticator, Keychain},
    model::{ModelConfigData, ModelFormat, ResolvedManifest, MODEL_CONFIG_MEDIA_TYPE, MODEL_LAYER_MEDIA_TYPE},
    reference::{Reference, ReferenceSelector},
    utils::digest_bytes,
};

use super::{ArtifactSource, BlobProvider, BlobStream};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The HuggingFace Hub's web/API origin.
pub const HF_HUB_BASE: &str = "https://huggingface.co";

/// Regular (non-LFS) filenames fetched alongside the selected weight file(s): tokenizer/config/
/// etc, none of which carry a quantization marker, so they always come along with any
/// GGUF/safetensors selection. Matched by filename (the last path component), not full path.
const AUXILIARY_FILE_PATTERNS: &[&str] = &[
    "config.json",
    "tokenizer.json",
    "tokenizer_config.json",
    "generation_config.json",
    "special_tokens_map.json",
    "tokenizer.model",
];

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct HfLfsInfo {
    size: u64,
    #[serde(default)]
    oid: String,
}

#[derive(Debug, Deserialize)]
struct HfTreeEntry {
    path: String,
    #[serde(default)]
    lfs: Option<HfLfsInfo>,
    #[serde(default)]
    size: u64,
}

/// One file in a repository, with its LFS-reported size/sha256 when applicable.
#[derive(Debug, Clone)]
pub struct RepoFile {
    /// The path within the repository.
    pub path: String,
    /// File size in bytes.
    pub size: u64,
    /// The LFS object's SHA256, if this file is LFS-tracked.
    pub sha256: Option<String>,
}

/// An [`ArtifactSource`] backed by the HuggingFace Hub's native file protocol.
#[derive(Clone)]
pub struct HuggingFaceSource {
    client: ClientWithMiddleware,
    keychain: std::sync::Arc<Keychain>,
    base_url: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl HuggingFaceSource {
    /// Builds a source using the default retry-enabled client, against the public Hub.
    pub fn new(keychain: Keychain, retry_attempts: u32) -> Self {
        Self::with_base_url(keychain, retry_attempts, HF_HUB_BASE.to_string())
    }

    /// Builds a source against an arbitrary base URL, so tests can point it at a
    /// [`wiremock::MockServer`] instead of the live Hub.
    pub fn with_base_url(keychain: Keychain, retry_attempts: u32, base_url: String) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(retry_attempts);
        let client = ClientBuilder::new(Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();
        Self {
            client,
            keychain: std::sync::Arc::new(keychain),
            base_url,
        }
    }

    async fn auth_header(&self) -> DistributionResult<Option<String>> {
        match self.keychain.resolve(&self.base_url).await? {
            Authenticator::Bearer { token } => std::result::Result::Ok(Some(format!("Bearer {token}"))),
            Authenticator::Basic { password, .. } => std::result::Result::Ok(Some(format!("Bearer {password}"))),
            Authenticator::Anonymous => std::result::Result::Ok(None),
        }
    }

    /// Recursively lists every file in `repository` at `revision` (§4.4.2 step 1).
    ///
    /// The Hub's tree endpoint paginates by directory rather than returning the full recursive
    /// listing from a single call for some repositories, so this walks subdirectories reported
    /// as entries with no `lfs`/`size` information of their own.
    pub async fn list_files(
        &self,
        repository: &str,
        revision: &str,
    ) -> DistributionResult<Vec<RepoFile>> {
        let mut files = Vec::new();
        let mut stack = vec![String::new()];
        let auth = self.auth_header().await?;

        while let Some(subpath) = stack.pop() {
            let base = &self.base_url;
            let url = if subpath.is_empty() {
                format!("{base}/api/models/{repository}/tree/{revision}")
            } else {
                format!("{base}/api/models/{repository}/tree/{revision}/{subpath}")
            };

            let mut request = self.client.get(&url);
            if let Some(auth) = &auth {
                request = request.header("Authorization", auth);
            }
            let response = request.send().await?;

            if !response.status().is_success() {
                let status = response.status();
                let excerpt = read_body_excerpt(response).await;
                return Err(classify_hf_status(status, repository, &excerpt));
            }

            let entries: Vec<HfTreeEntry> = response.json().await?;
            for entry in entries {
                if entry.lfs.is_none() && entry.size == 0 && !entry.path.contains('.') {
                    stack.push(entry.path);
                    continue;
                }
                files.push(RepoFile {
                    path: entry.path,
                    size: entry.lfs.as_ref().map(|l| l.size).unwrap_or(entry.size),
                    sha256: entry.lfs.map(|l| l.oid).filter(|s| !s.is_empty()),
                });
            }
        }

        std::result::Result::Ok(files)
    }

    /// Resolves the weight file(s) a reference's selector names: an explicit filename (the part
    /// after `:` in non-tag selectors is treated as a quantization substring match), or the
    /// single largest GGUF/safetensors file when no selector narrows the choice.
    fn select_weight_files(files: &[RepoFile], quant_hint: Option<&str>) -> Vec<RepoFile> {
        let gguf: Vec<&RepoFile> = files.iter().filter(|f| f.path.ends_with(".gguf")).collect();

        if !gguf.is_empty() {
            if let Some(hint) = quant_hint {
                let mut matches: Vec<RepoFile> = gguf
                    .iter()
                    .filter(|f| quant_hint_matches(&f.path, hint))
                    .map(|f| (*f).clone())
                    .collect();
                sort_shards(&mut matches);
                if !matches.is_empty() {
                    return matches;
                }
            }
            // No hint, or hint matched nothing: take the single smallest-numbered shard set
            // (the un-quantized default tends to be the first listed single-file GGUF).
            let mut single: Vec<RepoFile> = gguf
                .iter()
                .filter(|f| !f.path.to_ascii_lowercase().contains("mmproj"))
                .map(|f| (*f).clone())
                .collect();
            sort_shards(&mut single);
            return single.into_iter().take(1).collect();
        }

        let safetensors: Vec<RepoFile> = files
            .iter()
            .filter(|f| f.path.ends_with(".safetensors"))
            .cloned()
            .collect();
        safetensors
    }

    /// Selects the multimodal projector file, preferring an f16 variant over f32 (§4.4.2
    /// step 3), if the repository carries one at all.
    fn select_mmproj(files: &[RepoFile]) -> Option<RepoFile> {
        let candidates: Vec<&RepoFile> = files
            .iter()
            .filter(|f| f.path.to_ascii_lowercase().contains("mmproj"))
            .collect();

        candidates
            .iter()
            .find(|f| f.path.to_ascii_lowercase().contains("f16"))
            .or_else(|| candidates.first())
            .map(|f| (*f).clone())
    }

    fn resolve_url(base_url: &str, repository: &str, revision: &str, filename: &str) -> String {
        format!("{base_url}/{repository}/resolve/{revision}/{filename}")
    }

    /// The quantization substring to match against GGUF filenames. An explicit non-`latest` tag
    /// is used verbatim; a `latest` tag (or no tag at all) falls back to `Q4_K_M`, the Hub's
    /// conventional default quantization for GGUF repositories.
    fn quant_hint(reference: &Reference) -> Option<String> {
        match reference.get_selector() {
            ReferenceSelector::Tag { tag, .. } if tag != "latest" => Some(tag.clone()),
            _ => Some("Q4_K_M".to_string()),
        }
    }

    fn revision_of(reference: &Reference) -> String {
        match reference.get_selector() {
            ReferenceSelector::Tag { tag, .. } if tag == "latest" => "main".to_string(),
            ReferenceSelector::Tag { tag, .. } => tag.clone(),
            ReferenceSelector::Digest(d) => d.to_string(),
            ReferenceSelector::ShortId(id) => id.clone(),
        }
    }

    /// Lists `reference`'s tree and selects its weight/mmproj/auxiliary files, the shared first
    /// step of both [`Self::resolve`] (which also needs the selection to build layer descriptors)
    /// and [`Self::fetch_config`] (which only needs the derived config, not the manifest).
    async fn select_files(
        &self,
        reference: &Reference,
    ) -> DistributionResult<(Vec<RepoFile>, Option<RepoFile>, Vec<RepoFile>)> {
        let revision = Self::revision_of(reference);
        let files = self.list_files(reference.get_repository(), &revision).await?;
        let quant_hint = Self::quant_hint(reference);
        let weights = Self::select_weight_files(&files, quant_hint.as_deref());

        if weights.is_empty() {
            return Err(DistributionError::NotFound(format!(
                "{}: no gguf or safetensors weights found",
                reference.get_repository()
            )));
        }

        let mmproj = Self::select_mmproj(&files);
        let auxiliary = Self::select_auxiliary_files(&files);
        std::result::Result::Ok((weights, mmproj, auxiliary))
    }

    /// Selects regular (non-LFS) config/tokenizer files to fetch alongside the weights, so an
    /// inference engine reading the materialized bundle finds everything it expects next to the
    /// model file rather than just the raw weights.
    fn select_auxiliary_files(files: &[RepoFile]) -> Vec<RepoFile> {
        files
            .iter()
            .filter(|f| f.sha256.is_none())
            .filter(|f| {
                let filename = f.path.rsplit('/').next().unwrap_or(&f.path);
                AUXILIARY_FILE_PATTERNS.contains(&filename)
            })
            .cloned()
            .collect()
    }

    /// Fetches an auxiliary file's full bytes and builds its layer descriptor, content-addressed
    /// by its own SHA256 since the tree listing carries no LFS `oid` for non-LFS files.
    async fn describe_auxiliary(
        &self,
        reference: &Reference,
        revision: &str,
        file: &RepoFile,
    ) -> DistributionResult<Descriptor> {
        let bytes = self.download_whole(reference, revision, &file.path).await?;
        let digest = digest_bytes(&bytes);

        let descriptor = DescriptorBuilder::default()
            .media_type(MediaType::Other(MODEL_LAYER_MEDIA_TYPE.to_string()))
            .digest(digest.parse::<oci_spec::image::Digest>().map_err(DistributionError::custom)?)
            .size(bytes.len() as u64)
            .annotations(filename_annotation(&file.path))
            .build()
            .map_err(DistributionError::custom)?;

        std::result::Result::Ok(descriptor)
    }

    /// Downloads a file's entire contents in one shot (no range header), for the small
    /// auxiliary files that don't warrant streamed/resumable handling.
    async fn download_whole(&self, reference: &Reference, revision: &str, path: &str) -> DistributionResult<Bytes> {
        let url = Self::resolve_url(&self.base_url, reference.get_repository(), revision, path);
        let auth = self.auth_header().await?;

        let mut request = self.client.get(&url);
        if let Some(auth) = &auth {
            request = request.header("Authorization", auth);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let excerpt = read_body_excerpt(response).await;
            return Err(classify_hf_status(status, reference.get_repository(), &excerpt));
        }

        std::result::Result::Ok(response.bytes().await?)
    }

    fn config_for(reference: &Reference, weights: &[RepoFile], mmproj: &Option<RepoFile>) -> ModelConfigData {
        let format = if weights[0].path.ends_with(".gguf") {
            ModelFormat::Gguf
        } else {
            ModelFormat::Safetensors
        };

        ModelConfigData {
            format,
            architecture: None,
            quantization: Self::quant_hint(reference),
            parameters: None,
            context_size: None,
            mmproj_filename: mmproj.as_ref().map(|f| f.path.clone()),
        }
    }
}

/// Returns `true` if `hint` occurs in `path`'s filename bounded by `-`/`.` (or string
/// start/end) on both sides, not merely as a raw substring. `_` is not an outer boundary: it
/// only ever joins characters inside a single quant label (`Q4_K_M`), so treating it as a
/// boundary would let a hint of `Q4_K` falsely match `model-Q4_K_M.gguf`/`model-Q4_K_S.gguf`.
fn quant_hint_matches(path: &str, hint: &str) -> bool {
    const DELIMS: [char; 2] = ['-', '.'];
    let path = path.to_ascii_lowercase();
    let hint = hint.to_ascii_lowercase();
    if hint.is_empty() {
        return false;
    }

    let mut start = 0;
    while let Some(offset) = path[start..].find(&hint) {
        let match_start = start + offset;
        let match_end = match_start + hint.len();

        let before_ok = match path[..match_start].chars().next_back() {
            Some(c) => DELIMS.contains(&c),
            None => true,
        };
        let after_ok = match path[match_end..].chars().next() {
            Some(c) => DELIMS.contains(&c),
            None => true,
        };

        if before_ok && after_ok {
            return true;
        }
        start = match_start + 1;
        if start >= path.len() {
            break;
        }
    }
    false
}

fn sort_shards(files: &mut [RepoFile]) {
    files.sort_by(|a, b| shard_sort_key(&a.path).cmp(&shard_sort_key(&b.path)));
}

/// Extracts the zero-padded `NNNNN` from a `-NNNNN-of-MMMMM.gguf` shard suffix, if present, so
/// shards sort numerically rather than lexicographically (`-00002-` before `-00010-`).
fn shard_sort_key(path: &str) -> String {
    if let Some(idx) = path.rfind("-of-") {
        if let Some(start) = path[..idx].rfind('-') {
            let candidate = &path[start + 1..idx];
            if candidate.len() >= 4 && candidate.bytes().all(|b| b.is_ascii_digit()) {
                return candidate.to_string();
            }
        }
    }
    path.to_string()
}

/// Maximum number of body bytes carried in a generic [`DistributionError::Transport`] (§4.4.2).
const STATUS_BODY_EXCERPT_LIMIT: usize = 1024;

fn classify_hf_status(status: StatusCode, repository: &str, body_excerpt: &str) -> DistributionError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            DistributionError::Unauthorized(repository.to_string())
        }
        StatusCode::NOT_FOUND => DistributionError::NotFound(repository.to_string()),
        StatusCode::TOO_MANY_REQUESTS => DistributionError::RateLimited(repository.to_string()),
        other => DistributionError::Transport(format!(
            "{repository}: unexpected status {other}: {body_excerpt}"
        )),
    }
}

/// Reads up to [`STATUS_BODY_EXCERPT_LIMIT`] bytes of `response`'s body, for the diagnostic
/// excerpt a generic status-classification error carries. Never fails: a body read error just
/// yields an empty excerpt rather than masking the status-code error it was meant to enrich.
async fn read_body_excerpt(response: reqwest::Response) -> String {
    match response.bytes().await {
        Ok(bytes) => {
            let limit = bytes.len().min(STATUS_BODY_EXCERPT_LIMIT);
            String::from_utf8_lossy(&bytes[..limit]).into_owned()
        }
        Err(_) => String::new(),
    }
}

fn synthetic_descriptor(file: &RepoFile) -> DistributionResult<Descriptor> {
    let digest_str = file
        .sha256
        .as_ref()
        .map(|sha| format!("sha256:{sha}"))
        .ok_or_else(|| {
            DistributionError::UnsupportedMediaType(format!(
                "{}: not an LFS-tracked file, cannot be content-addressed",
                file.path
            ))
        })?;

    let descriptor = DescriptorBuilder::default()
        .media_type(MediaType::Other(MODEL_LAYER_MEDIA_TYPE.to_string()))
        .digest(digest_str.parse::<oci_spec::image::Digest>().map_err(DistributionError::custom)?)
        .size(file.size)
        .annotations(filename_annotation(&file.path))
        .build()
        .map_err(DistributionError::custom)?;

    std::result::Result::Ok(descriptor)
}

/// The standard OCI title annotation, which `ModelBundle::materialize` reads back to name the
/// materialized file on disk instead of falling back to the bare digest hex.
fn filename_annotation(path: &str) -> HashMap<String, String> {
    HashMap::from([("org.opencontainers.image.title".to_string(), path.to_string())])
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl ArtifactSource for HuggingFaceSource {
    async fn resolve(&self, reference: &Reference) -> DistributionResult<ResolvedManifest> {
        let (weights, mmproj, auxiliary) = self.select_files(reference).await?;

        let mut layer_descriptors = Vec::new();
        for file in &weights {
            layer_descriptors.push(synthetic_descriptor(file)?);
        }
        if let Some(mmproj_file) = &mmproj {
            if mmproj_file.sha256.is_some() {
                layer_descriptors.push(synthetic_descriptor(mmproj_file)?);
            }
        }

        let revision = Self::revision_of(reference);
        if !auxiliary.is_empty() {
            tracing::debug!(
                repository = reference.get_repository(),
                count = auxiliary.len(),
                "including auxiliary config/tokenizer files"
            );
        }
        for file in &auxiliary {
            layer_descriptors.push(self.describe_auxiliary(reference, &revision, file).await?);
        }

        let config_data = Self::config_for(reference, &weights, &mmproj);
        let config_bytes = serde_json::to_vec(&config_data)?;
        let config_descriptor = DescriptorBuilder::default()
            .media_type(MediaType::Other(MODEL_CONFIG_MEDIA_TYPE.to_string()))
            .digest(
                digest_bytes(&config_bytes)
                    .parse::<oci_spec::image::Digest>()
                    .map_err(DistributionError::custom)?,
            )
            .size(config_bytes.len() as u64)
            .build()
            .map_err(DistributionError::custom)?;

        let manifest = ImageManifestBuilder::default()
            .schema_version(2u32)
            .config(config_descriptor)
            .layers(layer_descriptors)
            .build()
            .map_err(DistributionError::custom)?;

        let raw = serde_json::to_vec(&manifest)?;
        let digest = digest_bytes(&raw);

        tracing::debug!(repository = reference.get_repository(), digest, "synthetic manifest built");
        std::result::Result::Ok(ResolvedManifest { manifest, digest, raw })
    }

    /// Recomputes the synthetic config (§4.4.2) from the repository's current tree listing. The
    /// config is never a fetchable Hub object on its own, so a caller that only has the resolved
    /// manifest's digest (not the in-flight [`Self::resolve`] call) re-derives the same
    /// deterministic bytes this way rather than reading them back from the server.
    async fn fetch_config(&self, reference: &Reference, _config_digest: &str) -> DistributionResult<Bytes> {
        let (weights, mmproj, _auxiliary) = self.select_files(reference).await?;
        let config_data = Self::config_for(reference, &weights, &mmproj);
        std::result::Result::Ok(Bytes::from(serde_json::to_vec(&config_data)?))
    }

    async fn fetch_blob(
        &self,
        reference: &Reference,
        digest: &str,
        range: std::ops::Range<u64>,
    ) -> DistributionResult<BlobStream> {
        // The filename for this digest was stashed in the manifest's layer annotations during
        // `resolve`; the distribution client passes it through unchanged as part of the digest
        // key it already tracks, so here we simply re-derive the download URL from the last
        // resolved file list rather than keeping a redundant index in this source.
        let revision = Self::revision_of(reference);

        let files = self.list_files(reference.get_repository(), &revision).await?;
        if let Some(file) = files
            .iter()
            .find(|f| f.sha256.as_deref().map(|s| format!("sha256:{s}")).as_deref() == Some(digest))
        {
            let url = Self::resolve_url(&self.base_url, reference.get_repository(), &revision, &file.path);
            let auth = self.auth_header().await?;

            let mut request = self.client.get(&url);
            if let Some(auth) = &auth {
                request = request.header("Authorization", auth);
            }
            if range.start > 0 {
                request = request.header("Range", format!("bytes={}-", range.start));
            }

            let response = request.send().await?;
            let status = response.status();

            if range.start > 0 && status != StatusCode::PARTIAL_CONTENT {
                return Err(DistributionError::Interrupted(format!(
                    "huggingface did not honor range resume for {digest}"
                )));
            }
            if !status.is_success() && status != StatusCode::PARTIAL_CONTENT {
                let excerpt = read_body_excerpt(response).await;
                return Err(classify_hf_status(status, reference.get_repository(), &excerpt));
            }

            let stream = response.bytes_stream().map(|item| item.map_err(DistributionError::from));
            return std::result::Result::Ok(stream.boxed());
        }

        // Auxiliary files carry no LFS `oid` in the tree listing -- the digest requested here is
        // content-derived, computed when `resolve` fetched the file to build its descriptor -- so
        // matching it means re-fetching each candidate and comparing, not a listing lookup.
        for file in Self::select_auxiliary_files(&files) {
            let bytes = self.download_whole(reference, &revision, &file.path).await?;
            if digest_bytes(&bytes) != digest {
                continue;
            }
            let start = (range.start as usize).min(bytes.len());
            let sliced = bytes.slice(start..);
            return std::result::Result::Ok(stream::once(async move { std::result::Result::Ok(sliced) }).boxed());
        }

        Err(DistributionError::NotFound(digest.to_string()))
    }

    async fn push(
        &self,
        _reference: &Reference,
        _manifest: &ResolvedManifest,
        _blob_provider: &(dyn BlobProvider),
    ) -> DistributionResult<()> {
        Err(DistributionError::NotImplemented(
            "push is not supported against the huggingface hub source".to_string(),
        ))
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, size: u64, sha: Option<&str>) -> RepoFile {
        RepoFile {
            path: path.to_string(),
            size,
            sha256: sha.map(str::to_string),
        }
    }

    #[test]
    fn test_select_weight_files_prefers_quant_hint() {
        let files = vec![
            file("model-Q4_K_M.gguf", 100, Some("a".repeat(64).as_str())),
            file("model-Q8_0.gguf", 200, Some("b".repeat(64).as_str())),
        ];
        let selected = HuggingFaceSource::select_weight_files(&files, Some("Q4_K_M"));
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].path, "model-Q4_K_M.gguf");
    }

    #[test]
    fn test_select_weight_files_quant_hint_is_delimiter_bounded() {
        let files = vec![
            file("model-Q4_K_M.gguf", 100, Some("a".repeat(64).as_str())),
            file("model-Q4_K_S.gguf", 90, Some("b".repeat(64).as_str())),
        ];
        // "Q4_K" is a substring of both Q4_K_M and Q4_K_S, but a delimiter-bounded match
        // requires it to stand alone between separators, so neither file qualifies and
        // selection falls back to the first GGUF in listing order.
        let selected = HuggingFaceSource::select_weight_files(&files, Some("Q4_K"));
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].path, "model-Q4_K_M.gguf");
    }

    #[test]
    fn test_quant_hint_defaults_to_q4_k_m_on_latest_tag() {
        let reference = "huggingface.co/TheBloke/Llama-2-7B-GGUF:latest".parse::<Reference>().unwrap();
        assert_eq!(HuggingFaceSource::quant_hint(&reference).as_deref(), Some("Q4_K_M"));
    }

    #[test]
    fn test_quant_hint_uses_explicit_tag_verbatim() {
        let reference = "huggingface.co/TheBloke/Llama-2-7B-GGUF:Q8_0".parse::<Reference>().unwrap();
        assert_eq!(HuggingFaceSource::quant_hint(&reference).as_deref(), Some("Q8_0"));
    }

    #[test]
    fn test_select_weight_files_sorts_shards_numerically() {
        let files = vec![
            file("model-00010-of-00012.gguf", 10, Some("a".repeat(64).as_str())),
            file("model-00002-of-00012.gguf", 10, Some("b".repeat(64).as_str())),
            file("model-00001-of-00012.gguf", 10, Some("c".repeat(64).as_str())),
        ];
        let selected = HuggingFaceSource::select_weight_files(&files, Some("of-00012"));
        let ordered: Vec<&str> = selected.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            ordered,
            vec![
                "model-00001-of-00012.gguf",
                "model-00002-of-00012.gguf",
                "model-00010-of-00012.gguf",
            ]
        );
    }

    #[test]
    fn test_select_weight_files_falls_back_to_safetensors() {
        let files = vec![
            file("model.safetensors", 100, Some("a".repeat(64).as_str())),
            file("config.json", 1, None),
        ];
        let selected = HuggingFaceSource::select_weight_files(&files, None);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].path, "model.safetensors");
    }

    #[test]
    fn test_select_mmproj_prefers_f16_over_f32() {
        let files = vec![
            file("mmproj-model-f32.gguf", 10, Some("a".repeat(64).as_str())),
            file("mmproj-model-f16.gguf", 10, Some("b".repeat(64).as_str())),
        ];
        let chosen = HuggingFaceSource::select_mmproj(&files).unwrap();
        assert_eq!(chosen.path, "mmproj-model-f16.gguf");
    }

    #[test]
    fn test_select_mmproj_absent_returns_none() {
        let files = vec![file("model.gguf", 10, Some("a".repeat(64).as_str()))];
        assert!(HuggingFaceSource::select_mmproj(&files).is_none());
    }

    #[test]
    fn test_shard_sort_key_extracts_zero_padded_index() {
        assert_eq!(shard_sort_key("model-00002-of-00010.gguf"), "00002");
        assert_eq!(shard_sort_key("model.gguf"), "model.gguf");
    }

    #[test]
    fn test_select_auxiliary_files_matches_known_names_only() {
        let files = vec![
            file("model.gguf", 10, Some("a".repeat(64).as_str())),
            file("tokenizer.json", 5, None),
            file("config.json", 5, None),
            file("README.md", 5, None),
        ];
        let selected = HuggingFaceSource::select_auxiliary_files(&files);
        let names: Vec<&str> = selected.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"tokenizer.json"));
        assert!(names.contains(&"config.json"));
    }

    #[test]
    fn test_select_auxiliary_files_skips_lfs_tracked_matches() {
        // An LFS-tracked file sharing an auxiliary name is content-addressed through the normal
        // weight/layer path already and shouldn't be double-counted here.
        let files = vec![file("tokenizer.json", 5, Some("a".repeat(64).as_str()))];
        assert!(HuggingFaceSource::select_auxiliary_files(&files).is_empty());
    }

    #[test]
    fn test_resolve_url_format() {
        let url = HuggingFaceSource::resolve_url(HF_HUB_BASE, "TheBloke/Llama-2-7B-GGUF", "main", "model.gguf");
        assert_eq!(
            url,
            "https://huggingface.co/TheBloke/Llama-2-7B-GGUF/resolve/main/model.gguf"
        );
    }

    async fn mock_tree(server: &wiremock::MockServer, repository: &str) {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, ResponseTemplate};

        let entries = serde_json::json!([
            {"path": "model-Q4_K_M.gguf", "lfs": {"size": 128, "oid": "a".repeat(64)}},
            {"path": "tokenizer.json", "size": 32},
        ]);

        Mock::given(method("GET"))
            .and(path(format!("/api/models/{repository}/tree/main")))
            .respond_with(ResponseTemplate::new(200).set_body_json(&entries))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("/{repository}/resolve/main/tokenizer.json")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"{\"tokenizer\":true}".to_vec()))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_fetch_config_matches_resolve() {
        let server = wiremock::MockServer::start().await;
        mock_tree(&server, "TheBloke/Llama-2-7B-GGUF").await;

        let source = HuggingFaceSource::with_base_url(
            crate::keychain::Keychain::with_default_path(),
            1,
            server.uri(),
        );
        let reference = "huggingface.co/TheBloke/Llama-2-7B-GGUF:latest".parse::<Reference>().unwrap();

        let resolved = source.resolve(&reference).await.unwrap();
        let config_digest = resolved.manifest.config().digest().to_string();
        let refetched = source.fetch_config(&reference, &config_digest).await.unwrap();

        assert_eq!(digest_bytes(&refetched), config_digest);
    }

    #[tokio::test]
    async fn test_resolve_includes_auxiliary_layer_with_title_annotation() {
        let server = wiremock::MockServer::start().await;
        mock_tree(&server, "TheBloke/Llama-2-7B-GGUF").await;

        let source = HuggingFaceSource::with_base_url(
            crate::keychain::Keychain::with_default_path(),
            1,
            server.uri(),
        );
        let reference = "huggingface.co/TheBloke/Llama-2-7B-GGUF:latest".parse::<Reference>().unwrap();

        let resolved = source.resolve(&reference).await.unwrap();
        assert_eq!(resolved.manifest.layers().len(), 2);

        let tokenizer_layer = resolved
            .manifest
            .layers()
            .iter()
            .find(|l| l.size() == "{\"tokenizer\":true}".len() as u64)
            .expect("tokenizer.json layer present");
        let title = tokenizer_layer
            .annotations()
            .as_ref()
            .and_then(|a| a.get("org.opencontainers.image.title"))
            .expect("title annotation present");
        assert_eq!(title, "tokenizer.json");
    }

    #[tokio::test]
    async fn test_fetch_blob_serves_auxiliary_file_by_content_digest() {
        let server = wiremock::MockServer::start().await;
        mock_tree(&server, "TheBloke/Llama-2-7B-GGUF").await;

        let source = HuggingFaceSource::with_base_url(
            crate::keychain::Keychain::with_default_path(),
            1,
            server.uri(),
        );
        let reference = "huggingface.co/TheBloke/Llama-2-7B-GGUF:latest".parse::<Reference>().unwrap();

        let content = b"{\"tokenizer\":true}";
        let digest = digest_bytes(content);

        let mut stream = source.fetch_blob(&reference, &digest, 0..content.len() as u64).await.unwrap();
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, content);
    }
}
