//! The content-addressed local store (§4.5): blobs and manifests keyed by digest, a tag index
//! mapping reference strings to manifest digests, and an incomplete-download sidecar that makes
//! interrupted layer fetches resumable.

pub mod bundle;
mod layout;

use std::path::{Path, PathBuf};

use futures::StreamExt;
use oci_spec::image::ImageConfiguration;
use tokio::{
    fs::{self, File, OpenOptions},
    io::AsyncWriteExt,
};

use crate::{
    concurrency::{DigestLockTable, TagIndexLock},
    error::{DistributionError, DistributionResult},
    source::BlobStream,
    utils::{digest_bytes, StreamingDigest},
};

pub use bundle::ModelBundle;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// One effect of a tag-mutating operation, so callers (and progress events) can report exactly
/// what happened rather than inferring it from before/after state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagAction {
    /// A tag was removed from the index; the manifest it pointed at may still exist.
    Untagged(String),
    /// A manifest and its now-unreferenced blobs were removed from the store.
    Deleted(String),
}

/// The content-addressed local store rooted at a single directory (§6.1).
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    digest_locks: DigestLockTable,
    tag_lock: TagIndexLock,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LocalStore {
    /// Opens (creating if necessary) a store rooted at `root`.
    pub async fn new(root: impl Into<PathBuf>) -> DistributionResult<Self> {
        let root = root.into();
        for dir in layout::top_level_dirs(&root) {
            fs::create_dir_all(&dir).await?;
        }
        Ok(Self {
            root,
            digest_locks: DigestLockTable::default(),
            tag_lock: TagIndexLock::default(),
        })
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns `true` if a committed blob exists for `digest`.
    pub async fn blob_exists(&self, digest: &str) -> bool {
        match layout::blob_path(&self.root, digest) {
            Ok(path) => fs::metadata(path).await.is_ok(),
            Err(_) => false,
        }
    }

    /// Returns `true` if a manifest exists for `digest`.
    pub async fn manifest_exists(&self, digest: &str) -> bool {
        match layout::manifest_path(&self.root, digest) {
            Ok(path) => fs::metadata(path).await.is_ok(),
            Err(_) => false,
        }
    }

    /// The current size, in bytes, of an in-progress blob download keyed by `diff_id` — `0` if
    /// no such partial download exists (§4.5 write algorithm, step 1).
    pub async fn incomplete_size(&self, diff_id: &str) -> DistributionResult<u64> {
        let path = layout::incomplete_path(&self.root, diff_id)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads the full committed blob at `digest` into memory. Used for small blobs (configs);
    /// layer content is served via [`Self::blob_path`] instead.
    pub async fn read_blob(&self, digest: &str) -> DistributionResult<Vec<u8>> {
        let path = layout::blob_path(&self.root, digest)?;
        fs::read(path)
            .await
            .map_err(|e| map_missing(e, format!("blob {digest}")))
    }

    /// The committed path of the blob at `digest`, for callers that want to stream or hard-link
    /// it directly rather than buffering it (e.g. [`bundle::ModelBundle`]).
    pub fn blob_path(&self, digest: &str) -> DistributionResult<PathBuf> {
        layout::blob_path(&self.root, digest)
    }

    /// Reads a manifest's raw bytes.
    pub async fn read_manifest(&self, digest: &str) -> DistributionResult<Vec<u8>> {
        let path = layout::manifest_path(&self.root, digest)?;
        fs::read(path)
            .await
            .map_err(|e| map_missing(e, format!("manifest {digest}")))
    }

    /// Commits a manifest's raw bytes, keyed by their own digest. Idempotent: writing the same
    /// bytes twice is a no-op the second time.
    pub async fn write_manifest(&self, raw: &[u8]) -> DistributionResult<String> {
        let digest = digest_bytes(raw);
        let path = layout::manifest_path(&self.root, &digest)?;
        if fs::metadata(&path).await.is_ok() {
            return Ok(digest);
        }
        write_atomically(&path, raw).await?;
        Ok(digest)
    }

    /// Commits a small, already-in-memory blob (a model config) directly, without going through
    /// the incomplete-sidecar dance [`Self::write_blob`] uses for streamed layer content.
    pub async fn write_blob_bytes(&self, raw: &[u8]) -> DistributionResult<String> {
        let digest = digest_bytes(raw);
        let path = layout::blob_path(&self.root, &digest)?;
        if fs::metadata(&path).await.is_ok() {
            return Ok(digest);
        }
        write_atomically(&path, raw).await?;
        Ok(digest)
    }

    /// Writes a blob's content, resuming a prior partial download when `resume_offset > 0` and
    /// committing it atomically under `expected_digest` once the full content hashes correctly
    /// (§4.5 write algorithm).
    ///
    /// `diff_id` keys the in-progress sidecar entry (stable across compression/media-type
    /// changes); `expected_digest` is the digest the *finished* transfer must hash to, which the
    /// committed blob is filed under.
    ///
    /// On a hash mismatch the incomplete file is removed ([`DistributionError::Integrity`] is
    /// not resumable). On a stream failure before EOF the incomplete file is left in place
    /// ([`DistributionError::Interrupted`] is resumable).
    pub async fn write_blob(
        &self,
        diff_id: &str,
        expected_digest: &str,
        resume_offset: u64,
        mut stream: BlobStream,
    ) -> DistributionResult<u64> {
        let _guard = self.digest_locks.lock(expected_digest).await;
        let incomplete_path = layout::incomplete_path(&self.root, diff_id)?;
        if let Some(parent) = incomplete_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut hasher = StreamingDigest::new();
        let mut file = if resume_offset > 0 {
            let existing = fs::read(&incomplete_path).await?;
            hasher.update(&existing);
            OpenOptions::new().append(true).open(&incomplete_path).await?
        } else {
            File::create(&incomplete_path).await?
        };

        let mut written = resume_offset;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                DistributionError::Interrupted(format!("blob stream for {diff_id} broke: {e}"))
            })?;
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        let computed = hasher.finalize_to_digest_string();
        if computed != expected_digest {
            tracing::error!(diff_id, expected_digest, computed, "blob failed integrity check");
            fs::remove_file(&incomplete_path).await.ok();
            return Err(DistributionError::Integrity(
                diff_id.to_string(),
                expected_digest.to_string(),
                computed,
            ));
        }

        let blob_path = layout::blob_path(&self.root, expected_digest)?;
        if let Some(parent) = blob_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&incomplete_path, &blob_path).await?;
        tracing::debug!(digest = expected_digest, written, "blob committed");
        Ok(written)
    }

    /// Commits a blob whose bytes already live in `blob_path`'s tree without touching the
    /// incomplete sidecar at all — used by [`Self::write_lightweight`], where layers are known to
    /// already be present and only the manifest/config are new.
    pub async fn assert_blob_present(&self, digest: &str) -> DistributionResult<()> {
        if self.blob_exists(digest).await {
            Ok(())
        } else {
            Err(DistributionError::Conflict(format!(
                "lightweight write referenced layer {digest}, which is not present in the store"
            )))
        }
    }

    /// Resolves `reference` to the manifest digest it currently points at, if tagged.
    pub async fn resolve_tag(&self, reference: &str) -> DistributionResult<Option<String>> {
        let _guard = self.tag_lock.read().await;
        let path = layout::tag_path(&self.root, reference);
        match fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolves a bare content ID (a 12- or 64-char lowercase hex string, or `sha256:<64-hex>`)
    /// to the one manifest digest it prefixes, by scanning `manifests/sha256/` (§4.1 step 2).
    ///
    /// Returns `None` when nothing matches or when the prefix is ambiguous (matches more than
    /// one manifest); callers fall back to treating `id` as an unresolved ID-only reference.
    pub async fn resolve_id(&self, id: &str) -> DistributionResult<Option<String>> {
        let prefix = id.strip_prefix("sha256:").unwrap_or(id).to_ascii_lowercase();
        let manifests_dir = self.root.join("manifests").join("sha256");
        let mut entries = fs::read_dir(&manifests_dir).await?;
        let mut matches = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name();
            let hex = filename.to_string_lossy().into_owned();
            if hex.starts_with(&prefix) {
                matches.push(hex);
            }
        }
        match matches.len() {
            1 => Ok(Some(format!("sha256:{}", matches[0]))),
            _ => Ok(None),
        }
    }

    /// Lists every `(reference, digest)` pair currently in the tag index.
    pub async fn list_tags(&self) -> DistributionResult<Vec<(String, String)>> {
        let _guard = self.tag_lock.read().await;
        let tags_dir = self.root.join("tags");
        let mut entries = fs::read_dir(&tags_dir).await?;
        let mut result = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name();
            let filename = filename.to_string_lossy();
            let reference = layout::decode_tag_filename(&filename)?;
            let digest = fs::read_to_string(entry.path()).await?.trim().to_string();
            result.push((reference, digest));
        }
        Ok(result)
    }

    /// Points `tags` at `digest`, overwriting any existing mapping for those reference strings.
    pub async fn add_tags(&self, digest: &str, tags: &[String]) -> DistributionResult<()> {
        if !self.manifest_exists(digest).await {
            return Err(DistributionError::NotFound(format!(
                "cannot tag unknown manifest {digest}"
            )));
        }
        let _guard = self.tag_lock.write().await;
        for tag in tags {
            let path = layout::tag_path(&self.root, tag);
            write_atomically(&path, digest.as_bytes()).await?;
        }
        Ok(())
    }

    /// Removes `tags` from the index; tags that were not present are silently skipped.
    pub async fn remove_tags(&self, tags: &[String]) -> DistributionResult<Vec<TagAction>> {
        let _guard = self.tag_lock.write().await;
        let mut actions = Vec::new();
        for tag in tags {
            let path = layout::tag_path(&self.root, tag);
            match fs::remove_file(&path).await {
                Ok(()) => actions.push(TagAction::Untagged(tag.clone())),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(actions)
    }

    /// Deletes the model identified by `reference_or_digest` (a tag reference string, or a bare
    /// manifest digest/ID already resolved to one).
    ///
    /// Deleting by tag when other tags still reference the same manifest only drops that one
    /// tag, no force needed. Deleting by a bare ID/digest, or the last remaining tag, actually
    /// removes the manifest, and fails with [`DistributionError::Conflict`] if more than one tag
    /// still points at it unless `force` is set.
    ///
    /// A removal that proceeds also removes any `incomplete/sha256/<hex>` sidecar entries keyed
    /// by a diff-id that belonged only to this model (resolved open question, see DESIGN.md).
    pub async fn delete(
        &self,
        reference_or_digest: &str,
        force: bool,
    ) -> DistributionResult<Vec<TagAction>> {
        let by_id_or_digest = crate::utils::hex_of_digest(reference_or_digest).is_some();
        let digest = if by_id_or_digest {
            reference_or_digest.to_string()
        } else {
            self.resolve_tag(reference_or_digest).await?.ok_or_else(|| {
                DistributionError::NotFound(format!("no such tag: {reference_or_digest}"))
            })?
        };

        let _guard = self.tag_lock.write().await;
        let tags_dir = self.root.join("tags");
        let mut referencing = Vec::new();
        let mut entries = fs::read_dir(&tags_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let contents = fs::read_to_string(entry.path()).await?;
            if contents.trim() == digest {
                let filename = entry.file_name();
                referencing.push(layout::decode_tag_filename(&filename.to_string_lossy())?);
            }
        }

        // Deleting by tag when other tags still point at the manifest only drops that one
        // tag: untagging never needs force. Force only gates the path that actually removes
        // the manifest, which happens when the caller named a bare ID/digest, or named the
        // last remaining tag.
        if !by_id_or_digest && referencing.len() > 1 {
            let tag_path = layout::tag_path(&self.root, reference_or_digest);
            fs::remove_file(&tag_path).await.ok();
            return Ok(vec![TagAction::Untagged(reference_or_digest.to_string())]);
        }

        if referencing.len() > 1 && !force {
            tracing::warn!(digest, tags = referencing.len(), "delete rejected without force");
            return Err(DistributionError::Conflict(format!(
                "{digest} is referenced by {} tags; pass force to delete anyway",
                referencing.len()
            )));
        }

        let mut actions = Vec::new();
        for tag in &referencing {
            fs::remove_file(layout::tag_path(&self.root, tag)).await.ok();
            actions.push(TagAction::Untagged(tag.clone()));
        }

        let diff_ids_to_drop = self.diff_ids_unique_to(&digest).await?;
        for diff_id in diff_ids_to_drop {
            if let Ok(path) = layout::incomplete_path(&self.root, &diff_id) {
                fs::remove_file(path).await.ok();
            }
        }

        let manifest_path = layout::manifest_path(&self.root, &digest)?;
        fs::remove_file(&manifest_path).await.ok();
        tracing::info!(digest, "manifest deleted");
        actions.push(TagAction::Deleted(digest));

        Ok(actions)
    }

    /// Writes a manifest whose layers are asserted to already be present in the store, without
    /// any blob bytes crossing the store boundary (§4.5 `WriteLightweight`).
    pub async fn write_lightweight(&self, manifest_raw: &[u8]) -> DistributionResult<String> {
        let manifest: oci_spec::image::ImageManifest = serde_json::from_slice(manifest_raw)?;
        for layer in manifest.layers() {
            self.assert_blob_present(&layer.digest().to_string()).await?;
        }
        self.assert_blob_present(&manifest.config().digest().to_string()).await?;
        self.write_manifest(manifest_raw).await
    }

    /// Removes and recreates the store root, discarding every blob, manifest, tag, and
    /// in-progress download.
    pub async fn reset(&self) -> DistributionResult<()> {
        let _tag_guard = self.tag_lock.write().await;
        fs::remove_dir_all(&self.root).await.ok();
        for dir in layout::top_level_dirs(&self.root) {
            fs::create_dir_all(&dir).await?;
        }
        Ok(())
    }

    /// Computes the diff-ids used by `digest`'s config that no other manifest in the store still
    /// references, so [`Self::delete`] can clear their incomplete sidecar entries.
    async fn diff_ids_unique_to(&self, digest: &str) -> DistributionResult<Vec<String>> {
        let target_diff_ids = match self.config_diff_ids(digest).await {
            Ok(ids) => ids,
            Err(_) => return Ok(Vec::new()),
        };
        if target_diff_ids.is_empty() {
            return Ok(Vec::new());
        }

        let manifests_dir = self.root.join("manifests/sha256");
        let mut entries = fs::read_dir(&manifests_dir).await?;
        let mut still_referenced = std::collections::HashSet::new();
        while let Some(entry) = entries.next_entry().await? {
            let hex = entry.file_name().to_string_lossy().to_string();
            let other_digest = format!("sha256:{hex}");
            if other_digest == digest {
                continue;
            }
            if let Ok(ids) = self.config_diff_ids(&other_digest).await {
                still_referenced.extend(ids);
            }
        }

        Ok(target_diff_ids
            .into_iter()
            .filter(|id| !still_referenced.contains(id))
            .collect())
    }

    async fn config_diff_ids(&self, manifest_digest: &str) -> DistributionResult<Vec<String>> {
        let raw = self.read_manifest(manifest_digest).await?;
        let manifest: oci_spec::image::ImageManifest = serde_json::from_slice(&raw)?;
        let config_digest = manifest.config().digest().to_string();
        let config_raw = self.read_blob(&config_digest).await?;
        let config: ImageConfiguration = serde_json::from_slice(&config_raw)?;
        Ok(config
            .root_fs()
            .diff_ids()
            .iter()
            .map(|d| d.to_string())
            .collect())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Writes `contents` to `path` via a temp file in the same directory, then renames over the
/// target, so a crash mid-write never leaves a half-written tag or manifest file visible.
async fn write_atomically(path: &Path, contents: &[u8]) -> DistributionResult<()> {
    let parent = path.parent().ok_or_else(|| {
        DistributionError::StoreCorruption(format!("path has no parent: {}", path.display()))
    })?;
    fs::create_dir_all(parent).await?;
    let tmp_path = parent.join(format!(".tmp-{}", uuid_like()));
    fs::write(&tmp_path, contents).await?;
    fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// A filesystem-safe unique suffix for temp files, without pulling in a `uuid` dependency.
fn uuid_like() -> String {
    let digest = digest_bytes(
        format!("{:?}-{}", std::thread::current().id(), std::process::id()).as_bytes(),
    );
    digest.trim_start_matches("sha256:")[..16].to_string()
}

fn map_missing(e: std::io::Error, what: String) -> DistributionError {
    if e.kind() == std::io::ErrorKind::NotFound {
        DistributionError::NotFound(what)
    } else {
        e.into()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;

    fn bytes_stream(chunks: Vec<&'static [u8]>) -> BlobStream {
        Box::pin(stream::iter(
            chunks.into_iter().map(|c| Ok(Bytes::from_static(c))),
        ))
    }

    #[tokio::test]
    async fn test_write_blob_commits_on_matching_digest() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).await.unwrap();

        let data: &[u8] = b"hello model bytes";
        let digest = digest_bytes(data);
        let written = store
            .write_blob("diff-1", &digest, 0, bytes_stream(vec![data]))
            .await
            .unwrap();

        assert_eq!(written, data.len() as u64);
        assert!(store.blob_exists(&digest).await);
        assert_eq!(store.incomplete_size("diff-1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_write_blob_rejects_mismatched_digest_and_clears_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).await.unwrap();

        let wrong_digest = format!("sha256:{}", "0".repeat(64));
        let err = store
            .write_blob("diff-2", &wrong_digest, 0, bytes_stream(vec![b"nope"]))
            .await
            .unwrap_err();

        assert!(matches!(err, DistributionError::Integrity(..)));
        assert_eq!(store.incomplete_size("diff-2").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_write_blob_resumes_from_offset() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).await.unwrap();

        let full: &[u8] = b"0123456789abcdef";
        let digest = digest_bytes(full);

        // Simulate a prior partial write by writing the prefix directly into incomplete/.
        let incomplete = layout::incomplete_path(dir.path(), "diff-3").unwrap();
        fs::create_dir_all(incomplete.parent().unwrap()).await.unwrap();
        fs::write(&incomplete, &full[..8]).await.unwrap();

        let resumed = store
            .write_blob("diff-3", &digest, 8, bytes_stream(vec![&full[8..]]))
            .await
            .unwrap();

        assert_eq!(resumed, full.len() as u64);
        assert!(store.blob_exists(&digest).await);
        assert_eq!(store.read_blob(&digest).await.unwrap(), full);
    }

    #[tokio::test]
    async fn test_write_blob_interrupted_stream_preserves_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).await.unwrap();

        let broken: BlobStream = Box::pin(stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(DistributionError::Transport("connection reset".into())),
        ]));

        let digest = format!("sha256:{}", "1".repeat(64));
        let err = store.write_blob("diff-4", &digest, 0, broken).await.unwrap_err();

        assert!(matches!(err, DistributionError::Interrupted(_)));
        assert_eq!(store.incomplete_size("diff-4").await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_manifest_write_is_idempotent_and_content_addressed() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).await.unwrap();

        let raw = br#"{"schemaVersion":2}"#;
        let d1 = store.write_manifest(raw).await.unwrap();
        let d2 = store.write_manifest(raw).await.unwrap();
        assert_eq!(d1, d2);
        assert!(store.manifest_exists(&d1).await);
    }

    #[tokio::test]
    async fn test_tag_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).await.unwrap();

        let raw = br#"{"schemaVersion":2}"#;
        let digest = store.write_manifest(raw).await.unwrap();

        store
            .add_tags(&digest, &["myorg/mymodel:latest".to_string()])
            .await
            .unwrap();
        assert_eq!(
            store.resolve_tag("myorg/mymodel:latest").await.unwrap(),
            Some(digest.clone())
        );

        let actions = store
            .remove_tags(&["myorg/mymodel:latest".to_string()])
            .await
            .unwrap();
        assert_eq!(actions, vec![TagAction::Untagged("myorg/mymodel:latest".to_string())]);
        assert_eq!(store.resolve_tag("myorg/mymodel:latest").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_by_tag_untags_without_force_when_multiply_tagged() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).await.unwrap();

        let raw = br#"{"schemaVersion":2}"#;
        let digest = store.write_manifest(raw).await.unwrap();
        store
            .add_tags(
                &digest,
                &["myorg/mymodel:latest".to_string(), "myorg/mymodel:v1".to_string()],
            )
            .await
            .unwrap();

        let actions = store.delete("myorg/mymodel:latest", false).await.unwrap();
        assert_eq!(actions, vec![TagAction::Untagged("myorg/mymodel:latest".to_string())]);
        assert_eq!(store.resolve_tag("myorg/mymodel:latest").await.unwrap(), None);
        assert!(store.manifest_exists(&digest).await);
        assert_eq!(store.resolve_tag("myorg/mymodel:v1").await.unwrap(), Some(digest.clone()));
    }

    #[tokio::test]
    async fn test_delete_by_digest_requires_force_when_multiply_tagged() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).await.unwrap();

        let raw = br#"{"schemaVersion":2}"#;
        let digest = store.write_manifest(raw).await.unwrap();
        store
            .add_tags(
                &digest,
                &["myorg/mymodel:latest".to_string(), "myorg/mymodel:v1".to_string()],
            )
            .await
            .unwrap();

        let err = store.delete(&digest, false).await.unwrap_err();
        assert!(matches!(err, DistributionError::Conflict(_)));

        let actions = store.delete(&digest, true).await.unwrap();
        assert!(actions.contains(&TagAction::Deleted(digest.clone())));
        assert!(!store.manifest_exists(&digest).await);
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).await.unwrap();

        let raw = br#"{"schemaVersion":2}"#;
        let digest = store.write_manifest(raw).await.unwrap();
        store.reset().await.unwrap();

        assert!(!store.manifest_exists(&digest).await);
        assert!(store.list_tags().await.unwrap().is_empty());
    }
}
