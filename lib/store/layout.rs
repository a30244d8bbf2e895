//! Path helpers for the store's on-disk layout (§6.1): a flat sha256 file tree, not an
//! IPLD/CID block graph, so every path is derived from a plain digest or reference string.

use std::path::{Path, PathBuf};

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::{
    error::{DistributionError, DistributionResult},
    utils::hex_of_digest,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const BLOBS_DIR: &str = "blobs/sha256";
const INCOMPLETE_DIR: &str = "incomplete/sha256";
const MANIFESTS_DIR: &str = "manifests/sha256";
const TAGS_DIR: &str = "tags";

/// Characters percent-encoded in a tag filename beyond the control-character default: the
/// reference separators `/`, `:`, `@` would otherwise collide with filesystem path segments.
const TAG_ENCODE_SET: &AsciiSet = &CONTROLS.add(b'/').add(b':').add(b'@').add(b'%');

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the committed-blob path for `digest` (`sha256:<hex>`).
pub fn blob_path(root: &Path, digest: &str) -> DistributionResult<PathBuf> {
    Ok(root.join(BLOBS_DIR).join(hex_component(digest)?))
}

/// Returns the in-progress blob path for `diff_id`.
pub fn incomplete_path(root: &Path, diff_id: &str) -> DistributionResult<PathBuf> {
    Ok(root.join(INCOMPLETE_DIR).join(hex_component(diff_id)?))
}

/// Returns the manifest path for `digest`.
pub fn manifest_path(root: &Path, digest: &str) -> DistributionResult<PathBuf> {
    Ok(root.join(MANIFESTS_DIR).join(hex_component(digest)?))
}

/// Returns the tag-file path for a reference string.
pub fn tag_path(root: &Path, reference: &str) -> PathBuf {
    let encoded = utf8_percent_encode(reference, TAG_ENCODE_SET).to_string();
    root.join(TAGS_DIR).join(encoded)
}

/// Recovers the original reference string from a tag filename.
pub fn decode_tag_filename(filename: &str) -> DistributionResult<String> {
    percent_decode_str(filename)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| DistributionError::StoreCorruption(format!("malformed tag filename {filename}: {e}")))
}

/// The four top-level directories the store creates on initialization.
pub fn top_level_dirs(root: &Path) -> [PathBuf; 4] {
    [
        root.join(BLOBS_DIR),
        root.join(INCOMPLETE_DIR),
        root.join(MANIFESTS_DIR),
        root.join(TAGS_DIR),
    ]
}

fn hex_component(digest: &str) -> DistributionResult<&str> {
    hex_of_digest(digest).ok_or_else(|| {
        DistributionError::StoreCorruption(format!("not a valid sha256 digest: {digest}"))
    })
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_path_layout() {
        let digest = format!("sha256:{}", "a".repeat(64));
        let path = blob_path(Path::new("/store"), &digest).unwrap();
        assert_eq!(path, Path::new("/store/blobs/sha256").join("a".repeat(64)));
    }

    #[test]
    fn test_blob_path_rejects_malformed_digest() {
        assert!(blob_path(Path::new("/store"), "not-a-digest").is_err());
    }

    #[test]
    fn test_tag_path_encodes_separators() {
        let path = tag_path(Path::new("/store"), "registry.local/ai/mymodel:latest");
        let filename = path.file_name().unwrap().to_str().unwrap();
        assert!(!filename.contains('/'));
        assert_eq!(decode_tag_filename(filename).unwrap(), "registry.local/ai/mymodel:latest");
    }

    #[test]
    fn test_tag_round_trips_through_encode_decode() {
        let reference = "huggingface.co/TheBloke/Llama-2-7B-GGUF:Q4_K_M";
        let path = tag_path(Path::new("/store"), reference);
        let filename = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(decode_tag_filename(filename).unwrap(), reference);
    }
}
