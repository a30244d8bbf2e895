//! Parsing and normalization of model references (`registry/repository:tag`, digests, and
//! short content IDs) into a canonical [`Reference`] value.

use std::{fmt, str::FromStr, sync::LazyLock};

use getset::{Getters, Setters};
use oci_spec::image::Digest;
use regex::Regex;

use crate::{
    config::{DEFAULT_REFERENCE_TAG, DEFAULT_REGISTRY, DEFAULT_REPO_NAMESPACE},
    error::DistributionError,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Hostnames that the Docker Hub registry is reachable under; all normalize to
/// [`CANONICAL_DOCKER_HUB_REGISTRY`].
const DOCKER_HUB_ALIASES: &[&str] = &["docker.io", "registry-1.docker.io", "index.docker.io"];

/// The canonical Docker Hub registry hostname.
const CANONICAL_DOCKER_HUB_REGISTRY: &str = "index.docker.io";

/// Hostnames that identify a HuggingFace Hub reference rather than an OCI one.
const HUGGINGFACE_HOSTS: &[&str] = &["huggingface.co", "hf.co"];

static REGISTRY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9.-]+(:[0-9]+)?$").unwrap());

static OCI_REPOSITORY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-z0-9]+(?:[._-][a-z0-9]+)*)(/[a-z0-9]+(?:[._-][a-z0-9]+)*)*$").unwrap());

static HF_REPOSITORY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*(/[A-Za-z0-9][A-Za-z0-9._-]*)*$").unwrap());

static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\w[\w.-]{0,127}$").unwrap());

static SHORT_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-f0-9]{12}$|^[a-f0-9]{64}$").unwrap());

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A fully parsed and normalized model reference.
///
/// A reference is either a `registry/repository` pair combined with a tag and/or digest, or a
/// bare content ID (a digest or a short/long hex prefix of one) with no registry context. The
/// `original` string is preserved verbatim because HuggingFace repository paths are
/// case-sensitive and must never be run back through OCI-style lowercasing.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Setters)]
#[getset(get = "pub with_prefix", set = "pub with_prefix")]
pub struct Reference {
    /// The registry hostname, or the empty string for a bare-ID reference.
    registry: String,

    /// The repository path, or the empty string for a bare-ID reference.
    repository: String,

    /// The tag, digest, or short ID selecting a specific manifest.
    selector: ReferenceSelector,

    /// The original string the reference was parsed from, before any normalization.
    original: String,

    /// Whether this reference addresses the HuggingFace Hub native protocol rather than an
    /// OCI Distribution registry.
    huggingface: bool,
}

/// The part of a [`Reference`] that selects a specific manifest within a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceSelector {
    /// A tag, with an optional pinned digest (`repo:tag@sha256:...`).
    Tag {
        /// The tag string.
        tag: String,
        /// An optional digest pinning the tag to a specific manifest.
        digest: Option<Digest>,
    },

    /// A bare digest (`repo@sha256:...`), with no tag.
    Digest(Digest),

    /// A short (12 hex chars) or long (64 hex chars) content-ID prefix with no registry
    /// context; resolved against the local store by the distribution client.
    ShortId(String),
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Reference {
    /// Parses `s`, using `default_registry` in place of the built-in default when the input
    /// string does not specify a registry.
    pub fn parse_with_default_registry(
        s: &str,
        default_registry: &str,
    ) -> Result<Self, DistributionError> {
        parse(s, default_registry)
    }

    /// Returns `true` if this reference carries a digest (either as the sole selector or
    /// pinning a tag).
    pub fn has_digest(&self) -> bool {
        matches!(
            self.selector,
            ReferenceSelector::Digest(_) | ReferenceSelector::Tag { digest: Some(_), .. }
        )
    }

    /// Returns `true` if this reference has no registry/repository context and must be
    /// resolved as a content ID against the local store.
    pub fn is_id_only(&self) -> bool {
        matches!(self.selector, ReferenceSelector::ShortId(_))
    }
}

impl ReferenceSelector {
    /// Creates a tag selector with no pinned digest.
    pub fn tag(tag: impl Into<String>) -> Self {
        Self::Tag {
            tag: tag.into(),
            digest: None,
        }
    }

    /// Creates a tag selector pinned to a digest.
    pub fn tag_with_digest(tag: impl Into<String>, digest: impl Into<Digest>) -> Self {
        Self::Tag {
            tag: tag.into(),
            digest: Some(digest.into()),
        }
    }

    /// Creates a bare-digest selector.
    pub fn digest(digest: impl Into<Digest>) -> Self {
        Self::Digest(digest.into())
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl FromStr for Reference {
    type Err = DistributionError;

    /// Parses a reference string using the built-in default registry.
    ///
    /// See [`Reference::parse_with_default_registry`] to supply a different default.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s, DEFAULT_REGISTRY)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_id_only() {
            return match &self.selector {
                ReferenceSelector::ShortId(id) => write!(f, "{}", id),
                _ => unreachable!("is_id_only implies ShortId"),
            };
        }

        write!(f, "{}/{}", self.registry, self.repository)?;
        match &self.selector {
            ReferenceSelector::Tag {
                tag,
                digest: Some(d),
            } => write!(f, ":{}@{}", tag, d),
            ReferenceSelector::Tag { tag, digest: None } => write!(f, ":{}", tag),
            ReferenceSelector::Digest(d) => write!(f, "@{}", d),
            ReferenceSelector::ShortId(_) => unreachable!("handled above"),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn parse(s: &str, default_registry: &str) -> Result<Reference, DistributionError> {
    let original = s.to_string();
    let s = s.trim();

    if s.is_empty() {
        return Err(DistributionError::ReferenceInvalid(
            original,
            "input string is empty".into(),
        ));
    }

    if !s.contains('/') && !s.contains('@') {
        if SHORT_ID_REGEX.is_match(s) {
            return std::result::Result::Ok(Reference {
                registry: String::new(),
                repository: String::new(),
                selector: ReferenceSelector::ShortId(s.to_string()),
                original,
                huggingface: false,
            });
        }
        if let Some(hex) = s.strip_prefix("sha256:") {
            if hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return std::result::Result::Ok(Reference {
                    registry: String::new(),
                    repository: String::new(),
                    selector: ReferenceSelector::ShortId(s.to_string()),
                    original,
                    huggingface: false,
                });
            }
        }
    }

    if let Some(at_idx) = s.find('@') {
        let potential_digest = &s[at_idx + 1..];
        if !potential_digest.contains(':') {
            return Err(DistributionError::ReferenceInvalid(
                original,
                format!("invalid digest: {}", potential_digest),
            ));
        }

        let (pre, digest_part) = s.split_at(at_idx);
        let digest_str = &digest_part[1..];
        let parsed_digest = digest_str.parse::<Digest>().map_err(|e| {
            DistributionError::ReferenceInvalid(original.clone(), format!("invalid digest: {}", e))
        })?;

        let (registry, remainder) = extract_registry_and_path(pre, default_registry);
        let huggingface = is_huggingface_registry(&registry);
        let (repository, tag) = extract_repository_and_tag(remainder, huggingface)?;

        validate_registry(&registry, &original)?;
        validate_repository(&repository, huggingface, &original)?;
        validate_tag(&tag, &original)?;

        let registry = normalize_registry_host(&registry);

        std::result::Result::Ok(Reference {
            registry,
            repository,
            selector: ReferenceSelector::tag_with_digest(tag, parsed_digest),
            original,
            huggingface,
        })
    } else {
        let (registry, remainder) = extract_registry_and_path(s, default_registry);
        let huggingface = is_huggingface_registry(&registry);
        let (repository, tag) = extract_repository_and_tag(remainder, huggingface)?;

        validate_registry(&registry, &original)?;
        validate_repository(&repository, huggingface, &original)?;
        validate_tag(&tag, &original)?;

        let registry = normalize_registry_host(&registry);

        std::result::Result::Ok(Reference {
            registry,
            repository,
            selector: ReferenceSelector::tag(tag),
            original,
            huggingface,
        })
    }
}

/// Returns `true` if `registry` (pre-normalization) identifies the HuggingFace Hub.
fn is_huggingface_registry(registry: &str) -> bool {
    let lower = registry.to_ascii_lowercase();
    HUGGINGFACE_HOSTS.iter().any(|h| *h == lower)
}

/// Collapses any Docker Hub hostname alias to the canonical one, lowercasing non-HF registries.
fn normalize_registry_host(registry: &str) -> String {
    let lower = registry.to_ascii_lowercase();
    let stripped = lower
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches("/v1")
        .trim_end_matches("/v2");
    if DOCKER_HUB_ALIASES.contains(&stripped) {
        CANONICAL_DOCKER_HUB_REGISTRY.to_string()
    } else {
        lower
    }
}

fn validate_registry(registry: &str, original: &str) -> Result<(), DistributionError> {
    if REGISTRY_REGEX.is_match(registry) {
        std::result::Result::Ok(())
    } else {
        Err(DistributionError::ReferenceInvalid(
            original.to_string(),
            format!("invalid registry: {}", registry),
        ))
    }
}

fn validate_repository(
    repository: &str,
    huggingface: bool,
    original: &str,
) -> Result<(), DistributionError> {
    let matches = if huggingface {
        HF_REPOSITORY_REGEX.is_match(repository)
    } else {
        OCI_REPOSITORY_REGEX.is_match(repository)
    };
    if matches {
        std::result::Result::Ok(())
    } else {
        Err(DistributionError::ReferenceInvalid(
            original.to_string(),
            format!("invalid repository: {}", repository),
        ))
    }
}

fn validate_tag(tag: &str, original: &str) -> Result<(), DistributionError> {
    if TAG_REGEX.is_match(tag) {
        std::result::Result::Ok(())
    } else {
        Err(DistributionError::ReferenceInvalid(
            original.to_string(),
            format!("invalid tag: {}", tag),
        ))
    }
}

/// Splits `reference` into `(registry, remainder)`, using `default_registry` when the first
/// path segment does not look like a registry host (i.e. it lacks a dot, a port, and isn't
/// `localhost`).
fn extract_registry_and_path<'a>(reference: &'a str, default_registry: &str) -> (String, &'a str) {
    let segments: Vec<&str> = reference.splitn(2, '/').collect();
    if segments.len() > 1
        && (segments[0].contains('.') || segments[0].contains(':') || segments[0] == "localhost")
    {
        (segments[0].to_string(), segments[1])
    } else {
        (default_registry.to_string(), reference)
    }
}

/// Splits `path` into `(repository, tag)`, applying the default namespace and default tag.
///
/// HuggingFace repositories are never given a default namespace: HF repos are always
/// `org/name` or a single bare name, and case is preserved (`huggingface` is `true`).
fn extract_repository_and_tag(
    path: &str,
    huggingface: bool,
) -> Result<(String, String), DistributionError> {
    if let Some(idx) = path.rfind(':') {
        // Only treat this as a tag separator if it occurs after the last '/'.
        let last_slash = path.rfind('/');
        let is_tag_separator = match last_slash {
            Some(slash_idx) => idx > slash_idx,
            None => true,
        };

        if is_tag_separator {
            let repo_part = &path[..idx];
            let tag_part = &path[idx + 1..];
            if repo_part.is_empty() {
                return Err(DistributionError::ReferenceInvalid(
                    path.to_string(),
                    "repository is empty".into(),
                ));
            }
            let repository = apply_default_namespace(repo_part, huggingface);
            return std::result::Result::Ok((repository, tag_part.to_string()));
        }
    }

    let repository = apply_default_namespace(path, huggingface);
    std::result::Result::Ok((repository, DEFAULT_REFERENCE_TAG.to_string()))
}

fn apply_default_namespace(repo_part: &str, huggingface: bool) -> String {
    let repo_part = if huggingface {
        repo_part.to_string()
    } else {
        repo_part.to_ascii_lowercase()
    };
    if huggingface || repo_part.contains('/') {
        repo_part
    } else {
        format!("{}/{}", DEFAULT_REPO_NAMESPACE, repo_part)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_valid_reference_with_registry_and_tag() {
        let s = "registry.example.com/library/alpine:3.12";
        let reference = s.parse::<Reference>().unwrap();
        assert_eq!(reference.get_registry(), "registry.example.com");
        assert_eq!(reference.get_repository(), "library/alpine");
        match reference.get_selector() {
            ReferenceSelector::Tag { tag, digest } => {
                assert_eq!(tag, "3.12");
                assert!(digest.is_none());
            }
            _ => panic!("expected Tag variant without digest"),
        }
        assert_eq!(
            reference.to_string(),
            "registry.example.com/library/alpine:3.12"
        );
    }

    #[test]
    fn test_reference_default_registry_and_tag() {
        let s = "myorg/mymodel";
        let reference = s.parse::<Reference>().unwrap();
        assert_eq!(reference.get_registry(), DEFAULT_REGISTRY);
        assert_eq!(reference.get_repository(), "myorg/mymodel");
        match reference.get_selector() {
            ReferenceSelector::Tag { tag, digest } => {
                assert_eq!(tag, DEFAULT_REFERENCE_TAG);
                assert!(digest.is_none());
            }
            _ => panic!("expected Tag variant without digest"),
        }
    }

    #[test]
    fn test_reference_single_segment_gets_default_namespace() {
        let s = "registry.example.com/mymodel:v1".parse::<Reference>().unwrap();
        assert_eq!(s.get_repository(), format!("{}/mymodel", DEFAULT_REPO_NAMESPACE));
    }

    #[test]
    fn test_reference_with_digest_and_tag() {
        let valid_digest = "deadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef";
        let s = format!(
            "registry.example.com/myorg/mymodel:mytag@sha256:{}",
            valid_digest
        );
        let reference = s.parse::<Reference>().unwrap();
        assert_eq!(reference.get_repository(), "myorg/mymodel");
        match reference.get_selector() {
            ReferenceSelector::Tag { tag, digest } => {
                assert_eq!(tag, "mytag");
                assert_eq!(
                    digest.as_ref().unwrap().to_string(),
                    format!("sha256:{}", valid_digest)
                );
            }
            _ => panic!("expected Tag variant with digest"),
        }
    }

    #[test]
    fn test_reference_with_digest_only_gets_default_tag() {
        let valid_digest = "deadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef";
        let s = format!("registry.example.com/myorg/mymodel@sha256:{}", valid_digest);
        let reference = s.parse::<Reference>().unwrap();
        match reference.get_selector() {
            ReferenceSelector::Tag { tag, digest } => {
                assert_eq!(tag, DEFAULT_REFERENCE_TAG);
                assert!(digest.is_some());
            }
            _ => panic!("expected Tag variant with digest"),
        }
    }

    #[test]
    fn test_reference_registry_with_port() {
        let s = "registry.example.com:5000/myorg/mymodel:1.0";
        let reference = s.parse::<Reference>().unwrap();
        assert_eq!(reference.get_registry(), "registry.example.com:5000");
        assert_eq!(reference.get_repository(), "myorg/mymodel");
    }

    #[test]
    fn test_reference_registry_ip_port() {
        let s = "192.168.1.1:5000/org/model:version";
        let reference = s.parse::<Reference>().unwrap();
        assert_eq!(reference.get_registry(), "192.168.1.1:5000");
        assert_eq!(reference.get_repository(), "org/model");
    }

    #[test]
    fn test_docker_hub_aliases_normalize_to_canonical_host() {
        for alias in DOCKER_HUB_ALIASES {
            let s = format!("{}/library/alpine:3.12", alias);
            let reference = s.parse::<Reference>().unwrap();
            assert_eq!(reference.get_registry(), CANONICAL_DOCKER_HUB_REGISTRY);
        }
    }

    #[test]
    fn test_huggingface_reference_preserves_repository_case() {
        let s = "huggingface.co/TheBloke/Llama-2-7B-GGUF:latest";
        let reference = s.parse::<Reference>().unwrap();
        assert!(*reference.get_huggingface());
        assert_eq!(reference.get_repository(), "TheBloke/Llama-2-7B-GGUF");
    }

    #[test]
    fn test_hf_co_alias_is_also_detected_as_huggingface() {
        let s = "hf.co/TheBloke/Llama-2-7B-GGUF".parse::<Reference>().unwrap();
        assert!(*s.get_huggingface());
    }

    #[test]
    fn test_non_huggingface_repository_is_lowercased() {
        // OCI repositories are case folded; only HuggingFace repositories preserve case.
        let s = "registry.example.com/MyOrg/MyModel:v1";
        let reference = s.parse::<Reference>().unwrap();
        assert_eq!(reference.get_repository(), "myorg/mymodel");
        assert!(!*reference.get_huggingface());
    }

    #[test]
    fn test_bare_short_id_reference() {
        let s = "abcdef012345".parse::<Reference>().unwrap();
        assert!(s.is_id_only());
        match s.get_selector() {
            ReferenceSelector::ShortId(id) => assert_eq!(id, "abcdef012345"),
            _ => panic!("expected ShortId variant"),
        }
        assert_eq!(s.to_string(), "abcdef012345");
    }

    #[test]
    fn test_bare_full_digest_reference() {
        let valid_digest = "deadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef";
        let s = format!("sha256:{}", valid_digest);
        let reference = s.parse::<Reference>().unwrap();
        assert!(reference.is_id_only());
    }

    #[test]
    fn test_empty_input() {
        let err = "".parse::<Reference>().unwrap_err();
        assert!(err.to_string().contains("input string is empty"));
    }

    #[test]
    fn test_empty_repository() {
        let err = "registry.example.com/:tag".parse::<Reference>().unwrap_err();
        assert!(err.to_string().contains("repository is empty"));
    }

    #[test]
    fn test_invalid_registry() {
        let err = "inva!id-registry.com/library/alpine:3.12"
            .parse::<Reference>()
            .unwrap_err();
        assert!(err.to_string().contains("invalid registry"));
    }

    #[test]
    fn test_invalid_tag() {
        let err = "registry.example.com/library/alpine:t!ag"
            .parse::<Reference>()
            .unwrap_err();
        assert!(err.to_string().contains("invalid tag"));
    }

    #[test]
    fn test_tag_length_exceeds_limit() {
        let long_tag = "a".repeat(129);
        let s = format!("registry.example.com/library/alpine:{}", long_tag);
        let err = s.parse::<Reference>().unwrap_err();
        assert!(err.to_string().contains("invalid tag"));
    }

    #[test]
    fn test_parse_is_idempotent_under_reserialization() {
        let cases = [
            "registry.example.com/library/alpine:3.12",
            "myorg/mymodel",
            "registry.example.com:5000/org/model:version",
        ];
        for case in cases {
            let once = case.parse::<Reference>().unwrap();
            let twice = once.to_string().parse::<Reference>().unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_parse_with_explicit_default_registry() {
        let reference =
            Reference::parse_with_default_registry("myorg/mymodel", "custom.registry.io").unwrap();
        assert_eq!(reference.get_registry(), "custom.registry.io");
    }
}
