//! Parsing of the Docker-style credentials file (`auths` map, `credsStore`, `credHelpers`).

use std::{collections::HashMap, path::Path};

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{DistributionError, DistributionResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The on-disk shape of the credentials file (§6.4).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsFile {
    /// Per-server credential entries, keyed by server address.
    #[serde(default)]
    pub auths: HashMap<String, AuthEntry>,

    /// The suffix of a global `docker-credential-<suffix>` helper, used for any host with
    /// no entry in `cred_helpers`.
    #[serde(default, rename = "credsStore")]
    pub creds_store: Option<String>,

    /// Per-host credential helper suffixes, checked before `creds_store`.
    #[serde(default, rename = "credHelpers")]
    pub cred_helpers: HashMap<String, String>,
}

/// A single entry in the credentials file's `auths` map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthEntry {
    /// Plaintext username, used together with `password`.
    #[serde(default)]
    pub username: Option<String>,

    /// Plaintext password, used together with `username`.
    #[serde(default)]
    pub password: Option<String>,

    /// Base64-encoded `username:password`, as written by `docker login`.
    #[serde(default)]
    pub auth: Option<String>,

    /// An opaque bearer token (OAuth-style), used instead of username/password.
    #[serde(default, rename = "identitytoken")]
    pub identity_token: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl CredentialsFile {
    /// Loads and parses the credentials file at `path`. A missing file is not an error; it is
    /// treated as an empty credentials file so callers fall through to other resolution steps.
    pub async fn load(path: &Path) -> DistributionResult<Self> {
        match tokio::fs::read(path).await {
            std::result::Result::Ok(bytes) => {
                std::result::Result::Ok(serde_json::from_slice(&bytes)?)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                std::result::Result::Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Looks up the raw entry for `server`, trying both the bare host and the Docker Hub
    /// legacy credential key (`https://index.docker.io/v1/`) when `server` is the canonical
    /// Docker Hub hostname.
    pub fn entry_for(&self, server: &str) -> Option<&AuthEntry> {
        if let Some(entry) = self.auths.get(server) {
            return Some(entry);
        }
        if server == "index.docker.io" {
            return self.auths.get("https://index.docker.io/v1/");
        }
        None
    }

    /// Returns the credential-helper suffix that applies to `server`, preferring a per-host
    /// `credHelpers` entry over the global `credsStore`.
    pub fn helper_for(&self, server: &str) -> Option<&str> {
        self.cred_helpers
            .get(server)
            .or(self.creds_store.as_ref())
            .map(String::as_str)
    }
}

impl AuthEntry {
    /// Decodes this entry into a `(username, password)` pair, preferring the plaintext fields
    /// and falling back to base64-decoding `auth` as `username:password`.
    pub fn decode_basic(&self) -> DistributionResult<Option<(String, String)>> {
        if let (Some(user), Some(pass)) = (&self.username, &self.password) {
            return std::result::Result::Ok(Some((user.clone(), pass.clone())));
        }

        if let Some(auth) = &self.auth {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(auth)
                .map_err(|e| DistributionError::custom(anyhow::anyhow!(e)))?;
            let decoded = String::from_utf8(decoded)
                .map_err(|e| DistributionError::custom(anyhow::anyhow!(e)))?;
            if let Some((user, pass)) = decoded.split_once(':') {
                return std::result::Result::Ok(Some((user.to_string(), pass.to_string())));
            }
        }

        std::result::Result::Ok(None)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_credentials_file_with_plaintext_and_auth_entries() {
        let json = r#"{
            "auths": {
                "registry.example.com": { "username": "alice", "password": "hunter2" },
                "https://index.docker.io/v1/": { "auth": "Ym9iOnNlY3JldA==" }
            },
            "credsStore": "desktop",
            "credHelpers": { "registry.example.com": "ecr-login" }
        }"#;

        let file: CredentialsFile = serde_json::from_str(json).unwrap();

        let plain = file.entry_for("registry.example.com").unwrap();
        assert_eq!(
            plain.decode_basic().unwrap(),
            Some(("alice".to_string(), "hunter2".to_string()))
        );

        let hub = file.entry_for("index.docker.io").unwrap();
        assert_eq!(
            hub.decode_basic().unwrap(),
            Some(("bob".to_string(), "secret".to_string()))
        );

        assert_eq!(file.helper_for("registry.example.com"), Some("ecr-login"));
        assert_eq!(file.helper_for("other.registry.com"), Some("desktop"));
    }

    #[test]
    fn test_missing_entry_returns_none() {
        let file = CredentialsFile::default();
        assert!(file.entry_for("nowhere.example.com").is_none());
        assert!(file.helper_for("nowhere.example.com").is_none());
    }

    #[tokio::test]
    async fn test_load_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.json");
        let file = CredentialsFile::load(&path).await.unwrap();
        assert!(file.auths.is_empty());
    }

    #[tokio::test]
    async fn test_load_parses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(
            &path,
            r#"{"auths": {"registry.example.com": {"username": "u", "password": "p"}}}"#,
        )
        .await
        .unwrap();

        let file = CredentialsFile::load(&path).await.unwrap();
        assert!(file.entry_for("registry.example.com").is_some());
    }
}
