//! Credential resolution for registry hosts: environment variables, a Docker-style
//! credentials file, and credential-helper subprocesses, in the order described in §4.2.

mod credentials_file;
mod helper;

use std::path::PathBuf;

use getset::Getters;

use crate::error::DistributionResult;

pub use credentials_file::{AuthEntry, CredentialsFile};
pub use helper::HelperCredential;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An authorization material resolved for a specific registry host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authenticator {
    /// HTTP Basic authentication.
    Basic {
        /// Resolved username.
        username: String,
        /// Resolved password.
        password: String,
    },

    /// A bearer token to send directly, bypassing the registry's own token exchange.
    Bearer {
        /// The token value.
        token: String,
    },

    /// No credentials are available; only anonymous/public access will work.
    Anonymous,
}

/// Resolves credentials for registry hosts.
#[derive(Debug, Getters)]
#[getset(get = "pub with_prefix")]
pub struct Keychain {
    /// Path to the Docker-style credentials file.
    credentials_file_path: PathBuf,

    /// An explicit username/password override, taking precedence over the credentials file.
    env_override: Option<(String, String)>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Keychain {
    /// Creates a keychain backed by the credentials file at `credentials_file_path`, with an
    /// optional `(username, password)` override taking precedence over everything else (the
    /// "environment variables" step of §4.2's resolution order).
    pub fn new(credentials_file_path: PathBuf, env_override: Option<(String, String)>) -> Self {
        Self {
            credentials_file_path,
            env_override,
        }
    }

    /// Creates a keychain rooted at the default credentials file location
    /// (`~/.docker/config.json`, matching the external credential-helper ecosystem), with no
    /// override.
    pub fn with_default_path() -> Self {
        let path = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".docker")
            .join("config.json");
        Self::new(path, None)
    }

    /// Resolves credentials for `host` following the order in §4.2:
    /// env override → credentials file direct entry → per-host helper → global helper →
    /// `auths` map scan by normalized host → anonymous.
    pub async fn resolve(&self, host: &str) -> DistributionResult<Authenticator> {
        if let Some((username, password)) = &self.env_override {
            return std::result::Result::Ok(Authenticator::Basic {
                username: username.clone(),
                password: password.clone(),
            });
        }

        let file = CredentialsFile::load(&self.credentials_file_path).await?;

        if let Some(entry) = file.entry_for(host) {
            if let Some(token) = &entry.identity_token {
                return std::result::Result::Ok(Authenticator::Bearer {
                    token: token.clone(),
                });
            }
            if let Some((username, password)) = entry.decode_basic()? {
                return std::result::Result::Ok(Authenticator::Basic { username, password });
            }
        }

        if let Some(suffix) = file.helper_for(host) {
            match helper::invoke(suffix, host).await {
                std::result::Result::Ok(HelperCredential::Basic { username, password }) => {
                    return std::result::Result::Ok(Authenticator::Basic { username, password });
                }
                std::result::Result::Ok(HelperCredential::IdentityToken { token }) => {
                    return std::result::Result::Ok(Authenticator::Bearer { token });
                }
                std::result::Result::Ok(HelperCredential::NotFound) => {
                    tracing::debug!(helper = suffix, host, "credential helper has no entry");
                }
                Err(e) => {
                    tracing::warn!(helper = suffix, host, error = %e, "credential helper invocation failed");
                }
            }
        }

        std::result::Result::Ok(Authenticator::Anonymous)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_env_override_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(
            &path,
            r#"{"auths": {"registry.example.com": {"username": "file-user", "password": "file-pass"}}}"#,
        )
        .await
        .unwrap();

        let keychain = Keychain::new(
            path,
            Some(("env-user".to_string(), "env-pass".to_string())),
        );

        let auth = keychain.resolve("registry.example.com").await.unwrap();
        assert_eq!(
            auth,
            Authenticator::Basic {
                username: "env-user".to_string(),
                password: "env-pass".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_credentials_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(
            &path,
            r#"{"auths": {"registry.example.com": {"username": "file-user", "password": "file-pass"}}}"#,
        )
        .await
        .unwrap();

        let keychain = Keychain::new(path, None);
        let auth = keychain.resolve("registry.example.com").await.unwrap();
        assert_eq!(
            auth,
            Authenticator::Basic {
                username: "file-user".to_string(),
                password: "file-pass".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_resolve_identity_token_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(
            &path,
            r#"{"auths": {"registry.example.com": {"identitytoken": "opaque-token"}}}"#,
        )
        .await
        .unwrap();

        let keychain = Keychain::new(path, None);
        let auth = keychain.resolve("registry.example.com").await.unwrap();
        assert_eq!(
            auth,
            Authenticator::Bearer {
                token: "opaque-token".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_resolve_anonymous_when_nothing_matches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, r#"{"auths": {}}"#).await.unwrap();

        let keychain = Keychain::new(path, None);
        let auth = keychain.resolve("unknown.example.com").await.unwrap();
        assert_eq!(auth, Authenticator::Anonymous);
    }

    #[tokio::test]
    async fn test_resolve_missing_credentials_file_is_anonymous_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonexistent.json");
        let keychain = Keychain::new(path, None);
        let auth = keychain.resolve("unknown.example.com").await.unwrap();
        assert_eq!(auth, Authenticator::Anonymous);
    }
}
