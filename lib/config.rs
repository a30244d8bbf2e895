//! Configuration for the distribution client: defaults, environment overrides, and the
//! builder-driven [`DistributionClientConfig`] value itself.

use std::{path::PathBuf, sync::LazyLock};

use reqwest_middleware::ClientWithMiddleware;
use typed_builder::TypedBuilder;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Environment variable that overrides the default registry host.
pub const REGISTRY_ENV_VAR: &str = "MODEL_DISTRIBUTION_REGISTRY";

/// Environment variable carrying the store root path.
pub const STORE_HOME_ENV_VAR: &str = "MODEL_DISTRIBUTION_HOME";

/// Environment variable carrying a basic-auth username override.
pub const REGISTRY_USERNAME_ENV_VAR: &str = "MODEL_DISTRIBUTION_REGISTRY_USERNAME";

/// Environment variable carrying a basic-auth password override.
pub const REGISTRY_PASSWORD_ENV_VAR: &str = "MODEL_DISTRIBUTION_REGISTRY_PASSWORD";

/// The default registry domain used when a reference supplies none.
pub const DEFAULT_REGISTRY: &str = "registry.local";

/// The default reference tag used when a reference supplies none.
pub const DEFAULT_REFERENCE_TAG: &str = "latest";

/// The default repository namespace prepended to single-segment repositories.
pub const DEFAULT_REPO_NAMESPACE: &str = "ai";

/// The default `User-Agent` sent with every registry / hub request.
pub const DEFAULT_USER_AGENT: &str = "model-distribution";

/// The default bound on simultaneously active pulls.
pub const DEFAULT_MAX_CONCURRENT_PULLS: usize = 2;

/// The default number of retry attempts for idempotent HTTP requests.
pub const DEFAULT_REQUEST_RETRY_ATTEMPTS: u32 = 3;

/// The directory name, under the user's home, used when no explicit store root is given.
pub const STORE_HOME_DIR: &str = ".model-distribution";

/// The default store root path, derived from the user's home directory.
pub static DEFAULT_STORE_ROOT: LazyLock<PathBuf> =
    LazyLock::new(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(STORE_HOME_DIR));

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Configuration accepted by [`crate::client::DistributionClient::new`].
///
/// Fields mirror the recognized configuration options: a required store root, an optional
/// preconfigured HTTP client, registry credentials, scheme selection, and the ambient
/// concurrency/retry knobs every production deployment of this subsystem needs.
#[derive(TypedBuilder)]
pub struct DistributionClientConfig {
    /// Root directory for the content-addressed local store.
    pub store_root_path: PathBuf,

    /// A preconfigured HTTP client with retry middleware already installed.
    ///
    /// When omitted, [`crate::transport::build_default_client`] constructs one using
    /// `request_retry_attempts`.
    #[builder(default, setter(strip_option))]
    pub transport: Option<ClientWithMiddleware>,

    /// The `User-Agent` header sent with every request.
    #[builder(default = DEFAULT_USER_AGENT.to_string())]
    pub user_agent: String,

    /// Basic-auth username used when no keychain entry resolves for a host.
    #[builder(default, setter(strip_option))]
    pub registry_username: Option<String>,

    /// Basic-auth password used when no keychain entry resolves for a host.
    #[builder(default, setter(strip_option))]
    pub registry_password: Option<String>,

    /// Communicate with registries over plain HTTP instead of HTTPS.
    #[builder(default)]
    pub plain_http: bool,

    /// Overrides the default registry host used when a reference supplies none.
    #[builder(default, setter(strip_option))]
    pub default_registry: Option<String>,

    /// Forces the default registry to be addressed over HTTP.
    #[builder(default)]
    pub insecure_registry: bool,

    /// Bounds the number of simultaneously active pulls.
    #[builder(default = DEFAULT_MAX_CONCURRENT_PULLS)]
    pub max_concurrent_pulls: usize,

    /// The number of retry attempts the default transport applies to idempotent requests.
    #[builder(default = DEFAULT_REQUEST_RETRY_ATTEMPTS)]
    pub request_retry_attempts: u32,
}

impl DistributionClientConfig {
    /// Returns the effective default registry, honoring environment and config overrides in
    /// that order: explicit config field, then environment variable, then the built-in default.
    pub fn effective_default_registry(&self) -> String {
        if let Some(registry) = &self.default_registry {
            return registry.clone();
        }
        if let std::result::Result::Ok(registry) = std::env::var(REGISTRY_ENV_VAR) {
            if !registry.is_empty() {
                return registry;
            }
        }
        DEFAULT_REGISTRY.to_string()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = DistributionClientConfig::builder()
            .store_root_path(PathBuf::from("/tmp/store"))
            .build();

        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.max_concurrent_pulls, DEFAULT_MAX_CONCURRENT_PULLS);
        assert_eq!(
            config.request_retry_attempts,
            DEFAULT_REQUEST_RETRY_ATTEMPTS
        );
        assert!(!config.plain_http);
    }

    #[test]
    fn test_effective_default_registry_falls_back() {
        let config = DistributionClientConfig::builder()
            .store_root_path(PathBuf::from("/tmp/store"))
            .build();

        // We can't reliably assert the exact value here without clobbering process-wide
        // environment state shared with other tests, but the call must not panic and must
        // return a non-empty string.
        assert!(!config.effective_default_registry().is_empty());
    }

    #[test]
    fn test_effective_default_registry_explicit_override_wins() {
        let config = DistributionClientConfig::builder()
            .store_root_path(PathBuf::from("/tmp/store"))
            .default_registry("registry.example.com".to_string())
            .build();

        assert_eq!(config.effective_default_registry(), "registry.example.com");
    }
}
