//! The registry HTTP transport: ping, bearer-token exchange, and a per-request wrapper that
//! injects auth/range headers and records which ranged requests the server actually honored.

mod challenge;

use std::{collections::HashMap, sync::Arc};

use bytes::Bytes;
use reqwest::{Client, Response, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use tokio::sync::Mutex;

pub use challenge::{parse_bearer_challenge, BearerChallenge};

use crate::{
    error::{DistributionError, DistributionResult},
    keychain::Authenticator,
    utils::convert_bounds,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Header carrying the server's auth challenge on a 401 response.
const WWW_AUTHENTICATE: &str = "WWW-Authenticate";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The token-exchange response body (§4.3). Registries vary on whether they populate `token`
/// or `access_token`; both are accepted and `access_token` is preferred when `token` is empty.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: String,

    #[serde(default)]
    access_token: String,

    #[serde(default)]
    #[allow(dead_code)]
    expires_in: Option<u32>,
}

/// Which scope an authorized operation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Read-only access to a repository.
    Pull,
    /// Read-write access to a repository (push implies pull).
    Push,
}

impl Scope {
    fn as_action_list(self) -> &'static str {
        match self {
            Scope::Pull => "pull",
            Scope::Push => "push,pull",
        }
    }
}

/// Tracks, per blob digest, whether the server most recently honored a ranged request with a
/// `206 Partial Content` (or a `200 OK` the caller chooses to treat as honoring it). The local
/// store consults this after a fetch to decide whether to append or restart (§4.3, §4.5).
#[derive(Debug, Default, Clone)]
pub struct RangeSuccessTracker {
    inner: Arc<Mutex<HashMap<String, bool>>>,
}

impl RangeSuccessTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records whether a ranged request for `digest` was honored.
    pub async fn record(&self, digest: &str, honored: bool) {
        self.inner.lock().await.insert(digest.to_string(), honored);
    }

    /// Returns whether the most recent ranged request for `digest` was honored.
    pub async fn was_honored(&self, digest: &str) -> bool {
        self.inner
            .lock()
            .await
            .get(digest)
            .copied()
            .unwrap_or(false)
    }
}

/// A client for interacting with an OCI Distribution v2 registry's authentication and
/// transport layer, independent of any particular repository or manifest format.
#[derive(Debug, Clone)]
pub struct RegistryTransport {
    client: ClientWithMiddleware,
    user_agent: String,
    range_tracker: RangeSuccessTracker,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RegistryTransport {
    /// Creates a transport around an existing middleware-wrapped client.
    pub fn new(client: ClientWithMiddleware, user_agent: impl Into<String>) -> Self {
        Self {
            client,
            user_agent: user_agent.into(),
            range_tracker: RangeSuccessTracker::new(),
        }
    }

    /// Builds a transport with the default retry-enabled HTTP client.
    pub fn with_default_client(user_agent: impl Into<String>, retry_attempts: u32) -> Self {
        Self::new(build_default_client(retry_attempts), user_agent)
    }

    /// Returns the range-success tracker shared by this transport's ranged requests.
    pub fn range_tracker(&self) -> &RangeSuccessTracker {
        &self.range_tracker
    }

    /// Pings `GET {scheme}://{registry}/v2/` and returns the bearer challenge if the registry
    /// demands one.
    pub async fn ping(
        &self,
        registry: &str,
        plain_http: bool,
    ) -> DistributionResult<Option<BearerChallenge>> {
        let scheme = if plain_http { "http" } else { "https" };
        let url = format!("{scheme}://{registry}/v2/");

        let response = self
            .client
            .get(&url)
            .header("User-Agent", &self.user_agent)
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            if let Some(header) = response.headers().get(WWW_AUTHENTICATE) {
                let header_str = header.to_str().unwrap_or_default();
                let challenge = parse_bearer_challenge(header_str);
                tracing::debug!(registry, challenged = challenge.is_some(), "ping demanded auth");
                return std::result::Result::Ok(challenge);
            }
        }

        std::result::Result::Ok(None)
    }

    /// Exchanges credentials for a bearer token against `challenge`, requesting `scope` for
    /// `repository`.
    pub async fn exchange_token(
        &self,
        challenge: &BearerChallenge,
        repository: &str,
        scope: Scope,
        authenticator: &Authenticator,
    ) -> DistributionResult<String> {
        let scope_value = format!("repository:{}:{}", repository, scope.as_action_list());

        let mut request = self.client.get(&challenge.realm).header("User-Agent", &self.user_agent);

        let mut query: Vec<(&str, String)> = vec![("scope", scope_value)];
        if let Some(service) = &challenge.service {
            query.push(("service", service.clone()));
        }
        request = request.query(&query);

        request = match authenticator {
            Authenticator::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
            Authenticator::Bearer { token } => request.bearer_auth(token),
            Authenticator::Anonymous => request,
        };

        let response = request.send().await?;
        if !response.status().is_success() {
            tracing::warn!(repository, status = %response.status(), "token exchange failed");
            return Err(classify_status(response.status(), repository));
        }

        let token_response: TokenResponse = response.json().await?;
        let token = if !token_response.token.is_empty() {
            token_response.token
        } else {
            token_response.access_token
        };

        if token.is_empty() {
            return Err(DistributionError::Unauthorized(repository.to_string()));
        }

        std::result::Result::Ok(token)
    }

    /// Performs a GET against `url`, attaching `Accept`, bearer auth, and (when `resume_offset`
    /// is `Some`) a `Range: bytes=<offset>-` header. Records the outcome in the range-success
    /// tracker keyed by `digest_key` when a resume was requested.
    pub async fn get(
        &self,
        url: &str,
        accept: &str,
        token: Option<&str>,
        resume_offset: Option<u64>,
        digest_key: Option<&str>,
    ) -> DistributionResult<Response> {
        let mut request = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .header("Accept", accept);

        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        if let Some(offset) = resume_offset {
            let (_, end) = convert_bounds(offset..);
            let end = if end == u64::MAX {
                String::new()
            } else {
                end.to_string()
            };
            request = request.header("Range", format!("bytes={offset}-{end}"));
        }

        let response = request.send().await?;

        if let (Some(offset), Some(key)) = (resume_offset, digest_key) {
            let honored = offset > 0
                && matches!(response.status(), StatusCode::PARTIAL_CONTENT | StatusCode::OK);
            if offset > 0 && !honored {
                tracing::debug!(digest = key, offset, "registry did not honor range resume");
            }
            self.range_tracker.record(key, honored).await;
        }

        std::result::Result::Ok(response)
    }

    /// Initiates a blob upload session against `url` (`POST .../blobs/uploads/`), returning the
    /// absolute URL the registry wants subsequent chunks sent to.
    ///
    /// The `Location` header is permitted by the distribution spec to be relative to the
    /// request it answers, so it's resolved against the response's own URL rather than used
    /// as-is.
    pub async fn start_upload(&self, url: &str, token: Option<&str>) -> DistributionResult<String> {
        let mut request = self.client.post(url).header("User-Agent", &self.user_agent);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(classify_status(response.status(), url));
        }

        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| DistributionError::Transport(format!("{url}: upload session has no Location header")))?;

        response
            .url()
            .join(&location)
            .map(|u| u.to_string())
            .map_err(|e| DistributionError::Transport(format!("{url}: malformed Location header: {e}")))
    }

    /// Uploads an entire blob's bytes in one chunk (monolithic upload) and finalizes it by
    /// appending `?digest=` to `location`, matching the single-PUT variant of the OCI upload
    /// protocol.
    pub async fn upload_blob(
        &self,
        location: &str,
        digest: &str,
        token: Option<&str>,
        bytes: Bytes,
    ) -> DistributionResult<()> {
        let separator = if location.contains('?') { "&" } else { "?" };
        let url = format!("{location}{separator}digest={digest}");

        let mut request = self
            .client
            .put(&url)
            .header("User-Agent", &self.user_agent)
            .header("Content-Type", "application/octet-stream")
            .header("Content-Length", bytes.len().to_string());
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.body(bytes).send().await?;
        if !response.status().is_success() {
            return Err(classify_status(response.status(), digest));
        }

        std::result::Result::Ok(())
    }

    /// Puts a manifest's raw bytes at `url`, tagged with `media_type`.
    pub async fn put_manifest(
        &self,
        url: &str,
        media_type: &str,
        token: Option<&str>,
        raw: Vec<u8>,
    ) -> DistributionResult<()> {
        let mut request = self
            .client
            .put(url)
            .header("User-Agent", &self.user_agent)
            .header("Content-Type", media_type);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.body(raw).send().await?;
        if !response.status().is_success() {
            return Err(classify_status(response.status(), url));
        }

        std::result::Result::Ok(())
    }
}

/// Builds the default retry-enabled HTTP client middleware stack.
pub fn build_default_client(retry_attempts: u32) -> ClientWithMiddleware {
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(retry_attempts);
    ClientBuilder::new(Client::new())
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build()
}

/// Maps a non-success status code to the taxonomy in §7.
pub fn classify_status(status: StatusCode, context: &str) -> DistributionError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            DistributionError::Unauthorized(context.to_string())
        }
        StatusCode::NOT_FOUND => DistributionError::NotFound(context.to_string()),
        StatusCode::TOO_MANY_REQUESTS => DistributionError::RateLimited(context.to_string()),
        _ => DistributionError::Transport(format!("{context}: unexpected status {status}")),
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
