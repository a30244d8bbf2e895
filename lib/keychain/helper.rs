//! Invocation of external `docker-credential-<suffix>` credential-helper processes.

use serde::Deserialize;
use tokio::{io::AsyncWriteExt, process::Command};

use crate::error::{DistributionError, DistributionResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The JSON object a credential helper writes to stdout in response to a `get` request.
#[derive(Debug, Deserialize)]
struct HelperResponse {
    #[serde(rename = "ServerURL")]
    #[allow(dead_code)]
    server_url: String,

    #[serde(rename = "Username")]
    username: String,

    #[serde(rename = "Secret")]
    secret: String,
}

/// The outcome of invoking a credential helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HelperCredential {
    /// The helper returned a username/password pair.
    Basic {
        /// Resolved username.
        username: String,
        /// Resolved secret.
        password: String,
    },

    /// The helper returned a bearer-style identity token (username is `<token>`).
    IdentityToken {
        /// The token value.
        token: String,
    },

    /// The helper ran successfully but has no entry for this host.
    NotFound,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Invokes `docker-credential-<suffix> get` with `server` on stdin and parses its response.
///
/// A helper exit status of non-zero combined with a "credentials not found" style message on
/// stderr is treated as [`HelperCredential::NotFound`], not an error — matching the real
/// `docker-credential-helpers` convention so a missing entry never aborts credential
/// resolution.
pub async fn invoke(suffix: &str, server: &str) -> DistributionResult<HelperCredential> {
    let program = format!("docker-credential-{}", suffix);

    let mut child = Command::new(&program)
        .arg("get")
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .map_err(|e| {
            DistributionError::custom(anyhow::anyhow!(
                "failed to spawn credential helper '{}': {}",
                program,
                e
            ))
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(server.as_bytes()).await?;
        stdin.shutdown().await?;
    }

    let output = child.wait_with_output().await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.to_ascii_lowercase().contains("credentials not found") {
            return std::result::Result::Ok(HelperCredential::NotFound);
        }
        return Err(DistributionError::custom(anyhow::anyhow!(
            "credential helper '{}' failed: {}",
            program,
            stderr.trim()
        )));
    }

    let response: HelperResponse = serde_json::from_slice(&output.stdout)?;

    if response.username == "<token>" {
        return std::result::Result::Ok(HelperCredential::IdentityToken {
            token: response.secret,
        });
    }

    std::result::Result::Ok(HelperCredential::Basic {
        username: response.username,
        password: response.secret,
    })
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
