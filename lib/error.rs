use std::{
    error::Error,
    fmt::{self, Display},
};
use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a model-distribution operation.
pub type DistributionResult<T> = Result<T, DistributionError>;

/// An error that occurred while resolving, pulling, storing, or serving a model.
#[derive(pretty_error_debug::Debug, Error)]
pub enum DistributionError {
    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error that can represent any error not covered by a dedicated variant.
    #[error(transparent)]
    Custom(#[from] AnyError),

    /// An error that occurred during an HTTP request.
    #[error("http request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// An error that occurred during an HTTP middleware operation (retry, auth injection).
    #[error("http middleware error: {0}")]
    HttpMiddleware(#[from] reqwest_middleware::Error),

    /// An error that occurred while serializing or deserializing JSON.
    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// An error that occurred when a join handle returned an error.
    #[error("join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    /// The reference string could not be parsed.
    #[error("invalid reference '{0}': {1}")]
    ReferenceInvalid(String, String),

    /// The registry or hub rejected the request for lack of (or invalid) credentials.
    #[error("unauthorized for '{0}'")]
    Unauthorized(String),

    /// The requested model, repository, manifest, or blob does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The manifest's config media type is not one this build understands.
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// The remote source is rate-limiting requests.
    #[error("rate limited by '{0}'")]
    RateLimited(String),

    /// An operation conflicts with existing store state (e.g. delete without force).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Committed bytes did not hash to the expected digest.
    #[error("integrity check failed for '{0}': expected {1}, got {2}")]
    Integrity(String, String, String),

    /// The operation was interrupted (cancelled, or the stream broke) and may be resumed.
    #[error("interrupted: {0}")]
    Interrupted(String),

    /// A network failure not otherwise classified.
    #[error("transport error: {0}")]
    Transport(String),

    /// The on-disk store is internally inconsistent.
    #[error("store corruption: {0}")]
    StoreCorruption(String),

    /// A feature is not implemented in this build.
    #[error("feature not yet implemented: {0}")]
    NotImplemented(String),
}

/// An error that can represent any error not covered by a dedicated variant.
#[derive(Debug)]
pub struct AnyError {
    error: anyhow::Error,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DistributionError {
    /// Wraps an arbitrary error as a [`DistributionError::Custom`].
    pub fn custom(error: impl Into<anyhow::Error>) -> DistributionError {
        DistributionError::Custom(AnyError {
            error: error.into(),
        })
    }

    /// Returns `true` if this error represents a state from which a resumed pull can recover
    /// without discarding any partially-written blob data.
    pub fn is_resumable(&self) -> bool {
        matches!(self, DistributionError::Interrupted(_))
    }
}

impl AnyError {
    /// Downcasts the wrapped error to a concrete type.
    pub fn downcast<T>(&self) -> Option<&T>
    where
        T: Display + fmt::Debug + Send + Sync + 'static,
    {
        self.error.downcast_ref::<T>()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Creates an `Ok` [`DistributionResult`].
#[allow(non_snake_case)]
pub fn Ok<T>(value: T) -> DistributionResult<T> {
    Result::Ok(value)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl PartialEq for AnyError {
    fn eq(&self, other: &Self) -> bool {
        self.error.to_string() == other.error.to_string()
    }
}

impl Display for AnyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl Error for AnyError {}
