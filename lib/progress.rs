//! The progress stream sink: line-delimited events describing pull/push state, emitted to any
//! byte-writable destination (§6.5).

use std::io::Write;

use serde::Serialize;

use crate::error::DistributionResult;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The severity of a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressLevel {
    /// Routine status, no action needed.
    Info,
    /// A non-fatal condition the caller may want to surface (e.g. unsupported format).
    Warning,
    /// Accompanies a terminal failure.
    Error,
}

/// The number of bytes transferred so far for the object an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressCounts {
    /// Bytes transferred so far.
    pub complete: u64,
    /// Total expected bytes, if known.
    pub total: u64,
}

/// A single progress event.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    /// A short human-readable status line.
    pub status: String,

    /// The digest of the object this event concerns, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,

    /// Byte counts for the object this event concerns, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressCounts>,

    /// Event severity.
    pub level: ProgressLevel,
}

impl ProgressEvent {
    /// Creates an informational event with just a status line.
    pub fn info(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            digest: None,
            progress: None,
            level: ProgressLevel::Info,
        }
    }

    /// Creates a warning event with just a status line.
    pub fn warning(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            digest: None,
            progress: None,
            level: ProgressLevel::Warning,
        }
    }

    /// Creates an informational event carrying byte-progress for `digest`.
    pub fn transfer(status: impl Into<String>, digest: impl Into<String>, complete: u64, total: u64) -> Self {
        Self {
            status: status.into(),
            digest: Some(digest.into()),
            progress: Some(ProgressCounts { complete, total }),
            level: ProgressLevel::Info,
        }
    }
}

/// The wire encoding a [`ProgressSink`] writes events as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEncoding {
    /// One HTML-escaped status line per event.
    TextPlain,
    /// One JSON object per line.
    Json,
}

/// Writes [`ProgressEvent`]s to an underlying byte sink using the configured encoding.
///
/// The sink owns no background task or channel: operations call [`ProgressSink::emit`]
/// synchronously at each state-machine transition, matching the way the orchestrator already
/// threads a `&mut dyn Write` through its call chain.
pub struct ProgressSink<'a> {
    writer: &'a mut (dyn Write + Send),
    encoding: ProgressEncoding,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl<'a> ProgressSink<'a> {
    /// Wraps `writer`, encoding events as `encoding`.
    pub fn new(writer: &'a mut (dyn Write + Send), encoding: ProgressEncoding) -> Self {
        Self { writer, encoding }
    }

    /// Emits a single event, flushing after each line so a caller tailing the sink sees
    /// progress promptly.
    pub fn emit(&mut self, event: &ProgressEvent) -> DistributionResult<()> {
        match self.encoding {
            ProgressEncoding::TextPlain => {
                writeln!(self.writer, "{}", html_escape(&event.status))?;
            }
            ProgressEncoding::Json => {
                let line = serde_json::to_string(event)?;
                writeln!(self.writer, "{}", line)?;
            }
        }
        self.writer.flush()?;
        std::result::Result::Ok(())
    }
}

fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
