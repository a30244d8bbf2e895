//! File-based progress log retention (§A.2).
//!
//! This crate does not install a global `tracing` subscriber itself -- that remains the
//! embedding binary's job -- but a caller that wants a long-running pull's progress stream
//! retained on disk, not just in memory, can hand a [`RotatingProgressLog`] to
//! [`crate::progress::ProgressSink`] as its writer.

use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A non-blocking, daily-rotating file sink for progress logs.
///
/// Writes go through a background thread so a slow disk never stalls the pull loop; the
/// returned [`NonBlocking`] handle is cheap to clone and implements `std::io::Write`, matching
/// what [`crate::progress::ProgressSink::new`] expects.
pub struct RotatingProgressLog {
    writer: NonBlocking,
    _guard: WorkerGuard,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RotatingProgressLog {
    /// Opens (creating if necessary) a daily-rotating log file named `<prefix>.<date>` under
    /// `dir`.
    pub fn new(dir: impl AsRef<Path>, prefix: &str) -> Self {
        let appender = RollingFileAppender::new(Rotation::DAILY, dir.as_ref(), prefix);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        Self {
            writer,
            _guard: guard,
        }
    }

    /// A cloneable `Write` handle into the rotating file.
    pub fn writer(&self) -> NonBlocking {
        self.writer.clone()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
