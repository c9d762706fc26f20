//! Error types.

use thiserror::Error;

use std::{io, process::ExitStatus, time::Duration};

/// Everything that can go wrong while building, measuring, sweeping or plotting.
#[derive(Debug, Error)]
pub enum SweepError {
    /// The external tool could not be started at all.
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The compiler exited unsuccessfully.
    #[error("compilation failed ({status}): {stderr}")]
    Build { status: ExitStatus, stderr: String },

    /// The cache simulator exited unsuccessfully.
    #[error("cache simulation failed ({status}): {stderr}")]
    Simulate { status: ExitStatus, stderr: String },

    /// The measurement ran past its deadline and the running tool was killed.
    #[error("`{program}` killed after {after:?} timeout")]
    Timeout { program: String, after: Duration },

    /// A summary counter was absent from the simulator output.
    #[error("no `{0}` line in cache simulator output")]
    MissingCounter(&'static str),

    /// Loop order name is not a permutation of `IJK`.
    #[error("invalid loop order `{0}`, expected a permutation of IJK or ALL")]
    InvalidOrder(String),

    /// Sweep range is not a `START STOP STEP` triple with a non-zero step.
    #[error("invalid range {0}, expected START STOP STEP with STEP > 0")]
    InvalidRange(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("plotting failed: {0}")]
    Plot(String),
}

impl SweepError {
    /// Returns `true` when the failure came from the compiler rather than the measurement.
    pub fn is_build_failure(&self) -> bool {
        matches!(self, Self::Build { .. })
    }
}

pub type Result<T> = std::result::Result<T, SweepError>;
