//! Per-run configuration.
//!
//! A [`RunConfig`] describes exactly one build-and-measure unit; a [`Toolchain`] describes the
//! external programs shared by every unit of a session.

use crate::{consts, kernels::LoopOrder};

use std::{fmt, path::PathBuf, time::Duration};

/// Geometry of the simulated first-level data cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheGeometry {
    /// Total size in bytes.
    pub size: usize,
    /// Line size in bytes.
    pub block: usize,
    /// Number of ways per set.
    pub assoc: usize,
}

impl CacheGeometry {
    /// Creates a geometry, defaulting to a fully associative cache (`size / block` ways) when
    /// `assoc` is unspecified.
    pub fn new(size: usize, block: usize, assoc: Option<usize>) -> Self {
        Self {
            size,
            block,
            assoc: assoc.unwrap_or(size / block),
        }
    }
}

/// Formats as cachegrind's `size,assoc,line_size` triple.
impl fmt::Display for CacheGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.size, self.assoc, self.block)
    }
}

/// Everything needed to produce one measurement.
#[derive(Clone, Debug, PartialEq)]
pub struct RunConfig {
    /// C type of the matrix elements, e.g. `double`.
    pub elem_type: String,
    pub m: usize,
    pub n: usize,
    pub geometry: CacheGeometry,
    pub order: LoopOrder,
    /// Subtract the analytic cold-miss estimate from the miss count.
    pub remove_cold: bool,
}

impl RunConfig {
    /// Square problem of size `size`.
    pub fn square(elem_type: &str, size: usize, geometry: CacheGeometry, order: LoopOrder) -> Self {
        Self {
            elem_type: elem_type.to_string(),
            m: size,
            n: size,
            geometry,
            order,
            remove_cold: false,
        }
    }

    pub fn with_remove_cold(mut self, remove_cold: bool) -> Self {
        self.remove_cold = remove_cold;
        self
    }

    /// Preprocessor defines passed to the compiler.
    pub fn defines(&self) -> Vec<String> {
        let [l0, l1, l2] = self.order.roles();
        vec![
            format!("-Dtype={}", self.elem_type),
            format!("-DM={}", self.m),
            format!("-DN={}", self.n),
            format!("-DLOOP0={}", l0.macro_name()),
            format!("-DLOOP1={}", l1.macro_name()),
            format!("-DLOOP2={}", l2.macro_name()),
        ]
    }
}

/// External programs and the limits applied to them.
#[derive(Clone, Debug)]
pub struct Toolchain {
    pub compiler: PathBuf,
    pub simulator: PathBuf,
    /// Time budget of one measurement, shared by its build and its simulation.
    pub timeout: Duration,
    /// Fail instead of reporting `0` when the simulator output lacks a counter.
    pub strict: bool,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            compiler: consts::COMPILER.into(),
            simulator: consts::SIMULATOR.into(),
            timeout: Duration::from_secs(consts::PROCESS_TIMEOUT_SECS),
            strict: false,
        }
    }
}
