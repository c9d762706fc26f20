//! Crate-level constants.

/// Default C element type of the matrices.
pub const ELEM_TYPE: &str = "double";

/// Default matrix size (both `M` and `N`).
pub const MATRIX_SIZE: usize = 128;

/// Default simulated D1 cache size in bytes.
pub const CACHE_SIZE: usize = 1024;

/// Default cache line (block) size in bytes.
pub const BLOCK_SIZE: usize = 32;

/// Default number of sweep points measured concurrently.
pub const BATCH_WIDTH: usize = 128;

/// Default half-open `(start, stop, step)` range for `M` and `N` in loop-order sweeps.
pub const MN_RANGE: [usize; 3] = [8, 257, 8];

/// Default time budget in seconds of one measurement, build and simulation together.
pub const PROCESS_TIMEOUT_SECS: u64 = 300;

/// Default compiler executable.
pub const COMPILER: &str = "clang";

/// Default cache simulator executable.
pub const SIMULATOR: &str = "valgrind";

/// Name of the compiled benchmark inside each unit's working directory.
pub const ARTIFACT_NAME: &str = "matmul.exe";

/// Interval between two exit checks of a running tool.
pub const POLL_INTERVAL_MS: u64 = 10;
