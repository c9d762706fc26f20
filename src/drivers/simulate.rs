//! Cache simulation driver.
//!
//! Runs a compiled kernel under cachegrind with a single simulated D1 level and extracts the
//! data reference and D1 miss counters from its summary.
//!
//! Cachegrind prints its summary on stderr, one counter per line:
//! ```text
//! ==31751== D   refs:      15,430,290  (10,955,517 rd   + 4,474,773 wr)
//! ==31751== D1  misses:        41,185  (    21,905 rd   +    19,280 wr)
//! ```
//! Lines are scanned as whitespace-separated tokens, so the amount of padding between label
//! words does not matter.

use crate::{
    config::{CacheGeometry, Toolchain},
    error::{Result, SweepError},
    utils::{parse_grouped, run_tool, Deadline},
};

use std::{path::Path, process::Command};

/// Label tokens of the total data references line.
pub const REFS_LABEL: [&str; 2] = ["D", "refs:"];

/// Label tokens of the D1 misses line.
pub const MISSES_LABEL: [&str; 2] = ["D1", "misses:"];

/// Counters extracted from the simulator output.
///
/// `None` means the corresponding summary line was never seen, which is not the same thing as
/// a program that made zero references.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheCounters {
    pub refs: Option<u64>,
    pub misses: Option<u64>,
}

impl CacheCounters {
    /// Scans a cachegrind diagnostic stream.
    pub fn parse(text: &str) -> Self {
        let mut counters = Self::default();
        for line in text.lines() {
            let tokens: Vec<&str> = line
                .split_whitespace()
                .skip_while(|t| t.starts_with("==") && t.ends_with("=="))
                .collect();

            if let Some(value) = labelled_value(&tokens, &REFS_LABEL) {
                counters.refs = Some(value);
            } else if let Some(value) = labelled_value(&tokens, &MISSES_LABEL) {
                counters.misses = Some(value);
            }
        }
        counters
    }

    /// Miss ratio after subtracting `cold_misses`.
    ///
    /// Returns `0` when no references were recorded or the reference line is missing. The
    /// result is not clamped and may be negative when the cold-miss estimate overshoots.
    pub fn miss_ratio(&self, cold_misses: f64) -> f64 {
        match self.refs {
            Some(refs) if refs > 0 => {
                (self.misses.unwrap_or(0) as f64 - cold_misses) / refs as f64
            }
            _ => 0.0,
        }
    }
}

/// Value following `label` when `tokens` starts with it.
fn labelled_value(tokens: &[&str], label: &[&str]) -> Option<u64> {
    if tokens.len() > label.len() && tokens[..label.len()] == *label {
        parse_grouped(tokens[label.len()])
    } else {
        None
    }
}

/// Analytic estimate of the compulsory misses of the kernel.
///
/// Every line of `A` (`m x n`), `B` (`n x m`) and `C` (`m x m`) is assumed to be loaded exactly
/// once; `m = n` gives the classic `3 * n * n / block`.
pub fn cold_misses(m: usize, n: usize, block: usize) -> f64 {
    (2 * m * n + m * m) as f64 / block as f64
}

/// Runs `binary` under the cache simulator and returns the parsed counters.
///
/// With `tools.strict`, a missing summary line is an error instead of an empty counter.
pub fn simulate(
    binary: &Path,
    geometry: &CacheGeometry,
    tools: &Toolchain,
    deadline: &Deadline,
) -> Result<CacheCounters> {
    let dir = binary.parent().unwrap_or_else(|| Path::new("."));
    let file = binary.file_name().unwrap_or(binary.as_os_str());

    let mut cmd = Command::new(&tools.simulator);
    cmd.args([
        "--tool=cachegrind",
        "--cache-sim=yes",
        "--cachegrind-out-file=/dev/null",
    ])
    .arg(format!("--D1={geometry}"))
    .arg(Path::new(".").join(file));

    let out = run_tool(cmd, dir, deadline)?;
    if !out.status.success() {
        return Err(SweepError::Simulate {
            status: out.status,
            stderr: out.stderr.trim().to_string(),
        });
    }

    let counters = CacheCounters::parse(&out.stderr);
    if counters.refs.is_none() || counters.misses.is_none() {
        let label = if counters.refs.is_none() { "D refs" } else { "D1 misses" };
        if tools.strict {
            return Err(SweepError::MissingCounter(label));
        }
        log::warn!("no `{label}` line in simulator output for {}", binary.display());
    }
    Ok(counters)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CACHEGRIND: &str = "\
==31751== Cachegrind, a cache and branch-prediction profiler
==31751== Command: ./matmul.exe
==31751==
--31751-- warning: L3 cache found, using its data for the LL simulation.
==31751==
==31751== I   refs:      27,742,716
==31751== I1  misses:           276
==31751== LLi misses:           275
==31751== I1  miss rate:       0.00%
==31751==
==31751== D   refs:      15,430,290  (10,955,517 rd   + 4,474,773 wr)
==31751== D1  misses:        41,185  (    21,905 rd   +    19,280 wr)
==31751== LLd misses:        40,985  (    21,757 rd   +    19,228 wr)
==31751== D1  miss rate:        0.3% (       0.2%     +       0.4%  )
";

    #[test]
    fn simple_summary_lines() {
        let counters = CacheCounters::parse("D refs: 1,000\nD1 misses: 200\n");
        assert_eq!(counters.refs, Some(1000));
        assert_eq!(counters.misses, Some(200));
        assert!((counters.miss_ratio(0.0) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn real_cachegrind_summary() {
        let counters = CacheCounters::parse(CACHEGRIND);
        assert_eq!(
            counters,
            CacheCounters {
                refs: Some(15_430_290),
                misses: Some(41_185),
            }
        );
    }

    #[test]
    fn missing_reference_line_is_zero() {
        let counters = CacheCounters::parse("D1 misses: 200\n");
        assert_eq!(counters.refs, None);
        assert_eq!(counters.miss_ratio(0.0), 0.0);

        let empty = CacheCounters::parse("");
        assert_eq!(empty, CacheCounters::default());
        assert_eq!(empty.miss_ratio(0.0), 0.0);
    }

    #[test]
    fn zero_references_is_zero() {
        let counters = CacheCounters::parse("D refs: 0\nD1 misses: 0\n");
        assert_eq!(counters.refs, Some(0));
        assert_eq!(counters.miss_ratio(10.0), 0.0);
    }

    #[test]
    fn cold_miss_estimate() {
        assert_eq!(cold_misses(16, 16, 32), 24.0);
        assert_eq!(cold_misses(8, 16, 64), (2.0 * 8.0 * 16.0 + 64.0) / 64.0);
    }

    #[test]
    fn cold_misses_are_subtracted_unclamped() {
        let counters = CacheCounters {
            refs: Some(1000),
            misses: Some(200),
        };
        assert!((counters.miss_ratio(cold_misses(16, 16, 32)) - 0.176).abs() < 1e-12);
        assert!(counters.miss_ratio(300.0) < 0.0);
    }

    #[test]
    fn similar_labels_do_not_match() {
        let counters =
            CacheCounters::parse("D1  miss rate: 0.3%\nLLd misses: 5\nI   refs: 9\n");
        assert_eq!(counters, CacheCounters::default());
    }

    #[cfg(unix)]
    mod with_tools {
        use super::super::*;
        use crate::drivers::test_tools::{fake_simulator, script};

        use std::time::Duration;

        fn deadline() -> Deadline {
            Deadline::after(Duration::from_secs(30))
        }

        #[test]
        fn simulator_receives_geometry() {
            let dir = tempfile::tempdir().unwrap();
            let bin = tempfile::tempdir().unwrap();
            let tools = Toolchain {
                simulator: fake_simulator(bin.path(), 1000, 200),
                ..Default::default()
            };

            let geometry = CacheGeometry::new(512, 32, None);
            let binary = dir.path().join("matmul.exe");
            let counters = simulate(&binary, &geometry, &tools, &deadline()).unwrap();
            assert_eq!(counters.refs, Some(1000));
            assert_eq!(counters.misses, Some(200));

            let args = std::fs::read_to_string(dir.path().join("args.txt")).unwrap();
            assert!(args.contains("--tool=cachegrind --cache-sim=yes"));
            assert!(args.contains("--D1=512,16,32 ./matmul.exe"));
        }

        #[test]
        fn strict_mode_rejects_missing_counters() {
            let dir = tempfile::tempdir().unwrap();
            let bin = tempfile::tempdir().unwrap();
            let silent = script(bin.path(), "valgrind", "echo nothing here >&2");
            let binary = dir.path().join("matmul.exe");

            let geometry = CacheGeometry::new(512, 32, None);

            let lenient = Toolchain {
                simulator: silent.clone(),
                ..Default::default()
            };
            assert_eq!(
                simulate(&binary, &geometry, &lenient, &deadline()).unwrap(),
                CacheCounters::default()
            );

            let strict = Toolchain {
                simulator: silent,
                strict: true,
                ..Default::default()
            };
            let err = simulate(&binary, &geometry, &strict, &deadline()).unwrap_err();
            assert!(matches!(err, SweepError::MissingCounter("D refs")));
        }

        #[test]
        fn simulator_failure_is_reported() {
            let dir = tempfile::tempdir().unwrap();
            let bin = tempfile::tempdir().unwrap();
            let tools = Toolchain {
                simulator: script(bin.path(), "valgrind", "echo crashed >&2\nexit 2"),
                ..Default::default()
            };
            let err = simulate(
                &dir.path().join("matmul.exe"),
                &CacheGeometry::new(512, 32, None),
                &tools,
                &deadline(),
            )
            .unwrap_err();
            assert!(matches!(err, SweepError::Simulate { ref stderr, .. } if stderr == "crashed"));
        }
    }
}
