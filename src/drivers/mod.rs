//! Measurement drivers.
//!
//! This module provides the API for turning CLI requests into measurements and writing the
//! results out. Every measurement follows the same three steps.
//!
//! # High-level approach for a measurement
//! ## 1. Build
//! The kernel template is rendered for the run's element type, dimensions and loop order, then
//! compiled into a freestanding static binary (see [`build`]). Each measurement gets its own
//! freshly created temporary directory, deleted once the measurement is over, so stale binaries
//! from a previous point can never be measured by mistake.
//!
//! ## 2. Simulation
//! The binary runs under cachegrind with a single simulated D1 level (see [`simulate`]). The
//! data reference and D1 miss counters are extracted from its summary, and the miss ratio is
//! computed, optionally after subtracting an analytic estimate of the cold misses.
//!
//! ## 3. Aggregation
//! Sweeps generate one measurement per point and run them on a bounded worker pool (see
//! [`pool`]; the width is set from the command-line, see [`crate::cli`]). Failed points are
//! logged and left out of the results; the rest of the sweep carries on.
//!
//! The resulting ratios are written to `stdout`, or a file if specified (see [`crate::cli`] for
//! specifying an output file from the command-line).

pub mod build;
pub mod pool;
pub mod simulate;

use crate::{
    cli::{CliArgs, Command, CommonArgs, SweepParam},
    config::{CacheGeometry, RunConfig, Toolchain},
    error::Result,
    kernels::{KernelTemplate, LoopOrder, MATMUL},
    plot,
    report::{self, LineSet, OutputFormat, SeriesSummary, SurfacePoint, SurfaceSet},
    utils::{Deadline, SweepRange},
};

use pool::{run_bounded, SweepOutcome};
use simulate::cold_misses;

use std::fmt::Display;

/// Builds and measures a single configuration in its own scoped directory.
///
/// The build and the simulation share one `tools.timeout` budget.
pub fn measure(kernel: &KernelTemplate, config: &RunConfig, tools: &Toolchain) -> Result<f64> {
    let deadline = Deadline::after(tools.timeout);
    let dir = tempfile::Builder::new().prefix("loopcache").tempdir()?;

    let binary = build::build(kernel, config, dir.path(), tools, &deadline)?;
    let counters = simulate::simulate(&binary, &config.geometry, tools, &deadline)?;

    let cold = if config.remove_cold {
        cold_misses(config.m, config.n, config.geometry.block)
    } else {
        0.0
    };
    let ratio = counters.miss_ratio(cold);
    if ratio < 0.0 {
        log::warn!(
            "negative miss ratio {ratio} for {}x{} {}: \
             cold-miss estimate {cold} exceeds measured misses",
            config.m,
            config.n,
            config.order
        );
    }
    log::debug!(
        "{} M={} N={} D1={}: {:?} -> {ratio}",
        config.order,
        config.m,
        config.n,
        config.geometry,
        counters
    );
    Ok(ratio)
}

/// Entry point: dispatches the parsed command-line.
pub fn dispatch(args: CliArgs) -> Result<()> {
    let tools = args.toolchain();
    let output_file = args.output_file.as_deref();

    match args.command {
        Command::Run { common } => {
            let ratio = measure(&MATMUL, &single_config(&common)?, &tools)?;
            let mut output = report::open_output(output_file)?;
            writeln_ratio(&mut output, ratio)
        }
        Command::Sweep {
            common,
            param,
            start,
            end,
            step,
            batch,
            format,
        } => {
            let range = SweepRange::inclusive(start, end, step);
            let results = sweep(&common, param, range, batch, &tools)?;
            let mut output = report::open_output(output_file)?;
            match format {
                OutputFormat::Csv => report::write_csv(&mut output, &results),
                OutputFormat::Json => report::write_json(&mut output, &results),
            }
        }
        Command::Orders {
            elem_type,
            cache,
            block,
            assoc,
            m_range,
            n_range,
            batch,
            order,
            remove_cold,
        } => {
            let geometry = CacheGeometry::new(cache, block, assoc);
            let base = RunConfig::square(&elem_type, 0, geometry, LoopOrder::IJK)
                .with_remove_cold(remove_cold);
            let results = orders(
                &base,
                &LoopOrder::parse_list(&order)?,
                SweepRange::from_triple(&m_range)?,
                SweepRange::from_triple(&n_range)?,
                batch,
                &tools,
            )?;
            let mut output = report::open_output(output_file)?;
            report::write_json(&mut output, &results)
        }
        Command::Plot { input, output } => {
            let set = plot::load(input.as_deref())?;
            plot::render(&set, &output)
        }
    }
}

fn writeln_ratio(output: &mut dyn std::io::Write, ratio: f64) -> Result<()> {
    writeln!(output, "{ratio}")?;
    Ok(())
}

fn single_config(common: &CommonArgs) -> Result<RunConfig> {
    let order: LoopOrder = common.order.parse()?;
    let geometry = CacheGeometry::new(common.cache, common.block, common.assoc);
    Ok(RunConfig::square(&common.elem_type, common.size, geometry, order)
        .with_remove_cold(common.remove_cold))
}

/// Configurations of a one-dimensional sweep, keyed by swept value.
pub fn sweep_points(
    common: &CommonArgs,
    param: SweepParam,
    range: SweepRange,
) -> Result<Vec<(usize, RunConfig)>> {
    let base = single_config(common)?;
    Ok(range
        .values()
        .into_iter()
        .map(|value| {
            let mut config = base.clone();
            match param {
                SweepParam::Cache => {
                    config.geometry = CacheGeometry::new(value, common.block, common.assoc);
                }
                SweepParam::Size => {
                    config.m = value;
                    config.n = value;
                }
            }
            (value, config)
        })
        .collect())
}

/// One-dimensional sweep over the cache size or the matrix size.
pub fn sweep(
    common: &CommonArgs,
    param: SweepParam,
    range: SweepRange,
    width: usize,
    tools: &Toolchain,
) -> Result<LineSet> {
    let points = sweep_points(common, param, range)?;
    log::info!("sweeping {param} over {} points, {width} at a time", points.len());

    let outcome = run_bounded(width, points, |(_, config)| measure(&MATMUL, config, tools))?;
    let outcome = strip_configs(outcome);
    log_outcome(param, &outcome);

    Ok(outcome.results.into_iter().collect())
}

/// `(M, N)` configurations of a two-dimensional sweep, `M` varying slowest.
pub fn surface_points(
    base: &RunConfig,
    order: LoopOrder,
    ms: SweepRange,
    ns: SweepRange,
) -> Vec<RunConfig> {
    let ns = ns.values();
    ms.values()
        .into_iter()
        .flat_map(|m| {
            ns.iter().map(move |&n| RunConfig {
                m,
                n,
                order,
                ..base.clone()
            })
        })
        .collect()
}

/// Two-dimensional `(M, N)` sweep, repeated for every requested loop order.
pub fn orders(
    base: &RunConfig,
    orders: &[LoopOrder],
    ms: SweepRange,
    ns: SweepRange,
    width: usize,
    tools: &Toolchain,
) -> Result<SurfaceSet> {
    let mut set = SurfaceSet::default();
    for &order in orders {
        let points = surface_points(base, order, ms, ns);
        log::info!("loop order {order}: {} points, {width} at a time", points.len());

        let outcome = run_bounded(width, points, |config| measure(&MATMUL, config, tools))?;
        let outcome = SweepOutcome {
            results: outcome
                .results
                .into_iter()
                .map(|(c, r)| ((c.m, c.n), r))
                .collect(),
            failures: outcome
                .failures
                .into_iter()
                .map(|(c, e)| ((c.m, c.n), e))
                .collect(),
        };
        log_outcome(order, &outcome);

        let surface = outcome
            .results
            .into_iter()
            .map(|((m, n), r)| SurfacePoint(m, n, r))
            .collect();
        set.push(order.to_string(), surface);
    }
    Ok(set)
}

fn strip_configs(outcome: SweepOutcome<(usize, RunConfig)>) -> SweepOutcome<usize> {
    SweepOutcome {
        results: outcome.results.into_iter().map(|((k, _), r)| (k, r)).collect(),
        failures: outcome.failures.into_iter().map(|((k, _), e)| (k, e)).collect(),
    }
}

fn log_outcome<K: std::fmt::Debug>(name: impl Display, outcome: &SweepOutcome<K>) {
    for (key, err) in &outcome.failures {
        let kind = if err.is_build_failure() { "build" } else { "measurement" };
        log::error!("{name} {key:?}: {kind} failed: {err}");
    }
    let ratios: Vec<f64> = outcome.results.iter().map(|(_, r)| *r).collect();
    log::info!(
        "{}",
        SeriesSummary::new(name.to_string(), &ratios, outcome.failures.len())
    );
}


#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::SweepError;
    use test_tools::{fake_compiler, fake_simulator, script};

    use std::{
        path::Path,
        time::{Duration, Instant},
    };

    fn common() -> CommonArgs {
        CommonArgs {
            elem_type: "double".into(),
            size: 16,
            cache: 1024,
            block: 32,
            assoc: None,
            remove_cold: false,
            order: "IJK".into(),
        }
    }

    fn tools(bin: &Path, refs: u64, misses: u64) -> Toolchain {
        Toolchain {
            compiler: fake_compiler(bin),
            simulator: fake_simulator(bin, refs, misses),
            ..Default::default()
        }
    }

    #[test]
    fn single_measurement() {
        let bin = tempfile::tempdir().unwrap();
        let tools = tools(bin.path(), 1000, 200);
        let config = single_config(&common()).unwrap();

        let ratio = measure(&MATMUL, &config, &tools).unwrap();
        assert!((ratio - 0.2).abs() < 1e-12);

        // 3 * 16 * 16 / 32 = 24 cold misses
        let ratio = measure(&MATMUL, &config.with_remove_cold(true), &tools).unwrap();
        assert!((ratio - 0.176).abs() < 1e-12);
    }

    #[test]
    fn cache_sweep_points() {
        let range = SweepRange::inclusive(256, 1024, 256);
        let points = sweep_points(&common(), SweepParam::Cache, range).unwrap();
        let keys: Vec<usize> = points.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, [256, 512, 768, 1024]);
        for (size, config) in &points {
            assert_eq!(config.geometry.size, *size);
            assert_eq!(config.geometry.assoc, size / 32);
        }

        let fixed = CommonArgs {
            assoc: Some(2),
            ..common()
        };
        let range = SweepRange::inclusive(256, 512, 256);
        let points = sweep_points(&fixed, SweepParam::Cache, range).unwrap();
        assert!(points.iter().all(|(_, c)| c.geometry.assoc == 2));
    }

    #[test]
    fn size_sweep_points() {
        let range = SweepRange::inclusive(8, 24, 8);
        let points = sweep_points(&common(), SweepParam::Size, range).unwrap();
        let sizes: Vec<(usize, usize)> = points.iter().map(|(_, c)| (c.m, c.n)).collect();
        assert_eq!(sizes, [(8, 8), (16, 16), (24, 24)]);
    }

    #[test]
    fn cache_sweep_end_to_end() {
        let bin = tempfile::tempdir().unwrap();
        let tools = tools(bin.path(), 1000, 200);

        let results = sweep(
            &common(),
            SweepParam::Cache,
            SweepRange::inclusive(256, 1024, 256),
            2,
            &tools,
        )
        .unwrap();

        let keys: Vec<usize> = results.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, [256, 512, 768, 1024]);
        assert!(results.iter().all(|(_, r)| (0.0..=1.0).contains(r)));
    }

    #[test]
    fn surface_points_cover_the_grid() {
        let base = single_config(&common()).unwrap();
        let points = surface_points(
            &base,
            "KJI".parse().unwrap(),
            SweepRange::half_open(8, 24, 8),
            SweepRange::half_open(4, 12, 4),
        );
        let mn: Vec<(usize, usize)> = points.iter().map(|c| (c.m, c.n)).collect();
        assert_eq!(mn, [(8, 4), (8, 8), (16, 4), (16, 8)]);
        assert!(points.iter().all(|c| c.order.to_string() == "KJI"));
    }

    #[test]
    fn orders_sweep_end_to_end() {
        let bin = tempfile::tempdir().unwrap();
        let tools = tools(bin.path(), 400, 100);
        let base = single_config(&common()).unwrap();

        let set = orders(
            &base,
            &LoopOrder::all(),
            SweepRange::half_open(8, 17, 8),
            SweepRange::half_open(8, 17, 8),
            4,
            &tools,
        )
        .unwrap();

        let names: Vec<&str> = set.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["IJK", "IKJ", "JIK", "JKI", "KIJ", "KJI"]);
        for (_, surface) in set.iter() {
            assert_eq!(
                surface,
                &[
                    SurfacePoint(8, 8, 0.25),
                    SurfacePoint(8, 16, 0.25),
                    SurfacePoint(16, 8, 0.25),
                    SurfacePoint(16, 16, 0.25),
                ]
            );
        }
    }

    #[test]
    fn failing_points_are_left_out() {
        let bin = tempfile::tempdir().unwrap();
        // Compiler that rejects M=16
        let cc = script(
            bin.path(),
            "cc",
            "case \"$*\" in *-DM=16*) echo 'error: M=16' >&2; exit 1;; esac\n\
             for a; do out=$a; done\ntouch \"$out\"",
        );
        let tools = Toolchain {
            compiler: cc,
            simulator: fake_simulator(bin.path(), 1000, 100),
            ..Default::default()
        };

        let results = sweep(
            &common(),
            SweepParam::Size,
            SweepRange::inclusive(8, 24, 8),
            3,
            &tools,
        )
        .unwrap();
        let keys: Vec<usize> = results.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, [8, 24]);
    }

    #[test]
    fn timed_out_point_leaves_siblings_intact() {
        let bin = tempfile::tempdir().unwrap();
        // Simulator that hangs on the 512-byte cache
        let valgrind = script(
            bin.path(),
            "valgrind",
            "case \"$*\" in *--D1=512,*) sleep 30;; esac\n\
             echo 'D refs: 1000' >&2\n\
             echo 'D1 misses: 100' >&2",
        );
        let tools = Toolchain {
            compiler: fake_compiler(bin.path()),
            simulator: valgrind,
            timeout: Duration::from_secs(2),
            ..Default::default()
        };

        let start = Instant::now();
        let results = sweep(
            &common(),
            SweepParam::Cache,
            SweepRange::inclusive(256, 1024, 256),
            4,
            &tools,
        )
        .unwrap();
        assert!(start.elapsed() < Duration::from_secs(20));

        assert_eq!(results.0, [(256, 0.1), (768, 0.1), (1024, 0.1)]);
    }

    #[test]
    fn bad_loop_order_is_rejected_before_running() {
        let common = CommonArgs {
            order: "IIK".into(),
            ..common()
        };
        assert!(matches!(
            single_config(&common),
            Err(SweepError::InvalidOrder(_))
        ));
    }
}
