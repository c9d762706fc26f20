//! Command-Line Interface related code.
//!
//! This module handles the parsing of CLI arguments using the [`clap`][1] crate.
//! It defines the availables runtime options and subcommands.
//!
//! [1]: https://crates.io/crates/clap

use crate::{config::Toolchain, consts, report::OutputFormat};

use clap::{builder::TypedValueParser, ArgAction, Args, Parser, Subcommand, ValueEnum};

use std::{fmt, path::PathBuf, time::Duration};

/// Cache-miss profiling of matrix multiplication loop orders.
///
/// Generates freestanding matrix multiplication kernels, compiles them with an external C
/// compiler and measures their D1 miss rate under cachegrind, for a single configuration or
/// over sweeps of cache sizes, matrix sizes and loop orders.
#[derive(Clone, Debug, Parser)]
#[command(version)]
pub struct CliArgs {
    /// Command to run.
    #[command(subcommand)]
    pub command: Command,

    /// Output file, defaults to `stdout` if unspecified.
    #[arg(short, long, global = true)]
    pub output_file: Option<PathBuf>,

    /// C compiler used to build the kernels.
    #[arg(long, global = true, env = "LOOPCACHE_CC", default_value = consts::COMPILER)]
    pub cc: PathBuf,

    /// Valgrind executable used for the cache simulation.
    #[arg(long, global = true, env = "LOOPCACHE_VALGRIND", default_value = consts::SIMULATOR)]
    pub valgrind: PathBuf,

    /// Time budget in seconds of each measurement, build and simulation together.
    #[arg(
        long,
        global = true,
        value_name = "SECS",
        default_value_t = consts::PROCESS_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u64).range(1..),
    )]
    pub timeout: u64,

    /// Fail a measurement whose simulator output lacks the reference or miss counter, instead
    /// of reporting a zero miss rate.
    #[arg(long, global = true)]
    pub strict: bool,
}

impl CliArgs {
    /// External tools and limits shared by every measurement.
    pub fn toolchain(&self) -> Toolchain {
        Toolchain {
            compiler: self.cc.clone(),
            simulator: self.valgrind.clone(),
            timeout: Duration::from_secs(self.timeout),
            strict: self.strict,
        }
    }
}

/// Kernel and cache parameters of a square problem.
#[derive(Clone, Debug, PartialEq, Args)]
pub struct CommonArgs {
    /// C type of the matrix elements.
    #[arg(long = "type", value_name = "TYPE", default_value = consts::ELEM_TYPE)]
    pub elem_type: String,

    /// Size of the matrices.
    #[arg(
        short,
        long,
        default_value_t = consts::MATRIX_SIZE,
        value_parser = clap::value_parser!(u64).range(1..).map(|v| v as usize),
    )]
    pub size: usize,

    /// Cache size in bytes.
    #[arg(
        short,
        long,
        default_value_t = consts::CACHE_SIZE,
        value_parser = clap::value_parser!(u64).range(1..).map(|v| v as usize),
    )]
    pub cache: usize,

    /// Cache line (block) size in bytes.
    #[arg(
        short,
        long,
        default_value_t = consts::BLOCK_SIZE,
        value_parser = clap::value_parser!(u64).range(1..).map(|v| v as usize),
    )]
    pub block: usize,

    /// Associativity, defaults to a fully associative cache (cache size / block size).
    #[arg(
        short,
        long,
        value_parser = clap::value_parser!(u64).range(1..).map(|v| v as usize),
    )]
    pub assoc: Option<usize>,

    /// Subtract the estimated cold misses from the miss count.
    #[arg(long)]
    pub remove_cold: bool,

    /// Loop order, outermost loop first (a permutation of IJK).
    #[arg(long, default_value = "IJK")]
    pub order: String,
}

/// Parameter varied by a one-dimensional sweep.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SweepParam {
    /// Cache size in bytes.
    Cache,
    /// Matrix size.
    Size,
}

impl fmt::Display for SweepParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => write!(f, "cache"),
            Self::Size => write!(f, "size"),
        }
    }
}

/// List of available commands.
#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Command {
    /// Measure the D1 miss rate of a single configuration and print it.
    Run {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Sweep the cache size or the matrix size over an inclusive range.
    Sweep {
        #[command(flatten)]
        common: CommonArgs,

        /// Parameter to sweep.
        #[arg(short, long, value_enum)]
        param: SweepParam,

        /// First swept value.
        #[arg(long, required = true)]
        start: usize,

        /// Last swept value (inclusive).
        #[arg(long, required = true)]
        end: usize,

        /// Distance between two swept values.
        #[arg(
            long,
            default_value_t = 1,
            value_parser = clap::value_parser!(u64).range(1..).map(|v| v as usize),
        )]
        step: usize,

        /// Maximum number of points measured concurrently.
        #[arg(
            long,
            default_value_t = consts::BATCH_WIDTH,
            value_parser = clap::value_parser!(u64).range(1..).map(|v| v as usize),
        )]
        batch: usize,

        /// Output encoding.
        #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
        format: OutputFormat,
    },
    /// Sweep `M` and `N` over half-open ranges for one or more loop orders, as JSON.
    Orders {
        /// C type of the matrix elements.
        #[arg(long = "type", value_name = "TYPE", default_value = consts::ELEM_TYPE)]
        elem_type: String,

        /// Cache size in bytes.
        #[arg(
            short,
            long,
            default_value_t = consts::CACHE_SIZE,
            value_parser = clap::value_parser!(u64).range(1..).map(|v| v as usize),
        )]
        cache: usize,

        /// Cache line (block) size in bytes.
        #[arg(
            short,
            long,
            default_value_t = consts::BLOCK_SIZE,
            value_parser = clap::value_parser!(u64).range(1..).map(|v| v as usize),
        )]
        block: usize,

        /// Associativity, defaults to a fully associative cache (cache size / block size).
        #[arg(
            short,
            long,
            value_parser = clap::value_parser!(u64).range(1..).map(|v| v as usize),
        )]
        assoc: Option<usize>,

        /// Range of `M`: start, stop (exclusive) and step.
        #[arg(
            long,
            num_args = 3,
            action = ArgAction::Set,
            value_names = ["START", "STOP", "STEP"],
            default_values_t = consts::MN_RANGE,
        )]
        m_range: Vec<usize>,

        /// Range of `N`: start, stop (exclusive) and step.
        #[arg(
            long,
            num_args = 3,
            action = ArgAction::Set,
            value_names = ["START", "STOP", "STEP"],
            default_values_t = consts::MN_RANGE,
        )]
        n_range: Vec<usize>,

        /// Maximum number of points measured concurrently.
        #[arg(
            long,
            default_value_t = consts::BATCH_WIDTH,
            value_parser = clap::value_parser!(u64).range(1..).map(|v| v as usize),
        )]
        batch: usize,

        /// Comma-separated loop orders (e.g. `IJK,KIJ`), or `ALL` for the six permutations.
        #[arg(long, default_value = "IJK")]
        order: String,

        /// Subtract the estimated cold misses from the miss count.
        #[arg(long)]
        remove_cold: bool,
    },
    /// Render the JSON output of `orders` as 3-D surfaces into an SVG file.
    Plot {
        /// JSON input file, defaults to `stdin` if unspecified.
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// SVG output file.
        #[arg(long, default_value = "misses.svg")]
        output: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn run_defaults() {
        let args = CliArgs::try_parse_from(["loopcache", "run"]).unwrap();
        let Command::Run { common } = args.command else {
            panic!("expected `run`");
        };
        assert_eq!(common.elem_type, "double");
        assert_eq!(common.size, 128);
        assert_eq!(common.cache, 1024);
        assert_eq!(common.block, 32);
        assert_eq!(common.assoc, None);
        assert!(!common.remove_cold);

        let tools = args_toolchain(&["loopcache", "--timeout", "5", "--strict", "run"]);
        assert_eq!(tools.timeout, Duration::from_secs(5));
        assert!(tools.strict);
    }

    fn args_toolchain(argv: &[&str]) -> Toolchain {
        CliArgs::try_parse_from(argv).unwrap().toolchain()
    }

    #[test]
    fn sweep_arguments() {
        let args = CliArgs::try_parse_from([
            "loopcache", "sweep", "--param", "cache", "--start", "256", "--end", "1024",
            "--step", "256", "--remove-cold", "--format", "json", "-o", "out.json",
        ])
        .unwrap();
        assert_eq!(args.output_file, Some(PathBuf::from("out.json")));
        match args.command {
            Command::Sweep {
                common,
                param,
                start,
                end,
                step,
                batch,
                format,
            } => {
                assert!(common.remove_cold);
                assert_eq!(param, SweepParam::Cache);
                assert_eq!((start, end, step, batch), (256, 1024, 256, 128));
                assert_eq!(format, OutputFormat::Json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn orders_arguments() {
        let args = CliArgs::try_parse_from([
            "loopcache", "orders", "--m-range", "8", "65", "8", "--order", "ALL", "--batch", "16",
        ])
        .unwrap();
        match args.command {
            Command::Orders {
                m_range,
                n_range,
                batch,
                order,
                ..
            } => {
                assert_eq!(m_range, [8, 65, 8]);
                assert_eq!(n_range, [8, 257, 8]);
                assert_eq!(batch, 16);
                assert_eq!(order, "ALL");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn zero_sizes_are_rejected() {
        assert!(CliArgs::try_parse_from(["loopcache", "run", "--block", "0"]).is_err());
        assert!(CliArgs::try_parse_from(["loopcache", "orders", "--batch", "0"]).is_err());
        assert!(CliArgs::try_parse_from(["loopcache", "orders", "--m-range", "8", "9"]).is_err());
        assert!(CliArgs::try_parse_from(["loopcache", "run", "--assoc", "0"]).is_err());
        assert!(CliArgs::try_parse_from(["loopcache", "orders", "-a", "0"]).is_err());
    }

    #[test]
    fn repeated_ranges_are_rejected() {
        let res = CliArgs::try_parse_from([
            "loopcache", "orders", "--m-range", "8", "17", "8", "--m-range", "8", "33", "8",
        ]);
        assert!(res.is_err());

        let args = CliArgs::try_parse_from(["loopcache", "run", "-a", "4"]).unwrap();
        let Command::Run { common } = args.command else {
            panic!("expected `run`");
        };
        assert_eq!(common.assoc, Some(4));
    }
}
