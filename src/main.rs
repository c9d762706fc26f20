//! loopcache - Loop-order cache-miss profiling
//!
//! # About
//! loopcache measures how the nesting order of the three loops of a matrix multiplication, the
//! matrix dimensions and the geometry of the data cache affect the D1 miss rate. Every
//! configuration is compiled into a tiny freestanding binary and run under [cachegrind][1],
//! whose cache simulator is taken as ground truth.
//!
//! Measurements can be taken one at a time, or swept:
//! - over the cache size or the matrix size (`sweep`), printed as `key,value` lines or JSON;
//! - over `(M, N)` for any subset of the six loop orders (`orders`), printed as JSON and
//!   renderable as 3-D surfaces (`plot`).
//!
//! # Quickstart
//! ## Pre-requisites
//! Make sure `clang` and [Valgrind][2] are installed and in your `PATH`, or point to them with
//! `--cc`/`--valgrind` (or the `LOOPCACHE_CC`/`LOOPCACHE_VALGRIND` environment variables).
//! Kernels are built with `-static -nostdlib` and issue a raw `exit` syscall, so an x86-64
//! Linux host is required.
//!
//! ## Build
//! ```sh
//! cargo build --release
//! ```
//!
//! ## Help
//! ```sh
//! cargo run -- help
//!
//! Cache-miss profiling of matrix multiplication loop orders.
//!
//! Usage: loopcache [OPTIONS] <COMMAND>
//!
//! Commands:
//!   run     Measure the D1 miss rate of a single configuration and print it
//!   sweep   Sweep the cache size or the matrix size over an inclusive range
//!   orders  Sweep `M` and `N` over half-open ranges for one or more loop orders, as JSON
//!   plot    Render the JSON output of `orders` as 3-D surfaces into an SVG file
//!   help    Print this message or the help of the given subcommand(s)
//! ```
//!
//! ## Example runs
//! Miss rate of a 128x128 DGEMM in a 1 KiB fully associative cache:
//! ```sh
//! cargo run --release -- run --size 128 --cache 1024 --block 32
//! ```
//! Every loop order over `M, N` in `8..=256`, then plotted:
//! ```sh
//! cargo run --release -- orders --order ALL -o orders.json
//! cargo run --release -- plot --input orders.json --output misses.svg
//! ```
//!
//! Logging goes to `stderr` and is controlled with `RUST_LOG` (defaults to `info`).
//!
//! [1]: https://valgrind.org/docs/manual/cg-manual.html
//! [2]: https://valgrind.org/

pub mod cli;
pub mod config;
pub mod consts;
pub mod drivers;
pub mod error;
pub mod kernels;
pub mod plot;
pub mod report;
pub mod utils;

use crate::cli::CliArgs;

use clap::Parser;

use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CliArgs::parse();
    match drivers::dispatch(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
