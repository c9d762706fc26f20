//! Bounded worker pool for sweep units.
//!
//! Units are independent: each one owns its working directory and its external processes, so
//! the pool only has to cap how many run at the same time. Work is pulled by `rayon` workers as
//! they free up, so concurrency stays at the pool width until the queue drains.

use crate::error::{Result, SweepError};

use rayon::prelude::*;

/// Outcome of a sweep: successful results and isolated failures, both in generation order.
#[derive(Debug)]
pub struct SweepOutcome<K> {
    pub results: Vec<(K, f64)>,
    pub failures: Vec<(K, SweepError)>,
}

/// Runs `unit` over every key on at most `width` worker threads.
///
/// A failing unit does not affect its siblings: its error is recorded under its key.
pub fn run_bounded<K, F>(width: usize, keys: Vec<K>, unit: F) -> Result<SweepOutcome<K>>
where
    K: Send,
    F: Fn(&K) -> Result<f64> + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(width.max(1))
        .thread_name(|i| format!("sweep-{i}"))
        .build()?;

    let done: Vec<(K, Result<f64>)> = pool.install(|| {
        keys.into_par_iter()
            .map(|key| {
                let res = unit(&key);
                (key, res)
            })
            .collect()
    });

    let mut outcome = SweepOutcome {
        results: Vec::with_capacity(done.len()),
        failures: Vec::new(),
    };
    for (key, res) in done {
        match res {
            Ok(ratio) => outcome.results.push((key, ratio)),
            Err(e) => outcome.failures.push((key, e)),
        }
    }
    Ok(outcome)
}
