//! Utility functions and types.

use crate::{
    consts,
    error::{Result, SweepError},
};

use std::{
    io::Read,
    path::Path,
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

/// Integer range walked by a sweep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SweepRange {
    start: usize,
    end: usize,
    step: usize,
    inclusive: bool,
}

impl SweepRange {
    /// `start..=end` by `step`.
    pub fn inclusive(start: usize, end: usize, step: usize) -> Self {
        Self {
            start,
            end,
            step: step.max(1),
            inclusive: true,
        }
    }

    /// `start..stop` by `step`.
    pub fn half_open(start: usize, stop: usize, step: usize) -> Self {
        Self {
            start,
            end: stop,
            step: step.max(1),
            inclusive: false,
        }
    }

    /// Builds a half-open range from a `[start, stop, step]` triple.
    pub fn from_triple(triple: &[usize]) -> Result<Self> {
        match *triple {
            [start, stop, step] if step > 0 => Ok(Self::half_open(start, stop, step)),
            _ => Err(SweepError::InvalidRange(format!("{triple:?}"))),
        }
    }

    pub fn values(&self) -> Vec<usize> {
        if self.inclusive {
            (self.start..=self.end).step_by(self.step).collect()
        } else {
            (self.start..self.end).step_by(self.step).collect()
        }
    }
}

/// Time budget shared by every external process of one measurement.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    /// `None` when the budget overflows the clock.
    at: Option<Instant>,
    budget: Duration,
}

impl Deadline {
    /// Deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(budget),
            budget,
        }
    }

    pub fn expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }
}

/// Captured result of an external tool that ran to completion.
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stderr: String,
}

/// Runs `cmd` in `cwd`, draining its stderr, and kills it if it outlives `deadline`.
///
/// Stdout is discarded. The stderr pipe is read on a helper thread so that a chatty tool can
/// never block on a full pipe while the deadline is being polled. On Unix the tool runs in its
/// own process group, so that killing it also takes down the processes it spawned.
pub fn run_tool(mut cmd: Command, cwd: &Path, deadline: &Deadline) -> Result<ToolOutput> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    log::trace!("running {cmd:?} in {}", cwd.display());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let mut child = cmd
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| SweepError::Spawn {
            program: program.clone(),
            source,
        })?;

    let mut pipe = child.stderr.take();
    let drain = thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(pipe) = pipe.as_mut() {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    });

    let poll_interval = Duration::from_millis(consts::POLL_INTERVAL_MS);
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if deadline.expired() => {
                terminate(&mut child);
                return Err(SweepError::Timeout {
                    program,
                    after: deadline.budget(),
                });
            }
            Ok(None) => thread::sleep(poll_interval),
            Err(e) => {
                terminate(&mut child);
                return Err(e.into());
            }
        }
    };

    let stderr = drain.join().unwrap_or_default();
    Ok(ToolOutput { status, stderr })
}

/// Kills `child` and its process group, then reaps it.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        // The group id is the child's pid, which stays reserved until it is reaped below
        let group = -(child.id() as libc::pid_t);
        if unsafe { libc::kill(group, libc::SIGKILL) } != 0 {
            let _ = child.kill();
        }
    }
    #[cfg(not(unix))]
    let _ = child.kill();

    let _ = child.wait();
}

/// Parses an integer written with `,` thousands separators, e.g. `12,345`.
pub fn parse_grouped(token: &str) -> Option<u64> {
    let digits: String = token.chars().filter(|&c| c != ',').collect();
    digits.parse().ok()
}
