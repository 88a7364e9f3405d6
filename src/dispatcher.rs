//! Fan-out of a command list over many hosts.
//!
//! One worker task is spawned per host, all at once, with no cap on how many run together.
//! Each worker runs the commands sequentially and hands every outcome to the dispatcher over a
//! channel. Outcomes of one host arrive in command order; outcomes of different hosts
//! interleave arbitrarily.
//!
//! With fail-fast on, the first failed outcome ends the run. By default the remaining workers
//! are aborted on the spot: their remote sessions are dropped mid-flight (which still shuts the
//! SSH master down), their outcomes are never reported, and the run result says it was aborted.
//! With `drain_on_fail`, workers instead stop at their next command boundary and in-flight
//! commands are still reported.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;

use crate::config::RunOptions;
use crate::error::MsshError;
use crate::host::HostTarget;
use crate::report::Reporter;
use crate::session::RemoteExecutor;
use crate::worker::{ExecutionOutcome, HostWorker};

/// Exit status of a run that finished, however many commands failed.
pub const EXIT_OK: u8 = 0;
/// Exit status of a run ended by fail-fast.
pub const EXIT_ABORTED: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Running,
    Aborting,
    Complete,
}

/// Everything a run produced.
#[derive(Debug)]
pub struct RunResult {
    /// Outcomes in the order the dispatcher received them.
    pub outcomes: Vec<ExecutionOutcome>,
    /// Whether fail-fast ended the run early.
    pub aborted: bool,
}

impl RunResult {
    /// Zero unless fail-fast fired. Failed commands alone do not make this non-zero.
    pub fn exit_code(&self) -> u8 {
        if self.aborted {
            EXIT_ABORTED
        } else {
            EXIT_OK
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &ExecutionOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.succeeded())
    }
}

pub struct Dispatcher<E: ?Sized> {
    executor: Arc<E>,
    options: RunOptions,
}

impl<E: RemoteExecutor + ?Sized + 'static> Dispatcher<E> {
    pub fn new(executor: Arc<E>, options: RunOptions) -> Self {
        Self { executor, options }
    }

    /// Runs every command on every host and reports each outcome to `reporter`.
    ///
    /// Fails only if there is nothing to run; per-command failures are part of the result.
    pub async fn run<R: Reporter + ?Sized>(
        &self,
        hosts: Vec<HostTarget>,
        commands: Vec<String>,
        reporter: &mut R,
    ) -> Result<RunResult, MsshError> {
        if hosts.is_empty() {
            return Err(MsshError::NoHosts);
        }
        if commands.is_empty() || commands.iter().any(|c| c.trim().is_empty()) {
            return Err(MsshError::NoCommands);
        }

        let num_hosts = hosts.len();
        let commands: Arc<[String]> = commands.into();
        let expected = num_hosts * commands.len();

        // MPSC channel for workers to hand outcomes to the join loop below.
        let (outcome_tx, outcome_rx) = flume::unbounded::<ExecutionOutcome>();
        let abort = Arc::new(AtomicBool::new(false));

        let mut tasks = Vec::with_capacity(num_hosts);
        for (host_index, host) in hosts.into_iter().enumerate() {
            let worker = HostWorker::new(
                host_index,
                host,
                Arc::clone(&commands),
                Arc::clone(&self.executor),
                self.options,
                Arc::clone(&abort),
            );
            tasks.push(tokio::spawn(worker.run(outcome_tx.clone())));
        }
        // After this, the channel disconnects once every worker is done.
        drop(outcome_tx);
        tracing::info!(
            "Dispatching {} command(s) to {} host(s)",
            commands.len(),
            num_hosts
        );

        let mut state = RunState::Running;
        let mut outcomes = Vec::with_capacity(expected);
        while let Ok(outcome) = outcome_rx.recv_async().await {
            reporter.report(&outcome);
            let failed = !outcome.succeeded();
            outcomes.push(outcome);

            if failed && self.options.fail_fast && state == RunState::Running {
                state = RunState::Aborting;
                if let Some(failed) = outcomes.last() {
                    tracing::warn!("{} '{}' failed, aborting run", failed.host, failed.command);
                    reporter.aborting(failed);
                }
                if self.options.drain_on_fail {
                    abort.store(true, Ordering::SeqCst);
                } else {
                    // In-flight sessions are dropped, not drained.
                    for task in &tasks {
                        task.abort();
                    }
                    break;
                }
            }
        }

        // Aborted workers resolve once their futures (and SSH sessions) are dropped, so
        // waiting here only waits for teardown. Panics are surfaced.
        for (host_index, joined) in join_all(tasks).await.into_iter().enumerate() {
            match joined {
                Err(e) if e.is_cancelled() => {
                    tracing::debug!("Worker for host #{} abandoned", host_index);
                }
                Err(e) => {
                    tracing::error!("Worker for host #{} did not finish: {}", host_index, e);
                }
                Ok(()) => {}
            }
        }

        if state == RunState::Running {
            state = RunState::Complete;
            if outcomes.len() != expected {
                tracing::warn!(
                    "Expected {} outcomes but received {}",
                    expected,
                    outcomes.len()
                );
            }
        }
        tracing::info!(
            "Run finished ({:?}): {} outcome(s), {} failed",
            state,
            outcomes.len(),
            outcomes.iter().filter(|o| !o.succeeded()).count()
        );

        Ok(RunResult {
            outcomes,
            aborted: state == RunState::Aborting,
        })
    }
}
