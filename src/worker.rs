//! Per-host command loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::RunOptions;
use crate::error::MsshError;
use crate::host::HostTarget;
use crate::session::{RemoteExecutor, RemoteOutput};
use crate::truncate::truncate;

/// The result of running one command on one host. Written once, never changed.
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub host: Arc<HostTarget>,
    /// Position of the host in the run's host list.
    pub host_index: usize,
    pub command: String,
    pub combined_output: String,
    /// `combined_output` cut down to the run's line limit.
    pub truncated_output: String,
    /// Why the command failed, if it did.
    pub failure: Option<MsshError>,
}

impl ExecutionOutcome {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Drives one host through the whole command list, one command at a time.
pub struct HostWorker<E: ?Sized> {
    host_index: usize,
    host: Arc<HostTarget>,
    commands: Arc<[String]>,
    executor: Arc<E>,
    options: RunOptions,
    /// Raised by the dispatcher when draining after a fail-fast failure.
    abort: Arc<AtomicBool>,
}

impl<E: RemoteExecutor + ?Sized> HostWorker<E> {
    pub fn new(
        host_index: usize,
        host: HostTarget,
        commands: Arc<[String]>,
        executor: Arc<E>,
        options: RunOptions,
        abort: Arc<AtomicBool>,
    ) -> Self {
        Self {
            host_index,
            host: Arc::new(host),
            commands,
            executor,
            options,
            abort,
        }
    }

    /// Runs every command in list order and sends one outcome per command.
    ///
    /// Stops early when the abort flag is up at a command boundary, when its own command fails
    /// under fail-fast, or when nobody is listening for outcomes anymore.
    pub async fn run(self, outcome_tx: flume::Sender<ExecutionOutcome>) {
        for command in self.commands.iter() {
            if self.abort.load(Ordering::SeqCst) {
                tracing::debug!("{} Run is aborting, not starting '{}'", self.host, command);
                break;
            }

            tracing::debug!("{} === run '{}' ===", self.host, command);
            let RemoteOutput { combined, error } = self.executor.execute(&self.host, command).await;
            let truncated_output = truncate(&combined, self.options.max_output_lines).to_string();
            let outcome = ExecutionOutcome {
                host: Arc::clone(&self.host),
                host_index: self.host_index,
                command: command.clone(),
                combined_output: combined,
                truncated_output,
                failure: error,
            };
            let failed = !outcome.succeeded();

            if outcome_tx.send(outcome).is_err() {
                break;
            }
            if failed && self.options.fail_fast {
                break;
            }
        }
        tracing::debug!("{} Worker done", self.host);
    }
}
