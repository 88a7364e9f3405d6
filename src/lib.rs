//! mssh: run SSH commands on multiple machines.

// Serde helper module.
mod serde;
// Command line arguments and run options.
pub mod config;
// Error handling.
pub mod error;
// How to parse and represent hosts.
pub mod host;
// Where credentials come from.
pub mod auth;
// SSH command execution.
pub mod session;
// Output tail.
pub mod truncate;
// Per-host command loop.
pub mod worker;
// Concurrent fan-out and fail-fast.
pub mod dispatcher;
// Presentation.
pub mod report;

pub use auth::{resolve_auth_methods, AuthMethod};
pub use config::{Config, RunOptions};
pub use dispatcher::{Dispatcher, RunResult};
pub use error::MsshError;
pub use host::{normalize_address, read_hosts_file, resolve_hosts, HostEntry, HostTarget};
pub use report::{ConsoleReporter, Reporter};
pub use session::{HostKeyPolicy, RemoteExecutor, RemoteOutput, SshExecutor};
pub use truncate::truncate;
pub use worker::{ExecutionOutcome, HostWorker};
