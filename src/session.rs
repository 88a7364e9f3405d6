//! Running one command on one host.
//!
//! Every call opens its own SSH connection and closes it before returning, so running
//! several commands on the same host pays the connection setup cost each time.

use std::time::Duration;

use async_trait::async_trait;
use clap::ValueEnum;
use openssh::{KnownHosts, Session as SSHSession, SessionBuilder};

use crate::auth::AuthMethod;
use crate::error::MsshError;
use crate::host::HostTarget;

/// What came back from running a command remotely.
#[derive(Debug)]
pub struct RemoteOutput {
    /// Stdout and stderr, in the order the remote shell wrote them.
    pub combined: String,
    /// `None` if the command ran and exited with status zero.
    pub error: Option<MsshError>,
}

impl RemoteOutput {
    pub fn success(combined: impl Into<String>) -> Self {
        Self {
            combined: combined.into(),
            error: None,
        }
    }

    pub fn failure(combined: impl Into<String>, error: MsshError) -> Self {
        Self {
            combined: combined.into(),
            error: Some(error),
        }
    }
}

/// Runs a single command against a single host.
///
/// Implementations never fail with `Err`: connection, authentication and session errors
/// are all reported through `RemoteOutput::error`.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn execute(&self, host: &HostTarget, command: &str) -> RemoteOutput;
}

/// Host key checking policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum HostKeyPolicy {
    /// Refuse hosts not already in known_hosts.
    Strict,
    /// Add unknown hosts to known_hosts, refuse changed keys.
    #[default]
    Add,
    /// Accept any host key.
    Accept,
}

impl From<HostKeyPolicy> for KnownHosts {
    fn from(policy: HostKeyPolicy) -> Self {
        match policy {
            HostKeyPolicy::Strict => KnownHosts::Strict,
            HostKeyPolicy::Add => KnownHosts::Add,
            HostKeyPolicy::Accept => KnownHosts::Accept,
        }
    }
}

/// `RemoteExecutor` backed by the system OpenSSH client.
#[derive(Debug, Clone, Default)]
pub struct SshExecutor {
    host_key_policy: HostKeyPolicy,
    connect_timeout: Option<Duration>,
}

impl SshExecutor {
    pub fn new(host_key_policy: HostKeyPolicy, connect_timeout: Option<Duration>) -> Self {
        Self {
            host_key_policy,
            connect_timeout,
        }
    }

    /// Offers each credential in turn and keeps the first session that comes up.
    ///
    /// Only an authentication rejection moves on to the next credential. Any other connect
    /// error is returned right away, so an unreachable host is dialed once.
    async fn connect(&self, host: &HostTarget) -> Result<SSHSession, MsshError> {
        let mut attempts = 0;
        let mut last_error = None;
        for method in host.auth_methods() {
            attempts += 1;
            let mut builder = SessionBuilder::default();
            builder
                .user(host.user().to_string())
                .port(host.port())
                .known_hosts_check(self.host_key_policy.into());
            if let Some(timeout) = self.connect_timeout {
                builder.connect_timeout(timeout);
            }
            match method {
                AuthMethod::KeyFile(path) => {
                    builder.keyfile(path);
                }
                AuthMethod::Agent(sock) => {
                    builder.ssh_auth_sock(sock);
                }
            }
            match builder.connect_mux(host.hostname()).await {
                Ok(session) => {
                    tracing::debug!("{} Connected with {:?}", host, method);
                    return Ok(session);
                }
                Err(e) if is_auth_rejection(&e) => {
                    tracing::debug!("{} Credential {:?} rejected: {}", host, method, e);
                    last_error = Some(e);
                }
                Err(e) => {
                    tracing::debug!("{} Failed to connect with {:?}: {}", host, method, e);
                    last_error = Some(e);
                    break;
                }
            }
        }
        match last_error {
            Some(source) => Err(MsshError::Connect {
                address: host.address().to_string(),
                attempts,
                source,
            }),
            None => Err(MsshError::NoCredentials(host.to_string())),
        }
    }
}

/// ssh reports "Permission denied" when every identity it offered was refused.
fn is_auth_rejection(error: &openssh::Error) -> bool {
    matches!(error, openssh::Error::Connect(e) if e.kind() == std::io::ErrorKind::PermissionDenied)
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn execute(&self, host: &HostTarget, command: &str) -> RemoteOutput {
        let session = match self.connect(host).await {
            Ok(session) => session,
            Err(e) => return RemoteOutput::failure(String::new(), e),
        };

        // Let the remote shell merge stderr into stdout so the interleaving is its own.
        let result = session.shell(format!("exec 2>&1; {}", command)).output().await;

        let closed = session.close().await;
        if let Err(e) = &closed {
            tracing::warn!("{} Error while terminating: {}", host, e);
        }

        match result {
            Ok(output) => {
                let combined = String::from_utf8_lossy(&output.stdout).into_owned();
                if output.status.success() {
                    RemoteOutput::success(combined)
                } else {
                    RemoteOutput::failure(combined, MsshError::ExitStatus(output.status))
                }
            }
            Err(e) => RemoteOutput::failure(String::new(), MsshError::Session(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::net::TcpListener;
    use std::path::PathBuf;
    use std::sync::Arc;

    use super::*;

    /// A local port nothing listens on.
    fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn executor() -> SshExecutor {
        SshExecutor::new(HostKeyPolicy::Accept, Some(Duration::from_secs(5)))
    }

    #[test]
    fn test_permission_denied_is_auth_rejection() {
        let denied = openssh::Error::Connect(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "Permission denied (publickey)",
        ));
        let refused = openssh::Error::Connect(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "Connection refused",
        ));
        assert!(is_auth_rejection(&denied));
        assert!(!is_auth_rejection(&refused));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_a_failed_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let keys: Vec<AuthMethod> = ["a", "b", "c"]
            .iter()
            .map(|name| {
                let path: PathBuf = dir.path().join(name);
                std::fs::write(&path, "not a key").unwrap();
                AuthMethod::KeyFile(path)
            })
            .collect();
        let address = format!("127.0.0.1:{}", closed_port());
        let host = HostTarget::new("nobody", &address, Arc::from(keys)).unwrap();

        let output = executor().execute(&host, "true").await;

        assert!(output.combined.is_empty());
        match output.error {
            Some(MsshError::Connect {
                address: failed_address,
                attempts,
                ..
            }) => {
                assert_eq!(failed_address, address);
                // A refused connection is not redialed for the remaining keys.
                assert_eq!(attempts, 1);
            }
            other => panic!("expected a connect error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_agent_credential_is_dialed() {
        let dir = tempfile::TempDir::new().unwrap();
        let sock = dir.path().join("agent.sock");
        let address = format!("127.0.0.1:{}", closed_port());
        let host = HostTarget::new(
            "nobody",
            &address,
            Arc::from(vec![AuthMethod::Agent(sock)]),
        )
        .unwrap();

        let output = executor().execute(&host, "true").await;

        assert!(matches!(
            output.error,
            Some(MsshError::Connect { attempts: 1, .. })
        ));
    }
}
