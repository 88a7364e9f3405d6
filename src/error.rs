use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MsshError {
    #[error("At least one host is required")]
    NoHosts,
    #[error("At least one command is required")]
    NoCommands,
    #[error("No username specified")]
    NoUser,
    #[error("No usable credential found: {0}")]
    NoCredentials(String),
    #[error("Specified key does not exist: {}", .0.display())]
    KeyNotFound(PathBuf),
    #[error("Invalid host address '{0}'")]
    InvalidAddress(String),
    #[error("Failed to open hosts file {}: {source}", path.display())]
    HostsFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse hosts file {}: {source}", path.display())]
    HostsFileFormat {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("Failed to connect to {address} ({attempts} credential(s) tried): {source}")]
    Connect {
        address: String,
        attempts: usize,
        source: openssh::Error,
    },
    #[error("Failed to execute SSH command: {0}")]
    Session(#[source] openssh::Error),
    #[error("Remote command exited with {0}")]
    ExitStatus(std::process::ExitStatus),
}
