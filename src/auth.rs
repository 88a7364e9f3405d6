//! Credential resolution.
//!
//! `--key` overrides everything. Without it, a running ssh-agent is used if `SSH_AUTH_SOCK`
//! is set, and otherwise the default key `~/.ssh/id_rsa` (or `~/ssh/id_rsa`).

use std::path::{Path, PathBuf};

use crate::error::MsshError;

const SSH_AUTH_SOCK_VAR: &str = "SSH_AUTH_SOCK";

/// One way of authenticating to a remote host. Offered to the host in list order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// A private key file on disk.
    KeyFile(PathBuf),
    /// An ssh-agent listening on this socket.
    Agent(PathBuf),
}

/// Resolves credentials from the process environment.
pub fn resolve_auth_methods(keys: &[PathBuf]) -> Result<Vec<AuthMethod>, MsshError> {
    let agent_sock = std::env::var_os(SSH_AUTH_SOCK_VAR).map(PathBuf::from);
    resolve_auth_methods_with(keys, agent_sock.as_deref(), dirs::home_dir().as_deref())
}

/// Resolution with the agent socket and home directory supplied explicitly.
pub fn resolve_auth_methods_with(
    keys: &[PathBuf],
    agent_sock: Option<&Path>,
    home: Option<&Path>,
) -> Result<Vec<AuthMethod>, MsshError> {
    if !keys.is_empty() {
        return keys
            .iter()
            .map(|key| {
                if key.is_file() {
                    Ok(AuthMethod::KeyFile(key.clone()))
                } else {
                    Err(MsshError::KeyNotFound(key.clone()))
                }
            })
            .collect();
    }

    if let Some(sock) = agent_sock.filter(|sock| !sock.as_os_str().is_empty()) {
        tracing::info!("Attempting to use existing ssh-agent at {}", sock.display());
        return Ok(vec![AuthMethod::Agent(sock.to_path_buf())]);
    }

    let home = home.ok_or_else(|| {
        MsshError::NoCredentials("no --key given, no ssh-agent, and no home directory".into())
    })?;
    default_key_paths(home)
        .into_iter()
        .find(|path| path.is_file())
        .map(|path| {
            tracing::debug!("Using default key {}", path.display());
            vec![AuthMethod::KeyFile(path)]
        })
        .ok_or_else(|| {
            MsshError::NoCredentials(format!(
                "no --key given, no ssh-agent, and no id_rsa under {}",
                home.display()
            ))
        })
}

fn default_key_paths(home: &Path) -> [PathBuf; 2] {
    [
        home.join(".ssh").join("id_rsa"),
        home.join("ssh").join("id_rsa"),
    ]
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_explicit_keys_win() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, "key").unwrap();
        fs::write(&b, "key").unwrap();

        let auths = resolve_auth_methods_with(
            &[a.clone(), b.clone()],
            Some(Path::new("/tmp/agent.sock")),
            Some(dir.path()),
        )
        .unwrap();
        assert_eq!(auths, vec![AuthMethod::KeyFile(a), AuthMethod::KeyFile(b)]);
    }

    #[test]
    fn test_missing_explicit_key() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let err = resolve_auth_methods_with(&[missing.clone()], None, None).unwrap_err();
        assert!(matches!(err, MsshError::KeyNotFound(path) if path == missing));
    }

    #[test]
    fn test_agent_before_default_key() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(".ssh")).unwrap();
        fs::write(dir.path().join(".ssh").join("id_rsa"), "key").unwrap();

        let sock = Path::new("/tmp/agent.sock");
        let auths = resolve_auth_methods_with(&[], Some(sock), Some(dir.path())).unwrap();
        assert_eq!(auths, vec![AuthMethod::Agent(sock.to_path_buf())]);
    }

    #[test]
    fn test_empty_agent_socket_is_ignored() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(".ssh")).unwrap();
        let key = dir.path().join(".ssh").join("id_rsa");
        fs::write(&key, "key").unwrap();

        let auths = resolve_auth_methods_with(&[], Some(Path::new("")), Some(dir.path())).unwrap();
        assert_eq!(auths, vec![AuthMethod::KeyFile(key)]);
    }

    #[test]
    fn test_fallback_default_key_location() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("ssh")).unwrap();
        let key = dir.path().join("ssh").join("id_rsa");
        fs::write(&key, "key").unwrap();

        let auths = resolve_auth_methods_with(&[], None, Some(dir.path())).unwrap();
        assert_eq!(auths, vec![AuthMethod::KeyFile(key)]);
    }

    #[test]
    fn test_no_usable_credential() {
        let dir = TempDir::new().unwrap();
        let err = resolve_auth_methods_with(&[], None, Some(dir.path())).unwrap_err();
        assert!(matches!(err, MsshError::NoCredentials(_)));
        assert!(err.to_string().starts_with("No usable credential found"));
    }
}
