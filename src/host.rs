//! SSH hosts.
//!
//! One `HostTarget` is created for each target machine. Each target is driven by its own
//! worker task, concurrently with every other target, and owns its target for the whole run.

use std::fmt;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use void::Void;

use crate::auth::AuthMethod;
use crate::error::MsshError;

/// Port appended to addresses that do not name one.
pub const DEFAULT_PORT: u16 = 22;

/// A resolved remote endpoint: login user, `host:port` address and the credentials to offer.
#[derive(Debug, Clone)]
pub struct HostTarget {
    user: String,
    /// Always `host:port` (or `[v6addr]:port`).
    address: String,
    hostname: String,
    port: u16,
    auth_methods: Arc<[AuthMethod]>,
}

impl HostTarget {
    /// Builds a target from a raw `host[:port]` string, appending the default port if needed.
    pub fn new(
        user: impl Into<String>,
        raw_address: &str,
        auth_methods: Arc<[AuthMethod]>,
    ) -> Result<Self, MsshError> {
        let user = user.into();
        if user.is_empty() {
            return Err(MsshError::NoUser);
        }
        if auth_methods.is_empty() {
            return Err(MsshError::NoCredentials(
                "empty credential list".to_string(),
            ));
        }
        let address = normalize_address(raw_address)?;
        let (hostname, port) = split_address(&address)
            .ok_or_else(|| MsshError::InvalidAddress(raw_address.to_string()))?;
        let hostname = hostname.to_string();
        Ok(Self {
            user,
            address,
            hostname,
            port,
            auth_methods,
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// The normalized `host:port` address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Host part of the address, without IPv6 brackets.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn auth_methods(&self) -> &[AuthMethod] {
        &self.auth_methods
    }
}

impl fmt::Display for HostTarget {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.address)
    }
}

/// Normalizes a raw target into `host:port`.
///
/// - `example.com` becomes `example.com:22`
/// - `example.com:2222` is left alone
/// - `[::1]` becomes `[::1]:22`, and a bare `::1` is bracketed first
///
/// Normalizing an already normalized address returns it unchanged.
pub fn normalize_address(raw: &str) -> Result<String, MsshError> {
    let raw = raw.trim();
    let invalid = || MsshError::InvalidAddress(raw.to_string());
    if raw.is_empty() {
        return Err(invalid());
    }

    if let Some(rest) = raw.strip_prefix('[') {
        return match rest.split_once(']') {
            Some((ip, "")) if !ip.is_empty() => Ok(format!("{}:{}", raw, DEFAULT_PORT)),
            Some((ip, port)) if !ip.is_empty() => match port.strip_prefix(':') {
                Some(port) if parse_port(port).is_some() => Ok(raw.to_string()),
                _ => Err(invalid()),
            },
            _ => Err(invalid()),
        };
    }

    match raw.split_once(':') {
        None => Ok(format!("{}:{}", raw, DEFAULT_PORT)),
        Some((host, port)) if !port.contains(':') => {
            if host.is_empty() || parse_port(port).is_none() {
                Err(invalid())
            } else {
                Ok(raw.to_string())
            }
        }
        // More than one colon and no brackets: a bare IPv6 literal.
        Some(_) => Ok(format!("[{}]:{}", raw, DEFAULT_PORT)),
    }
}

fn parse_port(port: &str) -> Option<u16> {
    port.parse::<u16>().ok().filter(|port| *port != 0)
}

fn split_address(address: &str) -> Option<(&str, u16)> {
    let (host, port) = address.rsplit_once(':')?;
    let host = host
        .strip_prefix('[')
        .and_then(|host| host.strip_suffix(']'))
        .unwrap_or(host);
    Some((host, parse_port(port)?))
}

/// A target as given by the user, before credentials are attached.
///
/// Deserializes from a hosts-file entry; see `crate::serde`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEntry {
    /// Raw `host[:port]`.
    pub hostname: String,
    /// Overrides the run-wide user for this host.
    pub user: Option<String>,
}

impl FromStr for HostEntry {
    type Err = Void;

    /// Accepts `host`, `host:port`, `user@host` and `user@host:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(match s.split_once('@') {
            Some((user, hostname)) if !user.is_empty() => Self {
                hostname: hostname.to_string(),
                user: Some(user.to_string()),
            },
            _ => Self {
                hostname: s.to_string(),
                user: None,
            },
        })
    }
}

/// Reads a YAML list of hosts. Each entry is either a bare string or a mapping
/// with a `hostname` key and an optional `user` key.
pub fn read_hosts_file(path: &Path) -> Result<Vec<HostEntry>, MsshError> {
    let hosts_fd = File::open(path).map_err(|source| MsshError::HostsFile {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_reader(hosts_fd).map_err(|source| MsshError::HostsFileFormat {
        path: path.to_path_buf(),
        source,
    })
}

/// Turns raw entries into targets. Duplicates are kept; each gets its own worker.
pub fn resolve_hosts(
    entries: Vec<HostEntry>,
    default_user: &str,
    auth_methods: Arc<[AuthMethod]>,
) -> Result<Vec<HostTarget>, MsshError> {
    if entries.is_empty() {
        return Err(MsshError::NoHosts);
    }
    let hosts = entries
        .into_iter()
        .map(|entry| {
            let user = entry.user.as_deref().unwrap_or(default_user);
            HostTarget::new(user, &entry.hostname, Arc::clone(&auth_methods))
        })
        .collect::<Result<Vec<_>, _>>()?;
    tracing::info!(
        "Hosts detected: {}",
        hosts.iter().map(|h| h.to_string()).collect::<Vec<_>>().join(", ")
    );
    Ok(hosts)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;

    use super::*;

    fn agent() -> Arc<[AuthMethod]> {
        Arc::from(vec![AuthMethod::Agent(PathBuf::from("/tmp/agent.sock"))])
    }

    #[test]
    fn test_bare_hostname_gets_default_port() {
        assert_eq!(normalize_address("example.com").unwrap(), "example.com:22");
    }

    #[test]
    fn test_explicit_port_is_kept() {
        assert_eq!(
            normalize_address("example.com:2222").unwrap(),
            "example.com:2222"
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["example.com", "10.0.0.1:2200", "[::1]", "fe80::1"] {
            let once = normalize_address(raw).unwrap();
            assert_eq!(normalize_address(&once).unwrap(), once);
        }
    }

    #[test]
    fn test_ipv6_addresses() {
        assert_eq!(normalize_address("[::1]").unwrap(), "[::1]:22");
        assert_eq!(normalize_address("[::1]:2022").unwrap(), "[::1]:2022");
        assert_eq!(normalize_address("fe80::1").unwrap(), "[fe80::1]:22");
    }

    #[test]
    fn test_invalid_addresses() {
        for raw in ["", "host:", "host:port", ":22", "host:70000", "[]", "[::1]x"] {
            assert!(
                matches!(normalize_address(raw), Err(MsshError::InvalidAddress(_))),
                "{} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_host_target_parts() {
        let host = HostTarget::new("alice", "[::1]:2022", agent()).unwrap();
        assert_eq!(host.hostname(), "::1");
        assert_eq!(host.port(), 2022);
        assert_eq!(host.to_string(), "alice@[::1]:2022");

        let host = HostTarget::new("bob", "a.example", agent()).unwrap();
        assert_eq!(host.address(), "a.example:22");
        assert_eq!(host.hostname(), "a.example");
        assert_eq!(host.port(), 22);
    }

    #[test]
    fn test_host_target_requires_user_and_credentials() {
        assert!(matches!(
            HostTarget::new("", "a.example", agent()),
            Err(MsshError::NoUser)
        ));
        assert!(matches!(
            HostTarget::new("alice", "a.example", Arc::from(Vec::new())),
            Err(MsshError::NoCredentials(_))
        ));
    }

    #[test]
    fn test_host_entry_from_str() {
        let entry: HostEntry = "root@db1:2222".parse().unwrap();
        assert_eq!(entry.user.as_deref(), Some("root"));
        assert_eq!(entry.hostname, "db1:2222");

        let entry: HostEntry = "db2".parse().unwrap();
        assert_eq!(entry.user, None);
        assert_eq!(entry.hostname, "db2");
    }

    #[test]
    fn test_read_hosts_file_mixed_entries() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
- web1
- web2:2222
- hostname: db1
  user: postgres
- deploy@web3
- hostname: web4
"#
        )
        .unwrap();
        let entries = read_hosts_file(file.path()).unwrap();
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0].hostname, "web1");
        assert_eq!(entries[1].hostname, "web2:2222");
        assert_eq!(entries[2].hostname, "db1");
        assert_eq!(entries[2].user.as_deref(), Some("postgres"));
        assert_eq!(entries[3].hostname, "web3");
        assert_eq!(entries[3].user.as_deref(), Some("deploy"));
        assert_eq!(entries[4].hostname, "web4");
        assert_eq!(entries[4].user, None);
    }

    #[test]
    fn test_read_hosts_file_rejects_unknown_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "- hostname: db1\n  port: 2222\n").unwrap();
        let err = read_hosts_file(file.path()).unwrap_err();
        assert!(matches!(err, MsshError::HostsFileFormat { .. }));
        assert!(err.to_string().contains("port"));
    }

    #[test]
    fn test_read_hosts_file_rejects_repeated_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "- hostname: db1\n  hostname: db2\n").unwrap();
        assert!(matches!(
            read_hosts_file(file.path()),
            Err(MsshError::HostsFileFormat { .. })
        ));
    }

    #[test]
    fn test_read_hosts_file_rejects_missing_hostname() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "- user: postgres\n").unwrap();
        assert!(matches!(
            read_hosts_file(file.path()),
            Err(MsshError::HostsFileFormat { .. })
        ));
    }

    #[test]
    fn test_resolve_hosts_applies_user_override() {
        let entries = vec!["a.example".parse().unwrap(), "root@b.example:2200".parse().unwrap()];
        let hosts = resolve_hosts(entries, "alice", agent()).unwrap();
        assert_eq!(hosts[0].to_string(), "alice@a.example:22");
        assert_eq!(hosts[1].to_string(), "root@b.example:2200");
    }

    #[test]
    fn test_resolve_hosts_requires_hosts() {
        assert!(matches!(
            resolve_hosts(vec![], "alice", agent()),
            Err(MsshError::NoHosts)
        ));
    }
}
