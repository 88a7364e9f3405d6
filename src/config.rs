//! Configuration for mssh.
//!
//! Holds the clap struct for command line arguments and flags, and the
//! flat options record the dispatcher actually consumes.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::host::HostEntry;
use crate::session::HostKeyPolicy;

#[derive(Parser, Debug)]
#[command(name = "mssh", version, about = "Run SSH commands on multiple machines")]
pub struct Config {
    /// SSH user (defaults to current user)
    #[arg(long, short, env = "MSSH_USER")]
    pub user: Option<String>,

    /// Remote server, as host, host:port or user@host:port. Can be repeated
    #[arg(long = "server", short = 's', env = "MSSH_HOSTS", value_delimiter = ',')]
    pub servers: Vec<HostEntry>,

    /// YAML file listing more servers
    #[arg(long)]
    pub hosts_file: Option<PathBuf>,

    /// SSH key (defaults to ssh-agent, then ~/.ssh/id_rsa). Can be repeated
    #[arg(long = "key", short = 'k', env = "MSSH_KEY", value_delimiter = ',')]
    pub keys: Vec<PathBuf>,

    /// Fail immediately if an error is encountered
    #[arg(long, short)]
    pub fail: bool,

    /// With --fail, let commands already running finish instead of abandoning them
    #[arg(long, requires = "fail")]
    pub drain_on_fail: bool,

    /// Only show last n lines of output for each cmd (0 shows everything)
    #[arg(long, short = 'n', default_value_t = 0, allow_negative_numbers = true)]
    pub lines: i64,

    /// Print cmd output in color (use --color=false to disable)
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub color: bool,

    /// How to treat unknown or changed host keys
    #[arg(long, value_enum, default_value_t = HostKeyPolicy::Add)]
    pub known_hosts: HostKeyPolicy,

    /// Give up connecting to a host after this many seconds. No limit by default
    #[arg(long)]
    pub connect_timeout: Option<u64>,

    /// More diagnostics on stderr (-v info, -vv debug, -vvv trace)
    #[arg(long, short, action = ArgAction::Count)]
    pub verbose: u8,

    /// Commands to run, in order, on every server
    #[arg(required = true)]
    pub commands: Vec<String>,
}

impl Config {
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            max_output_lines: self.lines,
            fail_fast: self.fail,
            drain_on_fail: self.drain_on_fail,
        }
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout.map(Duration::from_secs)
    }
}

/// Knobs for a single run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Keep only this many trailing lines of output. Zero or negative keeps everything.
    pub max_output_lines: i64,
    /// Abort the whole run on the first failed command.
    pub fail_fast: bool,
    /// When aborting, let in-flight commands finish and report instead of abandoning them.
    pub drain_on_fail: bool,
}
