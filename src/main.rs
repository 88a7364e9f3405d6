use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mssh::dispatcher::EXIT_ABORTED;
use mssh::{
    read_hosts_file, resolve_auth_methods, resolve_hosts, Config, ConsoleReporter, Dispatcher,
    HostTarget, MsshError, SshExecutor,
};

/// Exit status when the run cannot start.
const EXIT_USAGE: u8 = 2;

fn init_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(verbosity >= 3))
        .with(env_filter)
        .init();
}

fn current_user() -> Option<String> {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|user| !user.is_empty())
}

/// Everything that has to succeed before any host is contacted.
fn resolve_targets(cli: &Config) -> Result<Vec<HostTarget>, MsshError> {
    let user = match &cli.user {
        Some(user) if !user.is_empty() => user.clone(),
        _ => current_user().ok_or(MsshError::NoUser)?,
    };

    let mut entries = cli.servers.clone();
    if let Some(path) = &cli.hosts_file {
        entries.extend(read_hosts_file(path)?);
    }
    if entries.is_empty() {
        return Err(MsshError::NoHosts);
    }

    let auths = resolve_auth_methods(&cli.keys)?;
    resolve_hosts(entries, &user, Arc::from(auths))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Config::parse();
    init_logging(cli.verbose);

    let hosts = match resolve_targets(&cli) {
        Ok(hosts) => hosts,
        Err(e) => {
            eprintln!("[X] {}", e);
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let executor = Arc::new(SshExecutor::new(cli.known_hosts, cli.connect_timeout()));
    let dispatcher = Dispatcher::new(executor, cli.run_options());
    let mut reporter = ConsoleReporter::new(&hosts, cli.color);

    match dispatcher.run(hosts, cli.commands.clone(), &mut reporter).await {
        Ok(result) => {
            if result.aborted {
                // Leave right away; abandoned sessions are not waited on.
                std::process::exit(i32::from(EXIT_ABORTED));
            }
            ExitCode::from(result.exit_code())
        }
        Err(e) => {
            eprintln!("[X] {}", e);
            ExitCode::from(EXIT_USAGE)
        }
    }
}
