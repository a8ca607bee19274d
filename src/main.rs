//! Entry point for **snackdaemon**.
//!
//! `snackdaemon daemon` runs the daemon in the foreground; every other
//! subcommand is a one-shot client that sends a single request to a running
//! daemon and prints the reply.

use clap::{Parser, Subcommand};
use log::{error, info, warn};
use snackdaemon::config::{default_config_path, Config};
use snackdaemon::daemon;
use snackdaemon::ipc::client::{Client, ClientError};
use snackdaemon::ipc::listener::{Endpoint, DEFAULT_SOCKET_PATH};
use snackdaemon::shell::runner::ShellRunner;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

#[derive(Debug, Parser)]
#[command(name = "snackdaemon", version, about = "Open, update and auto-close a snackbar")]
struct Cli {
    /// Daemon endpoint: a socket path, `@name` for an abstract socket, or
    /// `tcp:<port>` for a loopback port.
    #[arg(short, long, global = true, default_value = DEFAULT_SOCKET_PATH)]
    socket: Endpoint,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Start the daemon
    Daemon {
        /// Config file (default: $XDG_CONFIG_HOME/snackdaemon/snackdaemon.json)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Ask the daemon to exit
    Kill,
    /// Check that the daemon is alive
    Ping,
    /// Run the close command now and cancel the timer
    Close,
    /// Show the snackbar for OPTION (its index in "options")
    Update { option: String },
    /// Reload the config, from PATH or from the file already in use
    Reload { path: Option<PathBuf> },
    /// Print an example config
    GenerateConfig,
}

//  Main

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Cmd::Daemon { config } => run_daemon(cli.socket, config),
        Cmd::GenerateConfig => generate_config(),
        Cmd::Ping => {
            let start = Instant::now();
            let reply = Client::new(cli.socket).ping();
            print_reply(reply.map(|pong| format!("{} (latency: {:?})", pong, start.elapsed())))
        }
        Cmd::Kill => print_reply(Client::new(cli.socket).kill()),
        Cmd::Close => print_reply(Client::new(cli.socket).close()),
        Cmd::Update { option } => print_reply(Client::new(cli.socket).update(&option)),
        Cmd::Reload { path } => {
            let path = match path.map(absolute).transpose() {
                Ok(path) => path,
                Err(e) => {
                    error!("cannot resolve config path: {}", e);
                    return ExitCode::FAILURE;
                }
            };
            let path = path.as_ref().map(|p| p.to_string_lossy());
            print_reply(Client::new(cli.socket).reload(path.as_deref()))
        }
    }
}

fn run_daemon(endpoint: Endpoint, config: Option<PathBuf>) -> ExitCode {
    let config = config.unwrap_or_else(default_config_path);
    let (mut dispatcher, listener) = match daemon::start(ShellRunner::default(), config, &endpoint) {
        Ok(started) => started,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    // Only once the endpoint is ours: a KILL sent earlier would hit the
    // daemon being replaced.
    forward_signals(endpoint);
    dispatcher.serve(listener);
    info!("bye");
    ExitCode::SUCCESS
}

fn generate_config() -> ExitCode {
    match serde_json::to_string_pretty(&Config::example()) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

//  Helpers

fn print_reply(reply: Result<String, ClientError>) -> ExitCode {
    match reply {
        Ok(value) => {
            println!("{}", value);
            ExitCode::SUCCESS
        }
        Err(e) if e.is_connect() => {
            println!("Unable to connect to daemon.");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// The daemon may run in another directory, so relative paths are resolved
/// here.
fn absolute(path: PathBuf) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Turn SIGINT/SIGTERM into a `KILL` request so the daemon shuts down
/// through its normal path and removes its socket.
fn forward_signals(endpoint: Endpoint) {
    use signal_hook::consts::signal::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(signals) => signals,
        Err(e) => {
            warn!("failed to install signal handlers: {}", e);
            return;
        }
    };
    std::thread::spawn(move || {
        for signal in signals.forever() {
            info!("received signal {}, shutting down", signal);
            if let Err(e) = Client::new(endpoint.clone()).kill() {
                error!("unable to reach own socket: {}", e);
                std::process::exit(1);
            }
        }
    });
}
