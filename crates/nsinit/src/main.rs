//! # nsinit
//! Minimal supervising init. `nsinit run` executes a command as the primary
//! child of a reaping, SIGCHLD-driven supervisor and exits with the
//! command's status. `nsinit enter` runs a command inside the user, mount
//! and pid namespaces of an already running process and hands terminal
//! foreground control to it.
mod commands;
mod observability;

use std::path::PathBuf;

use clap::{crate_version, Parser};

#[derive(Parser, Debug)]
pub struct GlobalOpts {
    /// write log output to this file instead of stderr
    #[clap(long)]
    pub log: Option<PathBuf>,

    /// log format: "text" (default) or "json"
    #[clap(long)]
    pub log_format: Option<String>,

    /// set the log level (default is 'error')
    #[clap(long)]
    pub log_level: Option<String>,

    /// shorthand for --log-level debug
    #[clap(long)]
    pub debug: bool,
}

#[derive(Parser, Debug)]
#[clap(version = crate_version!(), author = env!("CARGO_PKG_AUTHORS"))]
struct Opts {
    #[clap(flatten)]
    global: GlobalOpts,

    #[clap(subcommand)]
    subcmd: SubCommand,
}

#[derive(Parser, Debug)]
enum SubCommand {
    /// Run a command under the supervisor
    Run(commands::run::Run),
    /// Run a command inside another process's namespaces
    Enter(commands::enter::Enter),
}

fn main() {
    let opts = Opts::parse();

    if let Err(err) = observability::init(&opts.global) {
        eprintln!("failed to initialize logging: {err}");
        std::process::exit(1);
    }

    tracing::debug!(
        "started by user {} with {:?}",
        nix::unistd::geteuid(),
        std::env::args_os()
    );

    let result = match opts.subcmd {
        SubCommand::Run(run) => commands::run::run(run),
        SubCommand::Enter(enter) => commands::enter::enter(enter),
    };

    match result {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(err) => {
            tracing::error!("error in executing command: {:?}", err);
            eprintln!("error in executing command: {err:?}");
            std::process::exit(-1);
        }
    }
}
