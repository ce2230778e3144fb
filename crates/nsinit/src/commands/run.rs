use std::ffi::{CString, OsString};
use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use libnsinit::signal::{self, SavedSignalState};
use libnsinit::supervisor::Supervisor;
use libnsinit::syscall::create_syscall;
use nix::unistd::{self, ForkResult, Pid};

use crate::commands::to_argv;

/// Run a command as the primary child of the supervisor. Every descendant
/// the command leaves behind is reaped; nsinit exits with the command's
/// decoded exit status.
#[derive(Parser, Debug)]
pub struct Run {
    /// command to run and its arguments
    #[clap(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<OsString>,
}

pub fn run(args: Run) -> Result<i32> {
    let argv = to_argv(&args.command)?;
    let mut supervisor = Supervisor::default();
    let status = supervisor
        .run(|saved| spawn_primary(&argv, saved))
        .with_context(|| format!("failed to supervise {:?}", args.command[0]))?;
    Ok(status)
}

/// Forks and execs the primary child. The child puts the pre-supervisor
/// signal state back in place before exec, so the command starts with an
/// unmodified mask and terminal-IO dispositions.
fn spawn_primary(argv: &[CString], saved: &SavedSignalState) -> io::Result<Pid> {
    match unsafe { unistd::fork() }? {
        ForkResult::Child => {
            let syscall = create_syscall();
            if let Err(err) = signal::restore(syscall.as_ref(), saved) {
                eprintln!("nsinit: failed to restore signal state: {err}");
                std::process::exit(127);
            }
            let err = unistd::execvp(&argv[0], argv).unwrap_err();
            eprintln!("nsinit: failed to exec {:?}: {}", argv[0], err);
            std::process::exit(127);
        }
        ForkResult::Parent { child } => Ok(child),
    }
}
