use std::ffi::OsString;

use anyhow::{Context, Result};
use clap::Parser;
use libnsinit::foreground::ForegroundHandoff;
use libnsinit::namespaces::NamespaceHandles;
use nix::unistd::{self, ForkResult, Pid};

use crate::commands::to_argv;

/// Run a command inside the user, mount and pid namespaces of an already
/// running process. The command gets its own process group and the terminal
/// foreground; nsinit mirrors its stop/continue state and exits with its
/// decoded status.
#[derive(Parser, Debug)]
pub struct Enter {
    /// pid of the process whose namespaces to join
    pub pid: i32,

    /// command to run inside the joined namespaces
    #[clap(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<OsString>,
}

pub fn enter(args: Enter) -> Result<i32> {
    let target = Pid::from_raw(args.pid);
    let argv = to_argv(&args.command)?;

    let mut handles = NamespaceHandles::open(target)
        .with_context(|| format!("failed to open namespaces of pid {target}"))?;
    handles
        .join_all()
        .context("failed to join target namespaces")?;

    // The child forked below starts inside the joined pid namespace.
    match unsafe { unistd::fork() }.context("failed to fork namespaced child")? {
        ForkResult::Child => {
            // Own process group, so the foreground relay can treat the
            // child as an independent job.
            if let Err(err) = unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0)) {
                eprintln!("nsinit: failed to create process group: {err}");
                std::process::exit(127);
            }
            let err = unistd::execvp(&argv[0], &argv).unwrap_err();
            eprintln!("nsinit: failed to exec {:?}: {}", argv[0], err);
            std::process::exit(127);
        }
        ForkResult::Parent { child } => {
            // The namespace-dependent work is done once the child exists.
            if let Err(err) = handles.close_all() {
                tracing::warn!(?err, "failed to close namespace handles");
            }
            ForegroundHandoff::default()
                .relay(child)
                .context("failed to relay foreground control")
        }
    }
}
