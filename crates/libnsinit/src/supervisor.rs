//! Surrogate init for a single primary child: blocks SIGCHLD, reaps every
//! descendant, and returns once the primary child has exited, with that
//! child's decoded exit status.

use std::io;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::time::TimeSpec;
use nix::sys::wait::{WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use crate::signal::{self, SavedSignalState, SignalError, SignalSetup};
use crate::syscall::{Syscall, SyscallType};

type Result<T> = std::result::Result<T, SupervisorError>;

/// Base for decoding a signal death into an exit status: a child terminated
/// by signal `S` is reported as `128 + S`, the shell convention.
pub const SIGNAL_EXIT_BASE: i32 = 128;

/// How long one timed signal wait may block before the reap pass runs
/// anyway. Bounds zombie staleness even if a SIGCHLD delivery were ever
/// missed, without busy-waiting.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Signal(#[from] SignalError),
    #[error("failed to spawn primary child")]
    Spawn(#[source] io::Error),
    #[error("failed to wait for signal delivery")]
    SignalWait(#[source] nix::Error),
    #[error("received unexpected signal {0} while waiting for SIGCHLD")]
    UnexpectedSignal(Signal),
    #[error("failed to reap child processes")]
    Reap(#[source] nix::Error),
}

/// Record of the one child whose exit status the supervisor is contracted to
/// report. The status, once recorded, is never cleared; it is the sole
/// condition that terminates the supervision loop.
struct PrimaryChild {
    pid: Pid,
    status: Option<i32>,
}

impl PrimaryChild {
    fn record(&mut self, status: i32) {
        if self.status.is_none() {
            self.status = Some(status);
        }
    }
}

pub struct Supervisor {
    syscall: Box<dyn Syscall>,
    poll_interval: Duration,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(SyscallType::default())
    }
}

impl Supervisor {
    pub fn new(syscall: SyscallType) -> Self {
        Supervisor {
            syscall: syscall.create_syscall(),
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Installs the supervisor signal state, spawns the primary child via
    /// `spawn_primary`, then supervises until that child exits. The spawn
    /// capability receives the saved signal state so a forked child can put
    /// it back in place before exec.
    ///
    /// Every descendant is reaped; only the primary child's status is kept.
    /// Normal exits are returned as-is, signal deaths as
    /// [`SIGNAL_EXIT_BASE`] + signal number. Descendants still alive when
    /// the primary exits are left to be reparented to init.
    ///
    /// Only SIGCHLD is monitored. Other signals are not forwarded to the
    /// child; a caller that wants a forwarding init has to layer that on
    /// top.
    pub fn run<F>(&mut self, spawn_primary: F) -> Result<i32>
    where
        F: FnOnce(&SavedSignalState) -> io::Result<Pid>,
    {
        let setup = signal::block_child_signals(self.syscall.as_ref())?;
        let pid = spawn_primary(&setup.saved).map_err(SupervisorError::Spawn)?;
        tracing::debug!(%pid, "supervising primary child");
        let mut primary = PrimaryChild { pid, status: None };

        let status = loop {
            self.wait_for_sigchld(&setup)?;
            self.reap_zombies(&mut primary)?;
            if let Some(status) = primary.status {
                break status;
            }
        };

        signal::restore(self.syscall.as_ref(), &setup.saved)?;
        tracing::debug!(status, "primary child exited");
        Ok(status)
    }

    /// Blocks for one signal from the parent set, bounded by the poll
    /// interval. Timeouts and interruptions fall through to the reap pass;
    /// anything other than SIGCHLD reaching the wait means the mask was
    /// tampered with and is fatal.
    fn wait_for_sigchld(&self, setup: &SignalSetup) -> Result<()> {
        let timeout = TimeSpec::from_duration(self.poll_interval);
        match self.syscall.sigtimedwait(&setup.parent_set, &timeout) {
            Ok(Signal::SIGCHLD) => {
                tracing::trace!("received SIGCHLD");
                Ok(())
            }
            Ok(other) => Err(SupervisorError::UnexpectedSignal(other)),
            Err(Errno::EAGAIN) | Err(Errno::EINTR) => Ok(()),
            Err(err) => Err(SupervisorError::SignalWait(err)),
        }
    }

    /// Drains every immediately reapable child. Multiple exits can coalesce
    /// into a single SIGCHLD delivery, so this keeps calling the
    /// non-blocking wait until the kernel reports nothing further. Statuses
    /// of non-primary descendants are discarded.
    fn reap_zombies(&self, primary: &mut PrimaryChild) -> Result<()> {
        loop {
            match self.syscall.waitpid(None, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(pid, code)) => {
                    tracing::debug!(%pid, code, "reaped child");
                    if pid == primary.pid {
                        primary.record(code);
                    }
                }
                Ok(WaitStatus::Signaled(pid, sig, _)) => {
                    tracing::debug!(%pid, ?sig, "reaped signaled child");
                    if pid == primary.pid {
                        primary.record(SIGNAL_EXIT_BASE + sig as i32);
                    }
                }
                // Nothing currently exited.
                Ok(WaitStatus::StillAlive) => break,
                Ok(status) => {
                    tracing::trace!(?status, "ignoring wait status");
                }
                // No children at all, nothing reapable.
                Err(Errno::ECHILD) => break,
                Err(err) => return Err(SupervisorError::Reap(err)),
            }
        }
        Ok(())
    }
}
