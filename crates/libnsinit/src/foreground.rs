//! Job-control handoff between a supervising process and a child that has
//! been given its own process group: the relay keeps at most one of the two
//! runnable in the foreground at any time, by mirroring the child's
//! stop/continue state onto itself.

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::wait::{WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use crate::syscall::{Syscall, SyscallType};

type Result<T> = std::result::Result<T, ForegroundError>;

const EXIT_FAILURE: i32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ForegroundError {
    #[error("failed to wait for foreground child")]
    Wait(#[source] nix::Error),
    #[error("failed to send {signal} to {pid}")]
    Kill {
        pid: Pid,
        signal: Signal,
        #[source]
        source: nix::Error,
    },
    #[error("unexpected wait status for foreground child: {0:?}")]
    UnexpectedStatus(WaitStatus),
}

pub struct ForegroundHandoff {
    syscall: Box<dyn Syscall>,
}

impl Default for ForegroundHandoff {
    fn default() -> Self {
        Self::new(SyscallType::default())
    }
}

impl ForegroundHandoff {
    pub fn new(syscall: SyscallType) -> Self {
        ForegroundHandoff {
            syscall: syscall.create_syscall(),
        }
    }

    /// Blocks until `child` reaches a terminal state and returns its decoded
    /// exit status. Whenever the child is suspended, this process suspends
    /// itself and queues a SIGCONT for the child, which is delivered once
    /// our own parent resumes us; that realizes the job-control convention
    /// that only one of the two is foreground-runnable.
    ///
    /// A child killed by a signal is answered by re-raising the same signal
    /// against this process, so its own exit carries identical semantics;
    /// should that signal not terminate us, a plain failure code is
    /// returned instead.
    pub fn relay(&self, child: Pid) -> Result<i32> {
        let own_pid = self.syscall.getpid();
        tracing::debug!(%own_pid, %child, "yielding foreground to child");

        loop {
            match self.syscall.waitpid(Some(child), Some(WaitPidFlag::WUNTRACED)) {
                Ok(WaitStatus::Stopped(_, sig)) => {
                    tracing::debug!(?sig, "child stopped, suspending ourselves");
                    self.kill(own_pid, Signal::SIGSTOP)?;
                    // Runs only once our own parent has resumed us.
                    self.kill(child, Signal::SIGCONT)?;
                }
                Ok(WaitStatus::Exited(_, code)) => {
                    tracing::debug!(code, "foreground child exited");
                    return Ok(code);
                }
                Ok(WaitStatus::Signaled(_, sig, _)) => {
                    tracing::debug!(?sig, "foreground child killed by signal");
                    if let Err(err) = self.kill(own_pid, sig) {
                        tracing::warn!(?err, "failed to re-raise child's death signal");
                    }
                    return Ok(EXIT_FAILURE);
                }
                Ok(status) => return Err(ForegroundError::UnexpectedStatus(status)),
                Err(Errno::EINTR) => continue,
                Err(err) => return Err(ForegroundError::Wait(err)),
            }
        }
    }

    fn kill(&self, pid: Pid, signal: Signal) -> Result<()> {
        self.syscall.kill(pid, signal).map_err(|err| {
            tracing::error!(?err, %pid, ?signal, "failed to send signal");
            ForegroundError::Kill {
                pid,
                signal,
                source: err,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use nix::unistd::{self, ForkResult};
    use serial_test::serial;

    use super::*;
    use crate::syscall::test::{TestHelperSyscall, TEST_OWN_PID};

    fn test_handoff() -> ForegroundHandoff {
        ForegroundHandoff::new(SyscallType::Test)
    }

    fn helper(handoff: &ForegroundHandoff) -> &TestHelperSyscall {
        handoff
            .syscall
            .as_any()
            .downcast_ref::<TestHelperSyscall>()
            .unwrap()
    }

    #[test]
    fn stop_then_exit_relays_one_pair() -> Result<()> {
        let handoff = test_handoff();
        let child = Pid::from_raw(42);
        helper(&handoff).want_waitpid(Ok(WaitStatus::Stopped(child, Signal::SIGTSTP)));
        helper(&handoff).want_waitpid(Ok(WaitStatus::Exited(child, 7)));

        let status = handoff.relay(child)?;

        assert_eq!(status, 7);
        assert_eq!(
            helper(&handoff).get_kill_args(),
            vec![
                (Pid::from_raw(TEST_OWN_PID), Signal::SIGSTOP),
                (child, Signal::SIGCONT),
            ]
        );
        Ok(())
    }

    #[test]
    fn waits_only_for_the_tracked_child() -> Result<()> {
        let handoff = test_handoff();
        let child = Pid::from_raw(42);
        helper(&handoff).want_waitpid(Ok(WaitStatus::Exited(child, 0)));

        handoff.relay(child)?;

        assert_eq!(
            helper(&handoff).get_waitpid_args(),
            vec![(Some(child), Some(WaitPidFlag::WUNTRACED))]
        );
        Ok(())
    }

    #[test]
    fn signal_death_is_re_raised_with_failure_fallback() -> Result<()> {
        let handoff = test_handoff();
        let child = Pid::from_raw(42);
        helper(&handoff).want_waitpid(Ok(WaitStatus::Signaled(child, Signal::SIGKILL, false)));

        // The fake's kill does not terminate anything, which is exactly the
        // fallback path.
        let status = handoff.relay(child)?;

        assert_eq!(status, EXIT_FAILURE);
        assert_eq!(
            helper(&handoff).get_kill_args(),
            vec![(Pid::from_raw(TEST_OWN_PID), Signal::SIGKILL)]
        );
        Ok(())
    }

    #[test]
    fn interrupted_wait_is_retried() -> Result<()> {
        let handoff = test_handoff();
        let child = Pid::from_raw(42);
        helper(&handoff).want_waitpid(Err(Errno::EINTR));
        helper(&handoff).want_waitpid(Ok(WaitStatus::Exited(child, 2)));

        let status = handoff.relay(child)?;

        assert_eq!(status, 2);
        Ok(())
    }

    #[test]
    #[serial]
    fn relays_a_real_child_exit() -> Result<()> {
        let handoff = ForegroundHandoff::default();

        let child = match unsafe { unistd::fork() }? {
            ForkResult::Child => unsafe { libc::_exit(7) },
            ForkResult::Parent { child } => child,
        };
        let status = handoff.relay(child)?;

        assert_eq!(status, 7);
        Ok(())
    }
}
