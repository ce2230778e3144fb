//! Signal state owned by the supervisor: the mask and terminal-IO
//! dispositions that were in effect before supervision began, captured once
//! at startup and restored when the supervisor hands control back.

use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal};

use crate::syscall::Syscall;

type Result<T> = std::result::Result<T, SignalError>;

#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("failed to install supervisor signal mask")]
    InstallMask(#[source] nix::Error),
    #[error("failed to restore signal mask")]
    RestoreMask(#[source] nix::Error),
    #[error("failed to change disposition of {signal}")]
    Disposition {
        signal: Signal,
        #[source]
        source: nix::Error,
    },
}

/// Mask and SIGTTIN/SIGTTOU actions in effect before the supervisor
/// installed its own, restored verbatim by [`restore`]. A forked child also
/// restores this state before exec, so the command starts with the signal
/// environment the supervisor itself was started with.
pub struct SavedSignalState {
    mask: SigSet,
    sigttin: SigAction,
    sigttou: SigAction,
}

/// Result of [`block_child_signals`]: the state to restore at shutdown plus
/// the installed parent set to pass to the timed signal wait.
pub struct SignalSetup {
    pub saved: SavedSignalState,
    pub parent_set: SigSet,
}

/// Builds the parent signal set (exactly SIGCHLD) and installs it as the
/// process mask in one atomic swap, retrieving the previous mask in the same
/// call. Because the swap is atomic, a child that exits immediately after
/// spawning cannot deliver SIGCHLD into a window where it would be lost.
///
/// SIGTTIN and SIGTTOU are set to ignore for the duration of supervision (a
/// supervisor must not be suspended by background terminal IO); the actions
/// returned by those installs are the saved dispositions.
pub fn block_child_signals(syscall: &dyn Syscall) -> Result<SignalSetup> {
    let mut parent_set = SigSet::empty();
    parent_set.add(Signal::SIGCHLD);

    let mask = syscall
        .sigmask(SigmaskHow::SIG_SETMASK, &parent_set)
        .map_err(SignalError::InstallMask)?;

    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    let sigttin = install_action(syscall, Signal::SIGTTIN, &ignore)?;
    let sigttou = install_action(syscall, Signal::SIGTTOU, &ignore)?;

    Ok(SignalSetup {
        saved: SavedSignalState {
            mask,
            sigttin,
            sigttou,
        },
        parent_set,
    })
}

/// Puts the captured mask and dispositions back in place.
pub fn restore(syscall: &dyn Syscall, saved: &SavedSignalState) -> Result<()> {
    syscall
        .sigmask(SigmaskHow::SIG_SETMASK, &saved.mask)
        .map_err(SignalError::RestoreMask)?;
    install_action(syscall, Signal::SIGTTIN, &saved.sigttin)?;
    install_action(syscall, Signal::SIGTTOU, &saved.sigttou)?;
    Ok(())
}

fn install_action(
    syscall: &dyn Syscall,
    signal: Signal,
    action: &SigAction,
) -> Result<SigAction> {
    syscall.sigaction(signal, action).map_err(|err| {
        tracing::error!(?err, ?signal, "failed to change signal disposition");
        SignalError::Disposition {
            signal,
            source: err,
        }
    })
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use nix::sys::signal::{SigmaskHow, Signal};

    use super::*;
    use crate::syscall::test::TestHelperSyscall;

    #[test]
    fn parent_set_contains_sigchld() -> Result<()> {
        let syscall = TestHelperSyscall::default();

        let setup = block_child_signals(&syscall)?;

        assert!(setup.parent_set.contains(Signal::SIGCHLD));
        let masks = syscall.get_sigmask_args();
        assert_eq!(masks.len(), 1);
        assert_eq!(masks[0].0, SigmaskHow::SIG_SETMASK);
        assert_eq!(masks[0].1, vec![Signal::SIGCHLD]);
        Ok(())
    }

    #[test]
    fn captures_terminal_io_dispositions() -> Result<()> {
        let syscall = TestHelperSyscall::default();

        block_child_signals(&syscall)?;

        assert_eq!(
            syscall.get_sigaction_args(),
            vec![Signal::SIGTTIN, Signal::SIGTTOU]
        );
        Ok(())
    }

    #[test]
    fn restore_undoes_the_install() -> Result<()> {
        let syscall = TestHelperSyscall::default();
        let setup = block_child_signals(&syscall)?;

        restore(&syscall, &setup.saved)?;

        // One mask swap for the install, one for the restore, and a
        // disposition change per terminal-IO signal each way.
        assert_eq!(syscall.get_sigmask_args().len(), 2);
        assert_eq!(syscall.get_sigaction_args().len(), 4);
        Ok(())
    }
}
