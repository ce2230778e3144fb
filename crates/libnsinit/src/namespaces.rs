//! Handles to another process's user, mount and pid namespaces, opened from
//! `/proc/<pid>/ns/`. The set is all-or-nothing: either all three
//! descriptors are open or construction fails and nothing leaks.

use std::os::unix::io::RawFd;
use std::path::PathBuf;

use nix::fcntl::OFlag;
use nix::sched::CloneFlags;
use nix::sys::stat::Mode;
use nix::unistd::Pid;

use crate::syscall::{Syscall, SyscallType};

type Result<T> = std::result::Result<T, NamespaceError>;

#[derive(Debug, thiserror::Error)]
pub enum NamespaceError {
    #[error("failed to open {kind} namespace of pid {pid}")]
    Open {
        kind: &'static str,
        pid: Pid,
        #[source]
        source: nix::Error,
    },
    #[error("failed to enter {kind} namespace")]
    Enter {
        kind: &'static str,
        #[source]
        source: nix::Error,
    },
    #[error("failed to close {kind} namespace handle")]
    Close {
        kind: &'static str,
        #[source]
        source: nix::Error,
    },
}

// Join order matters: user and mount identity must be established before
// the pid namespace switch changes the process-table view.
const NAMESPACE_KINDS: &[(&str, CloneFlags)] = &[
    ("user", CloneFlags::CLONE_NEWUSER),
    ("mnt", CloneFlags::CLONE_NEWNS),
    ("pid", CloneFlags::CLONE_NEWPID),
];

/// The three namespace handles for one target process. [`close_all`]
/// releases every descriptor exactly once; dropping an unclosed set is a
/// backstop that closes best-effort.
///
/// [`close_all`]: NamespaceHandles::close_all
pub struct NamespaceHandles {
    syscall: Box<dyn Syscall>,
    fds: [RawFd; 3],
    closed: bool,
}

impl std::fmt::Debug for NamespaceHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceHandles")
            .field("fds", &self.fds)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl NamespaceHandles {
    pub fn open(target: Pid) -> Result<Self> {
        Self::open_with_syscall(target, SyscallType::default().create_syscall())
    }

    pub fn open_with_syscall(target: Pid, syscall: Box<dyn Syscall>) -> Result<Self> {
        let mut fds: Vec<RawFd> = Vec::with_capacity(NAMESPACE_KINDS.len());
        for &(kind, _) in NAMESPACE_KINDS {
            let path = PathBuf::from(format!("/proc/{target}/ns/{kind}"));
            match syscall.open(&path, OFlag::O_RDONLY | OFlag::O_CLOEXEC, Mode::empty()) {
                Ok(fd) => fds.push(fd),
                Err(err) => {
                    tracing::error!(?err, kind, %target, "failed to open namespace file");
                    // Release whatever was opened before the failure.
                    for (opened, &(opened_kind, _)) in fds.iter().zip(NAMESPACE_KINDS) {
                        if let Err(close_err) = syscall.close(*opened) {
                            tracing::warn!(
                                ?close_err,
                                kind = opened_kind,
                                "failed to close namespace handle"
                            );
                        }
                    }
                    return Err(NamespaceError::Open {
                        kind,
                        pid: target,
                        source: err,
                    });
                }
            }
        }

        Ok(NamespaceHandles {
            syscall,
            fds: [fds[0], fds[1], fds[2]],
            closed: false,
        })
    }

    /// Enters all three namespaces, strictly user then mount then pid. A
    /// failure partway leaves the calling process straddling namespace
    /// views; callers must treat it as fatal rather than attempt rollback.
    pub fn join_all(&self) -> Result<()> {
        for (fd, &(kind, flags)) in self.fds.iter().zip(NAMESPACE_KINDS) {
            tracing::debug!(kind, "entering namespace");
            self.syscall.set_ns(*fd, flags).map_err(|err| {
                tracing::error!(?err, kind, "failed to enter namespace");
                NamespaceError::Enter { kind, source: err }
            })?;
        }
        Ok(())
    }

    /// Closes the three handles, once the namespace-dependent work is done.
    /// Every close is attempted; the first failure is reported after the
    /// rest have run. Calling this again is a no-op.
    pub fn close_all(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut first_err = None;
        for (fd, &(kind, _)) in self.fds.iter().zip(NAMESPACE_KINDS) {
            if let Err(err) = self.syscall.close(*fd) {
                tracing::warn!(?err, kind, "failed to close namespace handle");
                first_err.get_or_insert(NamespaceError::Close { kind, source: err });
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for NamespaceHandles {
    fn drop(&mut self) {
        let _ = self.close_all();
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use anyhow::Result;
    use nix::errno::Errno;

    use super::*;
    use crate::syscall::test::TestHelperSyscall;

    fn shared_fake() -> Rc<TestHelperSyscall> {
        Rc::new(TestHelperSyscall::default())
    }

    fn open_with_fake(
        target: Pid,
        fake: &Rc<TestHelperSyscall>,
    ) -> Result<NamespaceHandles, NamespaceError> {
        NamespaceHandles::open_with_syscall(target, Box::new(fake.clone()))
    }

    #[test]
    fn opens_all_three_namespace_files() -> Result<()> {
        let fake = shared_fake();

        let _handles = open_with_fake(Pid::from_raw(4242), &fake)?;

        assert_eq!(
            fake.get_open_paths(),
            vec![
                PathBuf::from("/proc/4242/ns/user"),
                PathBuf::from("/proc/4242/ns/mnt"),
                PathBuf::from("/proc/4242/ns/pid"),
            ]
        );
        Ok(())
    }

    #[test]
    fn failing_open_closes_earlier_descriptors() {
        let fake = shared_fake();
        // user ns opens fine, mnt ns is denied.
        fake.want_open_result(Ok(7));
        fake.want_open_result(Err(Errno::EACCES));

        let err = open_with_fake(Pid::from_raw(4242), &fake).unwrap_err();

        assert!(matches!(err, NamespaceError::Open { kind: "mnt", .. }));
        assert_eq!(fake.get_closed_fds(), vec![7]);
    }

    #[test]
    fn join_all_enters_user_mount_pid_in_order() -> Result<()> {
        let fake = shared_fake();
        let handles = open_with_fake(Pid::from_raw(1), &fake)?;

        handles.join_all()?;

        let flags: Vec<CloneFlags> = fake
            .get_set_ns_args()
            .into_iter()
            .map(|(_, flags)| flags)
            .collect();
        assert_eq!(
            flags,
            vec![
                CloneFlags::CLONE_NEWUSER,
                CloneFlags::CLONE_NEWNS,
                CloneFlags::CLONE_NEWPID,
            ]
        );
        Ok(())
    }

    #[test]
    fn enter_failure_names_the_namespace() -> Result<()> {
        let fake = shared_fake();
        let handles = open_with_fake(Pid::from_raw(1), &fake)?;
        fake.want_set_ns_result(Ok(()));
        fake.want_set_ns_result(Err(Errno::EPERM));

        let err = handles.join_all().unwrap_err();

        assert!(matches!(err, NamespaceError::Enter { kind: "mnt", .. }));
        Ok(())
    }

    #[test]
    fn close_all_closes_every_descriptor_exactly_once() -> Result<()> {
        let fake = shared_fake();
        let mut handles = open_with_fake(Pid::from_raw(1), &fake)?;
        let fds = handles.fds;

        handles.close_all()?;
        handles.close_all()?;

        assert_eq!(fake.get_closed_fds(), fds.to_vec());
        Ok(())
    }

    #[test]
    fn drop_closes_unclosed_handles() -> Result<()> {
        let fake = shared_fake();
        {
            let _handles = open_with_fake(Pid::from_raw(1), &fake)?;
        }

        assert_eq!(fake.get_closed_fds().len(), 3);
        Ok(())
    }
}
