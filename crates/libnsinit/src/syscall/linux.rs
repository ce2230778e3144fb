use std::any::Any;
use std::mem::MaybeUninit;
use std::os::fd::BorrowedFd;
use std::os::unix::io::RawFd;
use std::path::Path;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sched::{self, CloneFlags};
use nix::sys::signal::{self, SigAction, SigSet, SigmaskHow, Signal};
use nix::sys::stat::Mode;
use nix::sys::time::TimeSpec;
use nix::sys::wait::{self, WaitPidFlag, WaitStatus};
use nix::unistd::{self, Pid};

use super::Syscall;

/// Production implementation calling straight into the OS.
pub struct LinuxSyscall;

impl Syscall for LinuxSyscall {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn open(&self, path: &Path, oflag: OFlag, mode: Mode) -> nix::Result<RawFd> {
        nix::fcntl::open(path, oflag, mode)
    }

    fn close(&self, fd: RawFd) -> nix::Result<()> {
        unistd::close(fd)
    }

    fn set_ns(&self, fd: RawFd, nstype: CloneFlags) -> nix::Result<()> {
        // The descriptor stays owned by the caller, borrow it for the call.
        let fd = unsafe { BorrowedFd::borrow_raw(fd) };
        sched::setns(fd, nstype)
    }

    fn kill(&self, pid: Pid, signal: Signal) -> nix::Result<()> {
        signal::kill(pid, signal)
    }

    fn waitpid(&self, pid: Option<Pid>, options: Option<WaitPidFlag>) -> nix::Result<WaitStatus> {
        wait::waitpid(pid, options)
    }

    fn sigtimedwait(&self, set: &SigSet, timeout: &TimeSpec) -> nix::Result<Signal> {
        // nix has no sigtimedwait wrapper as of 0.28.
        let raw_set = raw_sigset(set);
        let raw_timeout = libc::timespec {
            tv_sec: timeout.tv_sec(),
            tv_nsec: timeout.tv_nsec(),
        };
        let mut info = MaybeUninit::<libc::siginfo_t>::uninit();
        let signo = Errno::result(unsafe {
            libc::sigtimedwait(&raw_set, info.as_mut_ptr(), &raw_timeout)
        })?;
        Signal::try_from(signo)
    }

    fn sigmask(&self, how: SigmaskHow, set: &SigSet) -> nix::Result<SigSet> {
        let mut previous = SigSet::empty();
        signal::sigprocmask(how, Some(set), Some(&mut previous))?;
        Ok(previous)
    }

    fn sigaction(&self, sig: Signal, action: &SigAction) -> nix::Result<SigAction> {
        unsafe { signal::sigaction(sig, action) }
    }

    fn getpid(&self) -> Pid {
        unistd::getpid()
    }
}

fn raw_sigset(set: &SigSet) -> libc::sigset_t {
    let mut raw = MaybeUninit::<libc::sigset_t>::uninit();
    unsafe {
        libc::sigemptyset(raw.as_mut_ptr());
        for signal in set.iter() {
            libc::sigaddset(raw.as_mut_ptr(), signal as libc::c_int);
        }
        raw.assume_init()
    }
}
