//! Thin trait seam over the raw OS calls used by the supervisor, the
//! namespace handles and the foreground relay. Production code goes through
//! [`linux::LinuxSyscall`]; unit tests script a [`test::TestHelperSyscall`]
//! and inspect the calls it recorded.

pub mod linux;

use std::any::Any;
use std::os::unix::io::RawFd;
use std::path::Path;

use nix::fcntl::OFlag;
use nix::sched::CloneFlags;
use nix::sys::signal::{SigAction, SigSet, SigmaskHow, Signal};
use nix::sys::stat::Mode;
use nix::sys::time::TimeSpec;
use nix::sys::wait::{WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

/// Raw syscall access. Every method mirrors one OS call and surfaces the
/// plain [`nix::errno::Errno`], so callers can branch on `EAGAIN`, `EINTR`
/// or `ECHILD` where the wait semantics require it.
pub trait Syscall {
    fn as_any(&self) -> &dyn Any;
    fn open(&self, path: &Path, oflag: OFlag, mode: Mode) -> nix::Result<RawFd>;
    fn close(&self, fd: RawFd) -> nix::Result<()>;
    fn set_ns(&self, fd: RawFd, nstype: CloneFlags) -> nix::Result<()>;
    fn kill(&self, pid: Pid, signal: Signal) -> nix::Result<()>;
    fn waitpid(&self, pid: Option<Pid>, options: Option<WaitPidFlag>) -> nix::Result<WaitStatus>;
    /// Waits for one signal from `set`, bounded by `timeout`. A timeout is
    /// reported as `EAGAIN`, an interruption as `EINTR`.
    fn sigtimedwait(&self, set: &SigSet, timeout: &TimeSpec) -> nix::Result<Signal>;
    /// Changes the process signal mask and returns the previous mask in the
    /// same operation.
    fn sigmask(&self, how: SigmaskHow, set: &SigSet) -> nix::Result<SigSet>;
    /// Installs a signal action and returns the previous one.
    fn sigaction(&self, signal: Signal, action: &SigAction) -> nix::Result<SigAction>;
    fn getpid(&self) -> Pid;
}

#[derive(Debug, Default, Clone, Copy)]
pub enum SyscallType {
    #[default]
    Linux,
    Test,
}

impl SyscallType {
    pub fn create_syscall(&self) -> Box<dyn Syscall> {
        match self {
            SyscallType::Linux => Box::new(linux::LinuxSyscall),
            SyscallType::Test => Box::<test::TestHelperSyscall>::default(),
        }
    }
}

pub fn create_syscall() -> Box<dyn Syscall> {
    SyscallType::default().create_syscall()
}
