//! Building blocks for a minimal supervising init: a SIGCHLD-driven
//! supervisor that reaps every descendant while tracking one primary child,
//! handles for joining another process's user/mount/pid namespaces, and a
//! job-control relay that hands terminal foreground status to a child.

pub mod error;
pub mod foreground;
pub mod namespaces;
pub mod signal;
pub mod supervisor;
pub mod syscall;
