pub mod enter;
pub mod run;

use std::ffi::{CString, OsString};
use std::os::unix::ffi::OsStrExt;

use anyhow::{Context, Result};

pub(crate) fn to_argv(command: &[OsString]) -> Result<Vec<CString>> {
    command
        .iter()
        .map(|arg| {
            CString::new(arg.as_bytes())
                .with_context(|| format!("argument {arg:?} contains a NUL byte"))
        })
        .collect()
}
