use nix::errno::Errno;
use simple_error::SimpleError;
use std::result;

pub type Result<T> = result::Result<T, SimpleError>;

/// Outcome of an operation that fails the way a syscall does: with an errno
/// the tracee (or the policy deciding for it) can act upon.
pub type SysResult<T> = result::Result<T, Errno>;

/// Encode an errno as the negative value the kernel leaves in the result
/// register.
#[must_use]
pub fn errno_word(errno: Errno) -> u64 {
    -(errno as i64) as u64
}
