use libc::c_void;
use nix::errno::Errno;
use nix::sys::ptrace::{self, Options, Request, RequestType};
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use simple_error::try_with;
use std::io;
use std::os::unix::process::CommandExt;
use std::process::Command;
use std::{mem, ptr};

use crate::cpu::Regs;
use crate::result::Result;

/// Get user registers, as with `ptrace(PTRACE_GETREGS, ...)`
pub fn getregs(pid: Pid) -> nix::Result<Regs> {
    ptrace_get_data::<Regs>(Request::PTRACE_GETREGS, pid)
}

/// Set user registers, as with `ptrace(PTRACE_SETREGS, ...)`
pub fn setregs(pid: Pid, regs: &Regs) -> nix::Result<()> {
    let res = unsafe {
        libc::ptrace(
            Request::PTRACE_SETREGS as RequestType,
            libc::pid_t::from(pid),
            ptr::null_mut::<c_void>(),
            regs as *const _ as *const c_void,
        )
    };
    Errno::result(res).map(drop)
}

/// Function for ptrace requests that return values from the data field.
/// Some ptrace get requests populate structs or larger elements than `c_long`
/// and therefore use the data field to return values. This function handles these
/// requests.
fn ptrace_get_data<T>(request: Request, pid: Pid) -> nix::Result<T> {
    let mut data = mem::MaybeUninit::uninit();
    let res = unsafe {
        libc::ptrace(
            request as RequestType,
            libc::pid_t::from(pid),
            ptr::null_mut::<T>(),
            data.as_mut_ptr() as *const _ as *const c_void,
        )
    };
    Errno::result(res)?;
    Ok(unsafe { data.assume_init() })
}

/// Make the process spawned by `cmd` a tracee of the calling thread. It
/// stops with SIGTRAP as soon as the command was executed.
pub fn trace_on_exec(cmd: &mut Command) {
    // Safe, because ptrace(PTRACE_TRACEME) is async-signal-safe and does not
    // allocate.
    unsafe {
        cmd.pre_exec(|| ptrace::traceme().map_err(|e| io::Error::from_raw_os_error(e as i32)));
    }
}

pub fn set_options(pid: Pid) -> Result<()> {
    // EXITKILL: a tracee must never run without its syscalls being translated
    let options =
        Options::PTRACE_O_TRACESYSGOOD | Options::PTRACE_O_TRACEEXEC | Options::PTRACE_O_EXITKILL;
    try_with!(
        ptrace::setoptions(pid, options),
        "cannot set ptrace options of {}",
        pid
    );
    Ok(())
}

/// Resume the tracee until its next syscall stop, delivering `sig` if set.
pub fn resume(pid: Pid, sig: Option<Signal>) -> Result<()> {
    try_with!(
        ptrace::syscall(pid, sig),
        "cannot set break on syscall with ptrace"
    );
    Ok(())
}
