#![deny(clippy::print_stdout, clippy::print_stderr, clippy::unwrap_used)]

#[cfg(not(target_arch = "x86_64"))]
compile_error!("syschain only supports x86_64 tracers (with x86_64 and i386 tracees)");

pub mod cpu;
pub mod policy;
pub mod result;
pub mod run;
pub mod syscall;
pub mod sysnum;
pub mod tracee;
pub mod tracer;
