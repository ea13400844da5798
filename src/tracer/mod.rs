pub mod ptrace;
pub mod ptrace_syscall_info;

use log::{debug, trace, warn};
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use simple_error::{bail, try_with};
use std::process::{Child, ChildStdout, Command};

use crate::policy::SyscallPolicy;
use crate::result::Result;
use crate::syscall::{translate_syscall_enter, translate_syscall_exit};
use crate::tracee::Tracee;
use ptrace_syscall_info::{get_syscall_info, SyscallOp};

/// Runs one command and translates all of its syscalls. Processes the command
/// forks are not traced.
pub struct Tracer {
    child: Child,
    pub tracee: Tracee,
}

impl Tracer {
    /// Start `cmd` as a tracee. It is stopped right after its `execve`.
    pub fn spawn(mut cmd: Command) -> Result<Tracer> {
        ptrace::trace_on_exec(&mut cmd);
        let child = try_with!(cmd.spawn(), "cannot spawn {:?}", cmd);
        let pid = Pid::from_raw(child.id() as i32);

        let status = try_with!(waitpid(pid, None), "waitpid failed");
        match status {
            WaitStatus::Stopped(_, Signal::SIGTRAP) => {}
            WaitStatus::Exited(_, status) => bail!("{} exited before it was traced: {}", pid, status),
            _ => bail!("unexpected status of new tracee {}: {:?}", pid, status),
        }
        ptrace::set_options(pid)?;
        debug!("tracing {} ({:?})", pid, cmd);

        Ok(Tracer {
            child,
            tracee: Tracee::new(pid),
        })
    }

    #[must_use]
    pub fn pid(&self) -> Pid {
        self.tracee.pid
    }

    /// Stdout of the tracee, if it was spawned with a piped stdout.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Let the tracee run until it terminates. Returns its exit code, or 128
    /// plus the number of the signal that killed it.
    pub fn run(&mut self, policy: &mut dyn SyscallPolicy) -> Result<i32> {
        let pid = self.pid();
        let mut signal = None;
        loop {
            ptrace::resume(pid, signal.take())?;
            let status = try_with!(
                waitpid(pid, Some(WaitPidFlag::__WALL)),
                "cannot wait for {}",
                pid
            );
            match status {
                WaitStatus::PtraceSyscall(_) => {
                    try_with!(
                        self.syscall_stop(policy),
                        "cannot translate syscall of {}",
                        pid
                    );
                }
                WaitStatus::Exited(_, code) => {
                    debug!("{} exited with: {}", pid, code);
                    if self.tracee.chain.is_active() {
                        warn!("{} exited in the middle of a syscall chain", pid);
                    }
                    return Ok(code);
                }
                WaitStatus::Signaled(_, sig, _) => {
                    debug!("{} was killed by {}", pid, sig);
                    return Ok(128 + sig as i32);
                }
                WaitStatus::Stopped(_, sig) => {
                    trace!("{} received {}", pid, sig);
                    signal = Some(sig);
                }
                WaitStatus::PtraceEvent(_, _, event) => {
                    trace!("{}: ptrace event {}", pid, event);
                }
                _ => {
                    trace!("{}: ignore {:?}", pid, status);
                }
            }
        }
    }

    fn syscall_stop(&mut self, policy: &mut dyn SyscallPolicy) -> Result<()> {
        let info = get_syscall_info(self.pid())?;
        self.tracee.abi = info.abi()?;
        self.tracee.fetch_regs()?;
        match info.op {
            SyscallOp::Entry { .. } => translate_syscall_enter(&mut self.tracee, policy),
            SyscallOp::Exit { .. } => translate_syscall_exit(&mut self.tracee, policy),
            op => {
                warn!("{}: unexpected syscall stop: {:?}", self.pid(), op);
                return Ok(());
            }
        }
        self.tracee.push_regs()
    }
}
