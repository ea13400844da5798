use log::{debug, trace};
use nix::errno::Errno;
use std::str::FromStr;

use crate::chained_syscall;
use crate::cpu::{Reg, Word};
use crate::result::SysResult;
use crate::syscall::chain::{force_chain_final_result, restart_original_syscall};
use crate::sysnum::Sysnum;
use crate::tracee::{RegVersion, Tracee};

/// Decides how the syscalls of a tracee are emulated.
///
/// An `Err(errno)` from a sysenter hook cancels the syscall and makes it fail
/// with `errno`; from a sysexit hook it replaces the syscall's result.
pub trait SyscallPolicy {
    /// Entry of a syscall the tracee requested.
    fn sysenter(&mut self, _tracee: &mut Tracee) -> SysResult<()> {
        Ok(())
    }

    /// Exit of a syscall the tracee requested. This is where syscalls get
    /// chained.
    fn sysexit(&mut self, _tracee: &mut Tracee) -> SysResult<()> {
        Ok(())
    }

    fn chained_sysenter(&mut self, _tracee: &mut Tracee) -> SysResult<()> {
        Ok(())
    }

    fn chained_sysexit(&mut self, _tracee: &mut Tracee) -> SysResult<()> {
        Ok(())
    }

    /// What the policy did, reported once the tracee terminated.
    fn summary(&self) -> Option<String> {
        None
    }
}

/// Does not interfere with any syscall.
#[derive(Debug, Default)]
pub struct Passthrough;

impl SyscallPolicy for Passthrough {}

/// Follows every successful `write(2)` with an `fsync(2)` of the same file
/// descriptor. The tracee still observes the result of its `write`.
#[derive(Debug, Default)]
pub struct SyncWrites {
    pub fsyncs: usize,
}

impl SyscallPolicy for SyncWrites {
    fn sysexit(&mut self, tracee: &mut Tracee) -> SysResult<()> {
        if tracee.get_sysnum(RegVersion::Original) != Sysnum::Write {
            return Ok(());
        }
        let written = tracee.syscall_result(RegVersion::Current);
        if written <= 0 {
            return Ok(());
        }
        let fd = tracee.peek_reg(RegVersion::Original, Reg::Sysarg1);
        chained_syscall!(tracee, Sysnum::Fsync, fd)?;
        force_chain_final_result(tracee, written as Word);
        self.fsyncs += 1;
        Ok(())
    }

    fn summary(&self) -> Option<String> {
        Some(format!("chained {} fsync(2)", self.fsyncs))
    }

    fn chained_sysexit(&mut self, tracee: &mut Tracee) -> SysResult<()> {
        let res = tracee.syscall_result(RegVersion::Current);
        if res < 0 {
            // e.g. EINVAL for pipes and terminals
            trace!(
                "{}: chained fsync failed: {}",
                tracee.pid,
                Errno::from_i32(-res as i32)
            );
        }
        Ok(())
    }
}

/// Restarts `read`, `write`, `nanosleep` and `wait4` when they were
/// interrupted by a signal, as if the handler was installed with
/// `SA_RESTART`.
#[derive(Debug, Default)]
pub struct RestartInterrupted {
    pub restarts: usize,
}

impl SyscallPolicy for RestartInterrupted {
    fn sysexit(&mut self, tracee: &mut Tracee) -> SysResult<()> {
        match tracee.get_sysnum(RegVersion::Original) {
            Sysnum::Read | Sysnum::Write | Sysnum::Nanosleep | Sysnum::Wait4 => {}
            _ => return Ok(()),
        }
        if tracee.syscall_result(RegVersion::Current) != -(Errno::EINTR as i64) {
            return Ok(());
        }
        debug!(
            "{}: {} was interrupted",
            tracee.pid,
            tracee.get_sysnum(RegVersion::Original)
        );
        restart_original_syscall(tracee)?;
        self.restarts += 1;
        Ok(())
    }

    fn summary(&self) -> Option<String> {
        Some(format!("restarted {} interrupted syscalls", self.restarts))
    }
}

/// Built-in policies selectable by name.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PolicyKind {
    Passthrough,
    SyncWrites,
    RestartInterrupted,
}

pub const POLICY_NAMES: &[&str] = &["none", "sync-writes", "restart-eintr"];

impl PolicyKind {
    #[must_use]
    pub fn build(self) -> Box<dyn SyscallPolicy> {
        match self {
            PolicyKind::Passthrough => Box::new(Passthrough),
            PolicyKind::SyncWrites => Box::new(SyncWrites::default()),
            PolicyKind::RestartInterrupted => Box::new(RestartInterrupted::default()),
        }
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<PolicyKind, String> {
        match s {
            "none" => Ok(PolicyKind::Passthrough),
            "sync-writes" => Ok(PolicyKind::SyncWrites),
            "restart-eintr" => Ok(PolicyKind::RestartInterrupted),
            _ => Err(format!("unknown policy: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::SYSTRAP_NUM;
    use crate::result::errno_word;
    use crate::syscall::chain::chain_next_syscall;
    use crate::sysnum::{detranslate_sysnum, Abi};
    use nix::unistd::Pid;

    fn tracee_after(sysnum: Sysnum, fd: Word, result: Word) -> Tracee {
        let mut tracee = Tracee::new(Pid::from_raw(7));
        tracee.set_sysnum(sysnum);
        tracee.poke_reg(Reg::Sysarg1, fd);
        tracee.poke_reg(Reg::InstrPointer, 0x1002);
        tracee.save_current_regs(RegVersion::Original);
        tracee.poke_reg(Reg::SysargResult, result);
        tracee
    }

    #[test]
    fn test_sync_writes_chains_fsync() {
        let mut policy = SyncWrites::default();
        let mut tracee = tracee_after(Sysnum::Write, 5, 3);
        policy.sysexit(&mut tracee).expect("sysexit failed");
        assert_eq!(policy.fsyncs, 1);
        assert_eq!(tracee.chain.pending(), 1);
        assert_eq!(tracee.chain.final_result(), Some(3));

        chain_next_syscall(&mut tracee);
        assert_eq!(
            tracee.peek_reg(RegVersion::Current, SYSTRAP_NUM),
            detranslate_sysnum(Abi::X86_64, Sysnum::Fsync)
        );
        assert_eq!(tracee.peek_reg(RegVersion::Current, Reg::Sysarg1), 5);
    }

    #[test]
    fn test_sync_writes_ignores_failed_writes() {
        let mut policy = SyncWrites::default();
        let mut tracee = tracee_after(Sysnum::Write, 5, errno_word(Errno::EBADF));
        policy.sysexit(&mut tracee).expect("sysexit failed");
        assert!(!tracee.chain.is_active());

        let mut tracee = tracee_after(Sysnum::Read, 5, 3);
        policy.sysexit(&mut tracee).expect("sysexit failed");
        assert!(!tracee.chain.is_active());
        assert_eq!(policy.fsyncs, 0);
    }

    #[test]
    fn test_restart_interrupted() {
        let mut policy = RestartInterrupted::default();
        let mut tracee = tracee_after(Sysnum::Read, 0, errno_word(Errno::EINTR));
        policy.sysexit(&mut tracee).expect("sysexit failed");
        assert_eq!(policy.restarts, 1);
        assert_eq!(
            tracee.peek_reg(RegVersion::Current, Reg::InstrPointer),
            0x1000
        );

        let mut tracee = tracee_after(Sysnum::Read, 0, errno_word(Errno::EAGAIN));
        policy.sysexit(&mut tracee).expect("sysexit failed");
        assert_eq!(policy.restarts, 1);
    }

    fn i386_tracee_after(sysnum: Sysnum, fd: Word, result: i32) -> Tracee {
        let mut tracee = Tracee::new(Pid::from_raw(7));
        tracee.abi = Abi::I386;
        tracee.set_sysnum(sysnum);
        tracee.poke_reg(Reg::Sysarg1, fd);
        tracee.poke_reg(Reg::InstrPointer, 0x1002);
        tracee.save_current_regs(RegVersion::Original);
        // the kernel only fills the low half for compat syscalls
        tracee.poke_reg(Reg::SysargResult, Word::from(result as u32));
        tracee
    }

    #[test]
    fn test_i386_sync_writes_ignores_failed_writes() {
        let mut policy = SyncWrites::default();
        let mut tracee = i386_tracee_after(Sysnum::Write, 5, -(Errno::EBADF as i32));
        policy.sysexit(&mut tracee).expect("sysexit failed");
        assert!(!tracee.chain.is_active());
        assert_eq!(policy.fsyncs, 0);

        let mut tracee = i386_tracee_after(Sysnum::Write, 5, 4);
        policy.sysexit(&mut tracee).expect("sysexit failed");
        assert_eq!(policy.fsyncs, 1);
        assert_eq!(tracee.chain.final_result(), Some(4));
    }

    #[test]
    fn test_i386_restart_interrupted() {
        let mut policy = RestartInterrupted::default();
        let mut tracee = i386_tracee_after(Sysnum::Read, 0, -(Errno::EINTR as i32));
        assert_eq!(tracee.syscall_result(RegVersion::Current), -(Errno::EINTR as i64));
        policy.sysexit(&mut tracee).expect("sysexit failed");
        assert_eq!(policy.restarts, 1);
        assert_eq!(
            tracee.peek_reg(RegVersion::Current, SYSTRAP_NUM),
            detranslate_sysnum(Abi::I386, Sysnum::Read)
        );
        assert_eq!(
            tracee.peek_reg(RegVersion::Current, Reg::InstrPointer),
            0x1000
        );

        // a full 64-bit encoding is masked the same way
        let mut tracee = i386_tracee_after(Sysnum::Write, 0, 0);
        tracee.poke_reg(Reg::SysargResult, errno_word(Errno::EINTR));
        policy.sysexit(&mut tracee).expect("sysexit failed");
        assert_eq!(policy.restarts, 2);
    }

    #[test]
    fn test_policy_names() {
        for name in POLICY_NAMES {
            assert!(name.parse::<PolicyKind>().is_ok());
        }
        assert!("yolo".parse::<PolicyKind>().is_err());
    }
}
