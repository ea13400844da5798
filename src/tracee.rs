use log::trace;
use nix::errno::Errno;
use nix::unistd::Pid;
use simple_error::try_with;

use crate::cpu::{self, Reg, Regs, Word, SYSARGS, SYSCALL_SIZE};
use crate::result::Result;
use crate::syscall::chain::Chain;
use crate::sysnum::{detranslate_sysnum, translate_sysnum, Abi, Sysnum};
use crate::tracer::ptrace;

/// Which copy of the register file to look at.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RegVersion {
    /// live registers, written back to the process by `push_regs`
    Current = 0,
    /// registers at the syscall entry the tracee requested
    Original = 1,
    /// registers after the policy rewrote the syscall at its entry
    Modified = 2,
}

/// State of one traced process.
#[derive(Debug)]
pub struct Tracee {
    pub pid: Pid,
    pub abi: Abi,
    regs: [Regs; 3],
    regs_were_changed: bool,

    /// When set, `push_regs` brings the syscall number, arguments and stack
    /// pointer back to their entry-time values. The syscall-exit stage sets
    /// it; inserting a chained syscall clears it, because the live registers
    /// must then carry the chained syscall through to its own exit.
    pub restore_original_regs: bool,

    /// Error the policy answered at sysenter; delivered as the result at
    /// sysexit.
    pub denied: Option<Errno>,

    pub chain: Chain,
}

impl Tracee {
    #[must_use]
    pub fn new(pid: Pid) -> Tracee {
        Tracee {
            pid,
            abi: Abi::X86_64,
            regs: [cpu::zeroed_regs(); 3],
            regs_were_changed: false,
            restore_original_regs: false,
            denied: None,
            chain: Chain::default(),
        }
    }

    #[must_use]
    pub fn peek_reg(&self, version: RegVersion, reg: Reg) -> Word {
        cpu::reg_slot(&self.regs[version as usize], self.abi, reg)
    }

    /// Signed result of the syscall in `version`, sign-extended from 32 bits
    /// for i386 tracees.
    #[must_use]
    pub fn syscall_result(&self, version: RegVersion) -> i64 {
        let word = self.peek_reg(version, Reg::SysargResult);
        match self.abi {
            Abi::X86_64 => word as i64,
            Abi::I386 => i64::from(word as u32 as i32),
        }
    }

    /// Write the live register `reg`. Other snapshots are read-only.
    pub fn poke_reg(&mut self, reg: Reg, value: Word) {
        let abi = self.abi;
        let slot = cpu::reg_slot_mut(&mut self.regs[RegVersion::Current as usize], abi, reg);
        if *slot == value {
            return;
        }
        *slot = value;
        self.regs_were_changed = true;
    }

    pub fn save_current_regs(&mut self, version: RegVersion) {
        if version == RegVersion::Current {
            return;
        }
        self.regs[version as usize] = self.regs[RegVersion::Current as usize];
    }

    #[must_use]
    pub fn regs_were_changed(&self) -> bool {
        self.regs_were_changed
    }

    #[must_use]
    pub fn get_sysnum(&self, version: RegVersion) -> Sysnum {
        translate_sysnum(self.abi, self.peek_reg(version, Reg::SysargNum))
    }

    pub fn set_sysnum(&mut self, sysnum: Sysnum) {
        self.poke_reg(Reg::SysargNum, detranslate_sysnum(self.abi, sysnum));
    }

    #[must_use]
    pub fn get_systrap_size(&self) -> Word {
        SYSCALL_SIZE
    }

    /// Move the instruction pointer back onto the trap instruction so the
    /// kernel executes it again once the tracee is resumed.
    pub fn rewind_to_systrap(&mut self) {
        let ip = self.peek_reg(RegVersion::Current, Reg::InstrPointer);
        self.poke_reg(Reg::InstrPointer, ip.wrapping_sub(self.get_systrap_size()));
    }

    /// Load the live registers of the stopped process.
    pub fn fetch_regs(&mut self) -> Result<()> {
        let regs = try_with!(
            ptrace::getregs(self.pid),
            "cannot get registers of {}",
            self.pid
        );
        self.regs[RegVersion::Current as usize] = regs;
        self.regs_were_changed = false;
        Ok(())
    }

    /// At the very end of a syscall only its result may differ from what
    /// the tracee passed at the entry. Does nothing unless
    /// `restore_original_regs` is set.
    pub fn restore_regs(&mut self) {
        if !self.restore_original_regs {
            return;
        }
        let restored = [Reg::SysargNum, Reg::StackPointer];
        for reg in SYSARGS.iter().chain(restored.iter()) {
            self.poke_reg(*reg, self.peek_reg(RegVersion::Original, *reg));
        }
    }

    /// Write the live registers back to the process, if they were changed.
    pub fn push_regs(&mut self) -> Result<()> {
        self.restore_regs();
        if !self.regs_were_changed {
            return Ok(());
        }
        trace!(
            "{}: push registers, ip={:#x}",
            self.pid,
            cpu::get_ip(&self.regs[RegVersion::Current as usize])
        );
        try_with!(
            ptrace::setregs(self.pid, &self.regs[RegVersion::Current as usize]),
            "cannot set registers of {}",
            self.pid
        );
        self.regs_were_changed = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracee() -> Tracee {
        Tracee::new(Pid::from_raw(1))
    }

    #[test]
    fn test_poke_only_touches_current() {
        let mut t = tracee();
        t.poke_reg(Reg::Sysarg1, 42);
        t.save_current_regs(RegVersion::Original);
        t.poke_reg(Reg::Sysarg1, 43);
        assert_eq!(t.peek_reg(RegVersion::Current, Reg::Sysarg1), 43);
        assert_eq!(t.peek_reg(RegVersion::Original, Reg::Sysarg1), 42);
        assert_eq!(t.peek_reg(RegVersion::Modified, Reg::Sysarg1), 0);
        assert!(t.regs_were_changed());
    }

    #[test]
    fn test_poke_same_value_is_no_change() {
        let mut t = tracee();
        t.poke_reg(Reg::Sysarg2, 0);
        assert!(!t.regs_were_changed());
    }

    #[test]
    fn test_syscall_result_sign() {
        let mut t = tracee();
        t.poke_reg(Reg::SysargResult, -4i64 as Word);
        assert_eq!(t.syscall_result(RegVersion::Current), -4);

        t.abi = Abi::I386;
        assert_eq!(t.peek_reg(RegVersion::Current, Reg::SysargResult), 0xffff_fffc);
        assert_eq!(t.syscall_result(RegVersion::Current), -4);
        t.poke_reg(Reg::SysargResult, 0x7fff_ffff);
        assert_eq!(t.syscall_result(RegVersion::Current), 0x7fff_ffff);
    }

    #[test]
    fn test_sysnum() {
        let mut t = tracee();
        t.set_sysnum(Sysnum::Openat);
        assert_eq!(t.peek_reg(RegVersion::Current, Reg::SysargNum), 257);
        assert_eq!(t.get_sysnum(RegVersion::Current), Sysnum::Openat);

        t.abi = Abi::I386;
        t.set_sysnum(Sysnum::Void);
        assert_eq!(t.get_sysnum(RegVersion::Current), Sysnum::Void);
    }

    #[test]
    fn test_restore_regs() {
        let mut t = tracee();
        t.set_sysnum(Sysnum::Read);
        t.poke_reg(Reg::Sysarg3, 64);
        t.poke_reg(Reg::StackPointer, 0x7fff_0000);
        t.save_current_regs(RegVersion::Original);
        t.set_sysnum(Sysnum::Close);
        t.poke_reg(Reg::Sysarg3, 0);
        t.poke_reg(Reg::StackPointer, 0x7fff_1000);
        t.poke_reg(Reg::SysargResult, 64);

        t.restore_regs();
        assert_eq!(t.get_sysnum(RegVersion::Current), Sysnum::Close);

        t.restore_original_regs = true;
        t.restore_regs();
        assert_eq!(t.get_sysnum(RegVersion::Current), Sysnum::Read);
        assert_eq!(t.peek_reg(RegVersion::Current, Reg::Sysarg3), 64);
        assert_eq!(t.peek_reg(RegVersion::Current, Reg::StackPointer), 0x7fff_0000);
        assert_eq!(t.peek_reg(RegVersion::Current, Reg::SysargResult), 64);
    }

    #[test]
    fn test_rewind_to_systrap() {
        let mut t = tracee();
        t.poke_reg(Reg::InstrPointer, 0x1000);
        t.rewind_to_systrap();
        assert_eq!(t.peek_reg(RegVersion::Current, Reg::InstrPointer), 0x0ffe);
    }
}
