// TODO user_regs_struct is only available for x86/x86_64 right now in libc crate
use libc::user_regs_struct;

use crate::sysnum::Abi;

pub type Regs = user_regs_struct;

/// A machine word of the tracer. Values of 32-bit tracees are zero-extended.
pub type Word = u64;

/// Length of the trap instruction: `syscall` (0f 05) and `int $0x80` (cd 80)
/// are both two bytes long.
pub const SYSCALL_SIZE: Word = 2;

/// Logical register names, independent of the tracee's ABI.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Reg {
    SysargNum,
    Sysarg1,
    Sysarg2,
    Sysarg3,
    Sysarg4,
    Sysarg5,
    Sysarg6,
    SysargResult,
    StackPointer,
    InstrPointer,
}

/// The register the kernel reads the syscall number from when the trap
/// instruction is executed. `SysargNum` (orig_rax) is only what the kernel
/// reports back at syscall stops.
pub const SYSTRAP_NUM: Reg = Reg::SysargResult;

pub const SYSARGS: [Reg; 6] = [
    Reg::Sysarg1,
    Reg::Sysarg2,
    Reg::Sysarg3,
    Reg::Sysarg4,
    Reg::Sysarg5,
    Reg::Sysarg6,
];

#[cfg(target_arch = "x86_64")]
pub fn get_ip(regs: &Regs) -> Word {
    regs.rip
}

/// All-zero register file, used as the initial value of every snapshot.
#[must_use]
pub fn zeroed_regs() -> Regs {
    // user_regs_struct only consists of integers
    unsafe { std::mem::zeroed() }
}

#[must_use]
pub fn reg_slot(regs: &Regs, abi: Abi, reg: Reg) -> Word {
    let value = match (abi, reg) {
        (_, Reg::SysargNum) => regs.orig_rax,
        (_, Reg::SysargResult) => regs.rax,
        (_, Reg::StackPointer) => regs.rsp,
        (_, Reg::InstrPointer) => regs.rip,
        (Abi::X86_64, Reg::Sysarg1) => regs.rdi,
        (Abi::X86_64, Reg::Sysarg2) => regs.rsi,
        (Abi::X86_64, Reg::Sysarg3) => regs.rdx,
        (Abi::X86_64, Reg::Sysarg4) => regs.r10,
        (Abi::X86_64, Reg::Sysarg5) => regs.r8,
        (Abi::X86_64, Reg::Sysarg6) => regs.r9,
        (Abi::I386, Reg::Sysarg1) => regs.rbx,
        (Abi::I386, Reg::Sysarg2) => regs.rcx,
        (Abi::I386, Reg::Sysarg3) => regs.rdx,
        (Abi::I386, Reg::Sysarg4) => regs.rsi,
        (Abi::I386, Reg::Sysarg5) => regs.rdi,
        (Abi::I386, Reg::Sysarg6) => regs.rbp,
    };
    match abi {
        Abi::X86_64 => value,
        Abi::I386 => value & 0xffff_ffff,
    }
}

pub fn reg_slot_mut(regs: &mut Regs, abi: Abi, reg: Reg) -> &mut Word {
    match (abi, reg) {
        (_, Reg::SysargNum) => &mut regs.orig_rax,
        (_, Reg::SysargResult) => &mut regs.rax,
        (_, Reg::StackPointer) => &mut regs.rsp,
        (_, Reg::InstrPointer) => &mut regs.rip,
        (Abi::X86_64, Reg::Sysarg1) => &mut regs.rdi,
        (Abi::X86_64, Reg::Sysarg2) => &mut regs.rsi,
        (Abi::X86_64, Reg::Sysarg3) => &mut regs.rdx,
        (Abi::X86_64, Reg::Sysarg4) => &mut regs.r10,
        (Abi::X86_64, Reg::Sysarg5) => &mut regs.r8,
        (Abi::X86_64, Reg::Sysarg6) => &mut regs.r9,
        (Abi::I386, Reg::Sysarg1) => &mut regs.rbx,
        (Abi::I386, Reg::Sysarg2) => &mut regs.rcx,
        (Abi::I386, Reg::Sysarg3) => &mut regs.rdx,
        (Abi::I386, Reg::Sysarg4) => &mut regs.rsi,
        (Abi::I386, Reg::Sysarg5) => &mut regs.rdi,
        (Abi::I386, Reg::Sysarg6) => &mut regs.rbp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i386_args_live_in_legacy_registers() {
        let mut regs = zeroed_regs();
        regs.rbx = 0x1_0000_0003;
        regs.rdi = 7;
        assert_eq!(reg_slot(&regs, Abi::I386, Reg::Sysarg1), 3);
        assert_eq!(reg_slot(&regs, Abi::X86_64, Reg::Sysarg1), 7);
        assert_eq!(reg_slot(&regs, Abi::I386, Reg::Sysarg5), 7);
    }

    #[test]
    fn test_systrap_num_is_not_sysarg_num() {
        let mut regs = zeroed_regs();
        *reg_slot_mut(&mut regs, Abi::X86_64, SYSTRAP_NUM) = 1;
        *reg_slot_mut(&mut regs, Abi::X86_64, Reg::SysargNum) = 2;
        assert_eq!(regs.rax, 1);
        assert_eq!(regs.orig_rax, 2);
    }
}
