pub mod chain;

use log::trace;

use crate::cpu::Reg;
use crate::policy::SyscallPolicy;
use crate::result::errno_word;
use crate::sysnum::Sysnum;
use crate::tracee::{RegVersion, Tracee};

/// Handle the entry of a syscall. Registers must have been fetched, the caller
/// pushes them afterwards.
pub fn translate_syscall_enter(tracee: &mut Tracee, policy: &mut dyn SyscallPolicy) {
    // never restore original register values at the end of this stage
    tracee.restore_original_regs = false;

    // Only syscalls the tracee requested are translated, chained ones were
    // forged already.
    let status = if tracee.chain.is_active() {
        policy.chained_sysenter(tracee)
    } else {
        tracee.save_current_regs(RegVersion::Original);
        let status = policy.sysenter(tracee);
        tracee.save_current_regs(RegVersion::Modified);
        status
    };
    trace!(
        "{}: sysenter {} -> {:?}",
        tracee.pid,
        tracee.get_sysnum(RegVersion::Current),
        status
    );

    tracee.denied = status.err();
    if let Some(errno) = tracee.denied {
        tracee.set_sysnum(Sysnum::Void);
        tracee.poke_reg(Reg::SysargResult, errno_word(errno));
    }
}

/// Handle the exit of a syscall and insert the next chained syscall, if any.
pub fn translate_syscall_exit(tracee: &mut Tracee, policy: &mut dyn SyscallPolicy) {
    // by default, restore original register values at the end of this stage
    tracee.restore_original_regs = true;

    if let Some(errno) = tracee.denied.take() {
        tracee.poke_reg(Reg::SysargResult, errno_word(errno));
    }

    // A successful execve replaced the whole register file, the new one is
    // what must be restored.
    if tracee.get_sysnum(RegVersion::Original) == Sysnum::Execve
        && tracee.peek_reg(RegVersion::Current, Reg::SysargResult) == 0
    {
        tracee.save_current_regs(RegVersion::Original);
    }

    let status = if tracee.chain.is_active() {
        policy.chained_sysexit(tracee)
    } else {
        policy.sysexit(tracee)
    };
    if let Err(errno) = status {
        tracee.poke_reg(Reg::SysargResult, errno_word(errno));
    }
    trace!(
        "{}: sysexit {} = {}",
        tracee.pid,
        tracee.get_sysnum(RegVersion::Original),
        tracee.peek_reg(RegVersion::Current, Reg::SysargResult) as i64
    );

    if tracee.chain.is_active() {
        chain::chain_next_syscall(tracee);
    }
}
