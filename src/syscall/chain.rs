//! Syscall chaining: splice syscalls forged by the supervisor between the
//! syscall a tracee requested and the result it eventually observes.
//!
//! At the exit of a syscall, policies queue new syscalls with
//! [`register_chained_syscall`]. [`chain_next_syscall`] is then called at
//! every syscall exit of the tracee: it loads the next queued syscall into the
//! live registers and moves the instruction pointer back onto the trap
//! instruction, so the kernel executes the trap once more with the forged
//! registers. Once the queue is drained it releases it and, if requested
//! through [`force_chain_final_result`], overrides the result the tracee sees.

use log::debug;
use nix::errno::Errno;
use std::collections::VecDeque;

use crate::cpu::{Reg, Word, SYSARGS, SYSTRAP_NUM};
use crate::result::SysResult;
use crate::sysnum::{detranslate_sysnum, Sysnum};
use crate::tracee::{RegVersion, Tracee};

/// A syscall queued by [`register_chained_syscall`], not inserted yet.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChainedSyscall {
    pub sysnum: Sysnum,
    pub sysargs: [Word; 6],
}

/// Chain state of a tracee.
#[derive(Debug, Default)]
pub struct Chain {
    /// `None` as long as no chain was started. Dropped as soon as the last
    /// chained syscall has returned.
    syscalls: Option<VecDeque<ChainedSyscall>>,
    force_final_result: bool,
    final_result: Word,
}

impl Chain {
    /// Whether a chain was started and has not been completed yet.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.syscalls.is_some()
    }

    /// Number of chained syscalls that were not inserted yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.syscalls.as_ref().map_or(0, VecDeque::len)
    }

    #[must_use]
    pub fn final_result(&self) -> Option<Word> {
        if self.force_final_result {
            Some(self.final_result)
        } else {
            None
        }
    }
}

/// Shorthand for [`register_chained_syscall`] taking up to six arguments.
/// Missing arguments are zero.
///
/// ```ignore
/// chained_syscall!(tracee, Sysnum::Close, fd)?;
/// ```
#[macro_export]
macro_rules! chained_syscall {
    ($tracee:expr, $nr:expr) => {
        $crate::syscall::chain::register_chained_syscall($tracee, $nr, [0, 0, 0, 0, 0, 0])
    };

    ($tracee:expr, $nr:expr, $a1:expr) => {
        $crate::syscall::chain::register_chained_syscall(
            $tracee,
            $nr,
            [
                $a1 as $crate::cpu::Word,
                0,
                0,
                0,
                0,
                0,
            ],
        )
    };

    ($tracee:expr, $nr:expr, $a1:expr, $a2:expr) => {
        $crate::syscall::chain::register_chained_syscall(
            $tracee,
            $nr,
            [
                $a1 as $crate::cpu::Word,
                $a2 as $crate::cpu::Word,
                0,
                0,
                0,
                0,
            ],
        )
    };

    ($tracee:expr, $nr:expr, $a1:expr, $a2:expr, $a3:expr) => {
        $crate::syscall::chain::register_chained_syscall(
            $tracee,
            $nr,
            [
                $a1 as $crate::cpu::Word,
                $a2 as $crate::cpu::Word,
                $a3 as $crate::cpu::Word,
                0,
                0,
                0,
            ],
        )
    };

    ($tracee:expr, $nr:expr, $a1:expr, $a2:expr, $a3:expr, $a4:expr) => {
        $crate::syscall::chain::register_chained_syscall(
            $tracee,
            $nr,
            [
                $a1 as $crate::cpu::Word,
                $a2 as $crate::cpu::Word,
                $a3 as $crate::cpu::Word,
                $a4 as $crate::cpu::Word,
                0,
                0,
            ],
        )
    };

    ($tracee:expr, $nr:expr, $a1:expr, $a2:expr, $a3:expr, $a4:expr, $a5:expr) => {
        $crate::syscall::chain::register_chained_syscall(
            $tracee,
            $nr,
            [
                $a1 as $crate::cpu::Word,
                $a2 as $crate::cpu::Word,
                $a3 as $crate::cpu::Word,
                $a4 as $crate::cpu::Word,
                $a5 as $crate::cpu::Word,
                0,
            ],
        )
    };

    ($tracee:expr, $nr:expr, $a1:expr, $a2:expr, $a3:expr, $a4:expr, $a5:expr, $a6:expr) => {
        $crate::syscall::chain::register_chained_syscall(
            $tracee,
            $nr,
            [
                $a1 as $crate::cpu::Word,
                $a2 as $crate::cpu::Word,
                $a3 as $crate::cpu::Word,
                $a4 as $crate::cpu::Word,
                $a5 as $crate::cpu::Word,
                $a6 as $crate::cpu::Word,
            ],
        )
    };
}

/// Append `sysnum(sysargs)` to the syscalls chained after the current one.
/// They are inserted in order once the current syscall is done. Fails with
/// `ENOMEM` if the queue cannot grow and with `ENOSYS` for
/// `Sysnum::Unknown`. Nothing is queued on failure.
pub fn register_chained_syscall(
    tracee: &mut Tracee,
    sysnum: Sysnum,
    sysargs: [Word; 6],
) -> SysResult<()> {
    if sysnum == Sysnum::Unknown {
        return Err(Errno::ENOSYS);
    }
    let mut fresh = None;
    let syscalls = match tracee.chain.syscalls.as_mut() {
        Some(syscalls) => syscalls,
        None => fresh.get_or_insert_with(VecDeque::new),
    };
    syscalls.try_reserve(1).map_err(|_| Errno::ENOMEM)?;
    syscalls.push_back(ChainedSyscall { sysnum, sysargs });

    if let Some(syscalls) = fresh {
        tracee.chain.syscalls = Some(syscalls);
    }
    debug!(
        "{}: chained {}({:x?}), {} pending",
        tracee.pid,
        sysnum,
        sysargs,
        tracee.chain.pending()
    );
    Ok(())
}

/// Insert the first pending chained syscall, or terminate the chain if none
/// is left. Must only be called at the end of a sysexit stage.
///
/// # Panics
///
/// If no chain was started for `tracee`.
pub fn chain_next_syscall(tracee: &mut Tracee) {
    let pid = tracee.pid;
    let syscalls = tracee
        .chain
        .syscalls
        .as_mut()
        .unwrap_or_else(|| panic!("BUG! no syscall chain for {}", pid));

    let syscall = match syscalls.pop_front() {
        Some(syscall) => syscall,
        None => {
            // Every chained syscall has returned: the result of the syscall
            // the tracee requested is the one left in the registers, unless
            // a policy overrode it.
            tracee.chain.syscalls = None;
            if let Some(result) = tracee.chain.final_result() {
                tracee.poke_reg(Reg::SysargResult, result);
            }
            tracee.chain.force_final_result = false;
            tracee.chain.final_result = 0;
            debug!("{}: syscall chain done", tracee.pid);
            return;
        }
    };

    // Original register values will be restored right after the last
    // chained syscall.
    tracee.restore_original_regs = false;

    for (reg, value) in SYSARGS.iter().zip(syscall.sysargs.iter()) {
        tracee.poke_reg(*reg, *value);
    }
    let nr = detranslate_sysnum(tracee.abi, syscall.sysnum);
    tracee.poke_reg(SYSTRAP_NUM, nr);
    tracee.rewind_to_systrap();

    debug!(
        "{}: insert chained {} (nr {})",
        tracee.pid, syscall.sysnum, nr as i64
    );
}

/// Override the result the tracee observes once the current chain is done.
/// A later call replaces the value.
pub fn force_chain_final_result(tracee: &mut Tracee, forced_result: Word) {
    tracee.chain.force_final_result = true;
    tracee.chain.final_result = forced_result;
}

/// Make the kernel run the syscall of `tracee` once more, exactly as the
/// tracee requested it at its entry. Never fails, the result type mirrors
/// [`register_chained_syscall`].
pub fn restart_original_syscall(tracee: &mut Tracee) -> SysResult<()> {
    for reg in SYSARGS.iter() {
        tracee.poke_reg(*reg, tracee.peek_reg(RegVersion::Original, *reg));
    }
    tracee.poke_reg(
        SYSTRAP_NUM,
        tracee.peek_reg(RegVersion::Original, Reg::SysargNum),
    );
    tracee.rewind_to_systrap();

    debug!(
        "{}: restart {}",
        tracee.pid,
        tracee.get_sysnum(RegVersion::Original)
    );
    Ok(())
}
