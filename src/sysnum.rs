use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::cpu::Word;

const AUDIT_ARCH_X86_64: u32 = 0xc000_003e;
const AUDIT_ARCH_I386: u32 = 0x4000_0003;

/// Calling convention a tracee currently uses for syscalls.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Abi {
    X86_64,
    /// 32-bit binaries running in compatibility mode
    I386,
}

impl Abi {
    /// Map the `AUDIT_ARCH_*` value reported by `PTRACE_GET_SYSCALL_INFO`.
    #[must_use]
    pub fn from_audit_arch(arch: u32) -> Option<Abi> {
        match arch {
            AUDIT_ARCH_X86_64 => Some(Abi::X86_64),
            AUDIT_ARCH_I386 => Some(Abi::I386),
            _ => None,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Abi::X86_64 => "x86_64",
            Abi::I386 => "i386",
        }
    }
}

impl FromStr for Abi {
    type Err = String;

    fn from_str(s: &str) -> Result<Abi, String> {
        match s {
            "x86_64" => Ok(Abi::X86_64),
            "i386" => Ok(Abi::I386),
            _ => Err(format!("unknown abi: {}", s)),
        }
    }
}

/// The concrete number meaning "no syscall": the kernel skips the syscall
/// and reports -ENOSYS.
const VOID_NUMBER: Word = -1i64 as Word;

macro_rules! sysnums {
    ($($variant:ident => $name:expr, $x86_64:expr, $i386:expr;)*) => {
        /// Logical syscall identifiers, independent of the tracee's ABI.
        #[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
        pub enum Sysnum {
            /// cancels the current syscall
            Void,
            /// a concrete number this table has no entry for
            Unknown,
            $($variant,)*
        }

        const SYSNUMS: &[(Sysnum, &str, Word, Word)] = &[
            $((Sysnum::$variant, $name, $x86_64 as Word, $i386),)*
        ];
    };
}

sysnums! {
    Read => "read", libc::SYS_read, 3;
    Write => "write", libc::SYS_write, 4;
    Open => "open", libc::SYS_open, 5;
    Close => "close", libc::SYS_close, 6;
    Lseek => "lseek", libc::SYS_lseek, 19;
    Getpid => "getpid", libc::SYS_getpid, 20;
    Getppid => "getppid", libc::SYS_getppid, 64;
    Gettid => "gettid", libc::SYS_gettid, 224;
    Dup => "dup", libc::SYS_dup, 41;
    Dup2 => "dup2", libc::SYS_dup2, 63;
    Pipe => "pipe", libc::SYS_pipe, 42;
    Ioctl => "ioctl", libc::SYS_ioctl, 54;
    Access => "access", libc::SYS_access, 33;
    Fsync => "fsync", libc::SYS_fsync, 118;
    Fdatasync => "fdatasync", libc::SYS_fdatasync, 148;
    Getcwd => "getcwd", libc::SYS_getcwd, 183;
    Chdir => "chdir", libc::SYS_chdir, 12;
    Fchdir => "fchdir", libc::SYS_fchdir, 133;
    Rename => "rename", libc::SYS_rename, 38;
    Mkdir => "mkdir", libc::SYS_mkdir, 39;
    Rmdir => "rmdir", libc::SYS_rmdir, 40;
    Unlink => "unlink", libc::SYS_unlink, 10;
    Symlink => "symlink", libc::SYS_symlink, 83;
    Readlink => "readlink", libc::SYS_readlink, 85;
    Chmod => "chmod", libc::SYS_chmod, 15;
    Openat => "openat", libc::SYS_openat, 295;
    Mkdirat => "mkdirat", libc::SYS_mkdirat, 296;
    Fstatat => "fstatat", libc::SYS_newfstatat, 300;
    Unlinkat => "unlinkat", libc::SYS_unlinkat, 301;
    Renameat => "renameat", libc::SYS_renameat, 302;
    Readlinkat => "readlinkat", libc::SYS_readlinkat, 305;
    Nanosleep => "nanosleep", libc::SYS_nanosleep, 162;
    Wait4 => "wait4", libc::SYS_wait4, 114;
    Kill => "kill", libc::SYS_kill, 37;
    Execve => "execve", libc::SYS_execve, 11;
    Exit => "exit", libc::SYS_exit, 1;
    ExitGroup => "exit_group", libc::SYS_exit_group, 252;
    Uname => "uname", libc::SYS_uname, 122;
    Brk => "brk", libc::SYS_brk, 45;
    Munmap => "munmap", libc::SYS_munmap, 91;
}

lazy_static! {
    static ref X86_64_SYSNUMS: HashMap<Word, Sysnum> =
        SYSNUMS.iter().map(|&(s, _, nr, _)| (nr, s)).collect();
    static ref I386_SYSNUMS: HashMap<Word, Sysnum> =
        SYSNUMS.iter().map(|&(s, _, _, nr)| (nr, s)).collect();
}

impl Sysnum {
    fn entry(self) -> Option<&'static (Sysnum, &'static str, Word, Word)> {
        SYSNUMS.iter().find(|(s, _, _, _)| *s == self)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Sysnum::Void => "void",
            Sysnum::Unknown => "unknown",
            _ => self.entry().map_or("unknown", |e| e.1),
        }
    }
}

impl fmt::Display for Sysnum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Sysnum {
    type Err = String;

    fn from_str(s: &str) -> Result<Sysnum, String> {
        if s == "void" {
            return Ok(Sysnum::Void);
        }
        SYSNUMS
            .iter()
            .find(|(_, name, _, _)| *name == s)
            .map(|e| e.0)
            .ok_or_else(|| format!("unknown syscall: {}", s))
    }
}

/// Concrete number of `sysnum` for `abi`.
///
/// # Panics
///
/// `Sysnum::Unknown` carries no number; asking for one is a bug in the caller.
#[must_use]
pub fn detranslate_sysnum(abi: Abi, sysnum: Sysnum) -> Word {
    if sysnum == Sysnum::Void {
        return VOID_NUMBER;
    }
    let entry = sysnum
        .entry()
        .unwrap_or_else(|| panic!("BUG! no concrete number for {:?}", sysnum));
    match abi {
        Abi::X86_64 => entry.2,
        Abi::I386 => entry.3,
    }
}

/// Logical identifier of the concrete syscall number `nr` under `abi`.
#[must_use]
pub fn translate_sysnum(abi: Abi, nr: Word) -> Sysnum {
    let nr = match abi {
        Abi::X86_64 => nr,
        Abi::I386 => nr & 0xffff_ffff,
    };
    if nr == VOID_NUMBER || (abi == Abi::I386 && nr == VOID_NUMBER & 0xffff_ffff) {
        return Sysnum::Void;
    }
    let table = match abi {
        Abi::X86_64 => &*X86_64_SYSNUMS,
        Abi::I386 => &*I386_SYSNUMS,
    };
    table.get(&nr).copied().unwrap_or(Sysnum::Unknown)
}
