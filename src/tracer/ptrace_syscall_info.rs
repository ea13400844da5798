use crate::result::Result;
use crate::sysnum::Abi;
use nix::unistd::Pid;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use simple_error::bail;
use simple_error::try_with;
use std::mem::size_of;
use std::mem::MaybeUninit;

const PTRACE_GET_SYSCALL_INFO: u32 = 0x420e;

#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, FromPrimitive)]
#[allow(non_camel_case_types, clippy::upper_case_acronyms)]
enum OpType {
    PTRACE_SYSCALL_INFO_NONE = 0,
    PTRACE_SYSCALL_INFO_ENTRY = 1,
    PTRACE_SYSCALL_INFO_EXIT = 2,
    PTRACE_SYSCALL_INFO_SECCOMP = 3,
}

#[repr(C)]
#[derive(Copy, Clone, Debug)]
struct Entry {
    nr: u64,
    args: [u64; 6],
}

#[repr(C)]
#[derive(Copy, Clone, Debug)]
struct Exit {
    rval: i64,
    is_error: u8,
}

#[repr(C)]
#[derive(Copy, Clone, Debug)]
struct Seccomp {
    nr: u64,
    args: [u64; 6],
    ret_data: u32,
}

#[repr(C)]
#[derive(Copy, Clone)]
union RawData {
    entry: Entry,
    exit: Exit,
    seccomp: Seccomp,
}

/// equivalent to ptrace_syscall_info
#[repr(C)]
#[derive(Copy, Clone)]
struct RawInfo {
    /// raw `OpType`, the kernel may know more than we do
    op: u8,
    arch: u32,
    instruction_pointer: u64,
    stack_pointer: u64,
    data: RawData,
}

/// Size of the fields every answer contains.
const HEADER_SIZE: usize = size_of::<RawInfo>() - size_of::<RawData>();

/// See man ptrace (linux) for reference.
#[derive(Copy, Clone, Debug)]
pub struct SyscallInfo {
    pub arch: u32,
    pub instruction_pointer: u64,
    pub stack_pointer: u64,
    pub op: SyscallOp,
}

impl SyscallInfo {
    /// ABI the stopped syscall was made with.
    pub fn abi(&self) -> Result<Abi> {
        match Abi::from_audit_arch(self.arch) {
            Some(abi) => Ok(abi),
            None => bail!("unsupported syscall arch: {:#x}", self.arch),
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub enum SyscallOp {
    Entry { nr: u64, args: [u64; 6] },
    Exit { rval: i64, is_error: u8 },
    Seccomp { nr: u64, args: [u64; 6], ret_data: u32 },
    None,
}

fn parse_raw_data(info: RawInfo) -> Result<SyscallOp> {
    let op = match OpType::from_u8(info.op) {
        Some(op) => op,
        None => bail!("unknown ptrace_syscall_info.op: {}", info.op),
    };
    // Safe, because op tells which union field the kernel filled in.
    let op = unsafe {
        match op {
            OpType::PTRACE_SYSCALL_INFO_NONE => SyscallOp::None,
            OpType::PTRACE_SYSCALL_INFO_ENTRY => SyscallOp::Entry {
                nr: info.data.entry.nr,
                args: info.data.entry.args,
            },
            OpType::PTRACE_SYSCALL_INFO_EXIT => SyscallOp::Exit {
                rval: info.data.exit.rval,
                is_error: info.data.exit.is_error,
            },
            OpType::PTRACE_SYSCALL_INFO_SECCOMP => SyscallOp::Seccomp {
                nr: info.data.seccomp.nr,
                args: info.data.seccomp.args,
                ret_data: info.data.seccomp.ret_data,
            },
        }
    };

    Ok(op)
}

fn parse_raw_info(raw: RawInfo) -> Result<SyscallInfo> {
    let info = SyscallInfo {
        arch: raw.arch,
        instruction_pointer: raw.instruction_pointer,
        stack_pointer: raw.stack_pointer,
        op: parse_raw_data(raw)?,
    };
    Ok(info)
}

pub fn get_syscall_info(pid: Pid) -> Result<SyscallInfo> {
    let mut info = MaybeUninit::<RawInfo>::zeroed();
    // Safe, because the kernel writes at most size_of::<RawInfo>() bytes. It
    // returns the size of the data it has, which only covers the union member
    // selected by `op`; the rest stays zeroed.
    let ret = unsafe {
        libc::ptrace(
            PTRACE_GET_SYSCALL_INFO,
            pid.as_raw(),
            size_of::<RawInfo>(),
            info.as_mut_ptr(),
        )
    };
    if ret <= 0 {
        bail!(
            "ptrace get syscall info error: {}",
            nix::errno::Errno::last()
        );
    }
    if (ret as usize) < HEADER_SIZE {
        bail!("ptrace wrote unexpected number of bytes: {}", ret);
    }
    let info = unsafe { info.assume_init() };
    let info = try_with!(
        parse_raw_info(info),
        "cannot understand ptrace(PTRACE_GET_SYSCALL_INFO) response"
    );
    Ok(info)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn assert_struct_sizes() {
        assert_eq!(HEADER_SIZE, 24);
        assert_eq!(size_of::<RawInfo>(), 88);
    }

    #[test]
    fn test_parse_exit() {
        let mut raw: RawInfo = unsafe { MaybeUninit::zeroed().assume_init() };
        raw.op = 2;
        raw.arch = 0x4000_0003;
        raw.data.exit = Exit {
            rval: -4,
            is_error: 1,
        };
        let info = parse_raw_info(raw).expect("cannot parse");
        assert_eq!(info.abi().expect("unknown abi"), Abi::I386);
        match info.op {
            SyscallOp::Exit { rval, is_error } => {
                assert_eq!(rval, -4);
                assert_eq!(is_error, 1);
            }
            op => panic!("unexpected op: {:?}", op),
        }
    }

    #[test]
    fn test_parse_unknown_op() {
        let mut raw: RawInfo = unsafe { MaybeUninit::zeroed().assume_init() };
        raw.op = 42;
        assert!(parse_raw_info(raw).is_err());
    }
}
