//! POSIX errno mapping used at every core/collaborator boundary.

use std::fmt;

/// The POSIX error codes the core may surface at its entry points.
///
/// Kept as a closed enum rather than a bare `i32` so wire encoding and
/// `CoreError` conversions stay exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Errno {
    Success,
    NoEnt,
    IsDir,
    NotDir,
    NotSup,
    RoFs,
    Inval,
    AddrNotAvail,
    Range,
    NoMem,
    NoDev,
    ConnAborted,
    TimedOut,
    Io,
}

impl Errno {
    /// The raw `errno.h` value, for collaborators that want `-errno`.
    pub fn raw(self) -> i32 {
        match self {
            Errno::Success => 0,
            Errno::NoEnt => libc_errno::ENOENT,
            Errno::IsDir => libc_errno::EISDIR,
            Errno::NotDir => libc_errno::ENOTDIR,
            Errno::NotSup => libc_errno::ENOTSUP,
            Errno::RoFs => libc_errno::EROFS,
            Errno::Inval => libc_errno::EINVAL,
            Errno::AddrNotAvail => libc_errno::EADDRNOTAVAIL,
            Errno::Range => libc_errno::ERANGE,
            Errno::NoMem => libc_errno::ENOMEM,
            Errno::NoDev => libc_errno::ENODEV,
            Errno::ConnAborted => libc_errno::ECONNABORTED,
            Errno::TimedOut => libc_errno::ETIMEDOUT,
            Errno::Io => libc_errno::EIO,
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Numeric constants mirroring `<errno.h>` without pulling in `libc` for a
/// handful of integers the wire format needs to serialize portably.
mod libc_errno {
    pub const ENOENT: i32 = 2;
    pub const EIO: i32 = 5;
    pub const ENODEV: i32 = 19;
    pub const ENOTDIR: i32 = 20;
    pub const EISDIR: i32 = 21;
    pub const EINVAL: i32 = 22;
    pub const ENOMEM: i32 = 12;
    pub const EROFS: i32 = 30;
    pub const ERANGE: i32 = 34;
    pub const ENOTSUP: i32 = 95;
    pub const EADDRNOTAVAIL: i32 = 99;
    pub const ETIMEDOUT: i32 = 110;
    pub const ECONNABORTED: i32 = 103;
}
