use onewire_proto::Errno;

/// Core-wide error type. Every fallible operation in this crate returns
/// one of these; the dispatcher is the only place that needs to know how
/// each variant maps onto a POSIX errno.
#[derive(Debug, thiserror::Error, Clone)]
pub enum CoreError {
    #[error("no such entry: {0}")]
    NotFound(String),
    #[error("malformed path: {0}")]
    BadFormat(String),
    #[error("path denotes a directory, not a property")]
    IsDirectory,
    #[error("device not present on any configured bus")]
    NoDevice,
    #[error("property has no read handler")]
    NotReadable,
    #[error("property has no write handler")]
    NotWritable,
    #[error("filesystem is mounted read-only")]
    ReadOnly,
    #[error("non-zero offset is not valid for this format")]
    InvalidOffset,
    #[error("value out of range for this property")]
    OutOfRange,
    #[error("bus is busy: lock not acquired within deadline")]
    BusBusy,
    #[error("operation timed out")]
    TimedOut,
    #[error("CRC mismatch on the wire")]
    CrcError,
    #[error("adapter does not support this operation")]
    NotSupported,
    #[error("transport error: {0}")]
    Io(String),
    #[error("out of memory")]
    NoMemory,
}

impl CoreError {
    /// Maps a core error onto the POSIX errno set the entry points promise
    /// to surface. Parse/contract errors are exact; transport and resource
    /// errors collapse onto the nearest POSIX code.
    pub fn errno(&self) -> Errno {
        match self {
            CoreError::NotFound(_) => Errno::NoEnt,
            CoreError::BadFormat(_) => Errno::Inval,
            CoreError::IsDirectory => Errno::IsDir,
            CoreError::NoDevice => Errno::NoDev,
            // No read/write handler is the read-only contract, not an
            // adapter capability gap — reserve `NotSup` for `NotSupported`.
            CoreError::NotReadable | CoreError::NotWritable => Errno::RoFs,
            CoreError::ReadOnly => Errno::RoFs,
            CoreError::InvalidOffset => Errno::Inval,
            CoreError::OutOfRange => Errno::Range,
            CoreError::BusBusy => Errno::ConnAborted,
            CoreError::TimedOut => Errno::TimedOut,
            CoreError::CrcError | CoreError::Io(_) => Errno::Io,
            CoreError::NotSupported => Errno::NotSup,
            CoreError::NoMemory => Errno::NoMem,
        }
    }

    /// Transport errors get up to three attempts before giving up.
    /// Parse, contract, and presence errors never do.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::CrcError | CoreError::BusBusy)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_handler_maps_to_read_only_not_not_supported() {
        assert!(matches!(CoreError::NotReadable.errno(), Errno::RoFs));
        assert!(matches!(CoreError::NotWritable.errno(), Errno::RoFs));
        assert!(matches!(CoreError::NotSupported.errno(), Errno::NotSup));
    }
}
