use std::{error, fmt, io};

const ENOENT: i32 = 2;
const EIO: i32 = 5;
const EBADF: i32 = 9;
const ERANGE: i32 = 34;
const ENOTSUP: i32 = 95;

/// The error type used by the `romprops` library.
#[derive(Debug)]
pub enum Error {
    /// A structure failed validation (bad magic, impossible size, ...).
    Malformed(String),
    Io(io::Error),
    /// The input is not in any format this crate understands.
    Unsupported,
    /// Optional data (an image, a resource, a section) is not present.
    NotFound(String),
    /// A read was attempted outside of a source's window.
    OutOfRange { offset: u64, len: u64, size: u64 },
    /// The reader or source has been closed.
    Closed,
    /// A key needed for decryption is not configured.
    KeyUnavailable(String),
    /// A lazily initialized object failed earlier; this is the remembered
    /// failure.
    Cached(Failure),
}

impl Error {
    /// Creates an `Error` denoting that an address computation would have lead
    /// to an overflow.
    pub(crate) fn addr_overflow(base: u64, offset: u64) -> Self {
        Error::Malformed(format!(
            "invalid address or length: address computation overflow ({:#08X}+{:#08X})",
            base, offset
        ))
    }

    /// Returns the negative POSIX error code corresponding to this error.
    pub fn code(&self) -> i32 {
        match self {
            Error::Malformed(_) | Error::Io(_) => -EIO,
            Error::Unsupported => -ENOTSUP,
            Error::NotFound(_) | Error::KeyUnavailable(_) => -ENOENT,
            Error::OutOfRange { .. } => -ERANGE,
            Error::Closed => -EBADF,
            Error::Cached(failure) => failure.code,
        }
    }

    /// Whether this error means "not present" rather than "broken".
    pub fn is_not_found(&self) -> bool {
        self.code() == -ENOENT
    }
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Malformed(s) => write!(f, "malformed data: {}", s),
            Error::Io(io) => write!(f, "i/o error: {}", io),
            Error::Unsupported => f.write_str("unsupported file format"),
            Error::NotFound(s) => write!(f, "not found: {}", s),
            Error::OutOfRange { offset, len, size } => write!(
                f,
                "read of {} bytes at {:#X} is outside of source with size {:#X}",
                len, offset, size
            ),
            Error::Closed => f.write_str("source is closed"),
            Error::KeyUnavailable(name) => write!(f, "key `{}` is not available", name),
            Error::Cached(failure) => write!(f, "{} (cached)", failure.message),
        }
    }
}

impl From<io::Error> for Error {
    fn from(io: io::Error) -> Self {
        Error::Io(io)
    }
}

/// A remembered failure of a lazily initialized object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    code: i32,
    message: String,
}

impl Failure {
    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl<'a> From<&'a Error> for Failure {
    fn from(error: &'a Error) -> Self {
        Failure {
            code: error.code(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_negative_posix() {
        assert_eq!(Error::Malformed(String::new()).code(), -5);
        assert_eq!(Error::NotFound(String::new()).code(), -2);
        assert_eq!(Error::Closed.code(), -9);
        assert_eq!(Error::OutOfRange { offset: 0, len: 1, size: 0 }.code(), -34);
    }

    #[test]
    fn cached_failure_keeps_code() {
        let failure = Failure::from(&Error::KeyUnavailable("x".to_string()));
        let cached = Error::Cached(failure);
        assert_eq!(cached.code(), -2);
        assert!(cached.is_not_found());
        assert!(cached.to_string().contains("`x`"));
    }
}
