use std::fmt;
use std::io;

/// Errors returned by the controller core.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// Packet specified an invalid length value or was too short.
    ///
    /// This indicates a protocol violation; the connection carrying it should be torn down.
    InvalidLength,

    /// Invalid value supplied for a field.
    InvalidValue,

    /// Unexpectedly reached EOF while reading data.
    Eof,

    /// Parsing didn't consume the entire buffer.
    IncompleteParse,

    /// An HCI command was well-formed but could not be executed (see the accompanying status).
    CommandFailed(crate::hci::event::ErrorCode),

    /// I/O error at the socket boundary.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidLength => f.write_str("invalid length value specified"),
            Error::InvalidValue => f.write_str("invalid value for field"),
            Error::Eof => f.write_str("end of buffer"),
            Error::IncompleteParse => f.write_str("excess data in buffer"),
            Error::CommandFailed(code) => write!(f, "command failed: {:?}", code),
            Error::Io(e) => write!(f, "i/o error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
