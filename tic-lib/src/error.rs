use std::io;
use thiserror::Error;

/// The primary error type for the `tic-lib` library.
#[derive(Error, Debug)]
pub enum TicError {
    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Timeout during serial operation: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("Opcode {opcode:#04x} takes {expected} data bytes, got {actual}")]
    ArityMismatch { opcode: u8, expected: usize, actual: usize },

    #[error("Unknown opcode {0:#04x}")]
    UnknownOpcode(u8),

    #[error("Invalid device address {0}: must be in 0..=127")]
    InvalidAddress(u8),

    #[error("Did not reach home {home} after {attempts} attempts (last position {last_position})")]
    HomingFailed {
        home: i32,
        attempts: u32,
        last_position: i32,
    },
}

/// Coarse error categories used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Opening, writing or reading the serial link failed, including timeouts.
    Transport,
    /// The device answered with fewer bytes than requested.
    Protocol,
    /// A command could not be built; no I/O was attempted.
    Encoding,
    /// The home-return loop gave up.
    Homing,
}

impl TicError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TicError::Serial(_) | TicError::Io(_) | TicError::Timeout(_) => ErrorKind::Transport,
            TicError::ShortRead { .. } => ErrorKind::Protocol,
            TicError::ArityMismatch { .. } | TicError::UnknownOpcode(_) | TicError::InvalidAddress(_) => {
                ErrorKind::Encoding
            }
            TicError::HomingFailed { .. } => ErrorKind::Homing,
        }
    }
}
