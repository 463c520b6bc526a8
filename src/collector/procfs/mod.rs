//! Readers for the Linux `/proc` filesystem.
//!
//! `parser` holds the pure parsing functions; the collectors in the parent
//! module combine them with a [`FileSystem`](crate::collector::FileSystem).

pub mod parser;

use std::time::Duration;

pub use parser::ParseError;

/// Clock ticks per second (USER_HZ). Standard value for Linux.
pub const CLK_TCK: u64 = 100;

/// Error type for collection failures.
#[derive(Debug)]
pub enum CollectError {
    /// I/O error reading a counter file.
    Io(std::io::Error),
    /// Counter file had an unexpected format.
    Parse(String),
    /// The collector did not answer before its deadline.
    Timeout {
        collector: &'static str,
        after: Duration,
    },
    /// The source exists but has nothing usable (no interface, worker died).
    Unavailable(String),
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::Io(e) => write!(f, "I/O error: {}", e),
            CollectError::Parse(msg) => write!(f, "parse error: {}", msg),
            CollectError::Timeout { collector, after } => {
                write!(f, "{} collector timed out after {:?}", collector, after)
            }
            CollectError::Unavailable(msg) => write!(f, "unavailable: {}", msg),
        }
    }
}

impl std::error::Error for CollectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CollectError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CollectError {
    fn from(e: std::io::Error) -> Self {
        CollectError::Io(e)
    }
}

impl From<ParseError> for CollectError {
    fn from(e: ParseError) -> Self {
        CollectError::Parse(e.message)
    }
}
