//! Exit codes for the `tablelog` CLI.
//!
//! Exit codes communicate operation outcome without requiring output parsing.

/// Exit codes for tablelog operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Completed without errors
    Clean = 0,

    /// Some input lines could not be parsed or written
    PartialFail = 3,

    /// Refused without explicit confirmation
    Refused = 4,

    /// Configuration error
    ConfigError = 10,

    /// Schema creation/migration error
    SchemaError = 11,

    /// Row insert error
    WriteError = 12,

    /// I/O error
    IoError = 13,

    /// Database access or retention error
    DatabaseError = 14,

    /// Internal/unknown error
    InternalError = 99,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Exit code for a unified error.
    pub fn for_error(err: &tl_common::Error) -> Self {
        match err.code() {
            10..=19 => ExitCode::ConfigError,
            20..=29 => ExitCode::SchemaError,
            30..=39 => ExitCode::WriteError,
            40..=59 => ExitCode::DatabaseError,
            60..=69 => ExitCode::IoError,
            _ => ExitCode::InternalError,
        }
    }
}
