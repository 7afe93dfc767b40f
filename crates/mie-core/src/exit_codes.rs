//! Exit codes for the mie-core CLI.
//!
//! Exit code ranges:
//! - 0: Success
//! - 10-19: User/environment errors (recoverable by user action)
//! - 20-29: Internal errors (bugs, should be reported)

/// Exit codes for mie-core operations.
///
/// These codes are a stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Clean = 0,

    // ========================================================================
    // User / Environment Errors (10-19)
    // ========================================================================
    /// Invalid arguments or unreadable input
    ArgsError = 10,

    /// Invalid configuration (missing salt, negative bounds, bad settings file)
    ConfigError = 11,

    /// Payload contains a nested object or nested list
    PayloadShapeError = 12,

    /// Durable append failed; nothing was recorded
    StoreWriteError = 13,

    /// Store could not be read or contains a malformed record
    StoreReadError = 14,

    /// Hash chain verification failed
    IntegrityError = 15,

    // ========================================================================
    // Internal Errors (20-29)
    // ========================================================================
    /// Internal error (bug - please report)
    InternalError = 20,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ExitCode::Clean
    }

    /// Check if this exit code is a user/environment error (codes 10-19).
    pub fn is_user_error(self) -> bool {
        (10..20).contains(&self.as_i32())
    }

    /// Check if this exit code is an internal error (codes 20-29).
    pub fn is_internal_error(self) -> bool {
        self.as_i32() >= 20
    }

    /// Get the error code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::PayloadShapeError => "ERR_PAYLOAD_SHAPE",
            ExitCode::StoreWriteError => "ERR_STORE_WRITE",
            ExitCode::StoreReadError => "ERR_STORE_READ",
            ExitCode::IntegrityError => "ERR_INTEGRITY",
            ExitCode::InternalError => "ERR_INTERNAL",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Clean.as_i32(), 0);
        assert_eq!(ExitCode::ArgsError.as_i32(), 10);
        assert_eq!(ExitCode::ConfigError.as_i32(), 11);
        assert_eq!(ExitCode::PayloadShapeError.as_i32(), 12);
        assert_eq!(ExitCode::StoreWriteError.as_i32(), 13);
        assert_eq!(ExitCode::StoreReadError.as_i32(), 14);
        assert_eq!(ExitCode::IntegrityError.as_i32(), 15);
        assert_eq!(ExitCode::InternalError.as_i32(), 20);
    }

    #[test]
    fn test_exit_code_classes() {
        assert!(ExitCode::Clean.is_success());
        assert!(ExitCode::PayloadShapeError.is_user_error());
        assert!(!ExitCode::InternalError.is_user_error());
        assert!(ExitCode::InternalError.is_internal_error());
    }

    #[test]
    fn test_display() {
        assert_eq!(ExitCode::StoreWriteError.to_string(), "ERR_STORE_WRITE (13)");
    }
}
