//! Exit codes for the CLI.
//!
//! Scripts can tell a wrong password apart from a damaged principal or
//! record without parsing error text.

/// Successful execution
pub const SUCCESS: u8 = 0;

/// General/unspecified error
pub const GENERAL_ERROR: u8 = 1;

/// Command-line usage error (bad arguments). Emitted by clap itself.
#[allow(dead_code)]
pub const USAGE_ERROR: u8 = 2;

/// Authentication failed (wrong password, invalid token signature)
pub const AUTH_FAILED: u8 = 3;

/// Private state or a record failed its integrity checks
pub const INTEGRITY: u8 = 4;

/// Principal or record not found
pub const NOT_FOUND: u8 = 5;
