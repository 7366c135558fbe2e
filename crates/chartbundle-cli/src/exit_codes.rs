//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success - operation completed without errors
pub const SUCCESS: u8 = 0;

/// General error - unspecified failure
pub const ERROR: u8 = 1;

/// Validation error - invalid option values or configuration
pub const VALIDATION_ERROR: u8 = 2;

/// Template error - chart rendering failed
pub const TEMPLATE_ERROR: u8 = 3;

/// Chart error - malformed chart archive or Chart.yaml
pub const CHART_ERROR: u8 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: u8 = 5;

/// Server error - download, search or bundle creation failed
pub const SERVER_ERROR: u8 = 6;
