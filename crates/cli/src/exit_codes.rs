//! CLI Exit Code Registry
//!
//! This is the single source of truth for all `pflow` exit codes.
//! Exit codes are part of the shell contract: cron jobs and wrappers rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                                  |
//! |---------|------------------|----------------------------------------------|
//! | 0       | Universal        | Success                                      |
//! | 1       | Universal        | General error (unspecified)                  |
//! | 2       | Universal        | CLI usage error (bad args, missing file)     |
//! | 3       | Universal        | File read/write error                        |
//! | 10-19   | config           | Config file and credential problems          |
//! | 20-29   | ship             | Shipment and label-retry passes              |
//! | 30-39   | carrier          | Carrier client setup and reachability        |
//! | 40-49   | export           | Marketplace hand-off                         |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

// =============================================================================
// Universal (0-3)
// =============================================================================

/// Success - command completed and every processed order succeeded.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unsupported input format.
pub const EXIT_USAGE: u8 = 2;

/// A file could not be read or written.
pub const EXIT_IO: u8 = 3;

// =============================================================================
// Config (10-19)
// =============================================================================

/// Explicit config path (flag or PFLOW_CONFIG) does not exist.
pub const EXIT_CONFIG_NOT_FOUND: u8 = 10;

/// Config file is not valid TOML or has wrongly typed values.
pub const EXIT_CONFIG_PARSE: u8 = 11;

/// Config parsed but required fields are missing or out of range.
pub const EXIT_CONFIG_INVALID: u8 = 12;

/// Carrier user or password not given by flag, environment or config.
pub const EXIT_CONFIG_CREDENTIALS: u8 = 13;

// =============================================================================
// Ship (20-29)
// =============================================================================

/// The pass finished but at least one order failed. Failures are recorded
/// in the shipment log and will be retried by the next pass.
pub const EXIT_SHIP_FAILURES: u8 = 20;

/// The shipment log or archive could not be written. The pass stopped.
pub const EXIT_SHIP_PERSIST: u8 = 21;

/// The order feed could not be read (missing columns, bad JSON, ...).
pub const EXIT_SHIP_SOURCE: u8 = 22;

/// The pass finished but the XLSX summary or SQLite mirror could not be written.
pub const EXIT_SHIP_REPORT: u8 = 23;

// =============================================================================
// Carrier (30-39)
// =============================================================================

/// The HTTP client could not be built.
pub const EXIT_CARRIER_SETUP: u8 = 30;

/// Every carrier call in the pass failed with a transport fault and nothing
/// succeeded: endpoint down, network gone, or credentials rejected by a fault.
pub const EXIT_CARRIER_UNREACHABLE: u8 = 31;

// =============================================================================
// Export (40-49)
// =============================================================================

/// Hand-off file or export history could not be written.
pub const EXIT_EXPORT_WRITE: u8 = 40;
