//! CLI Exit Code Registry
//!
//! Single source of truth for `smallarea` exit codes. Scripts rely on them.
//!
//! | Code | Meaning                                             |
//! |------|-----------------------------------------------------|
//! | 0    | Success                                             |
//! | 2    | Usage error (bad arguments, reported by clap)       |
//! | 3    | Invalid pipeline config or indicator specification  |
//! | 4    | Structural ingestion error (key sets, collisions)   |
//! | 5    | Reconciliation mismatch (only with `--strict`)      |
//! | 6    | Join coverage FAIL                                  |
//! | 7    | I/O error (unreadable input, unwritable output)     |

use smallarea_recon::IngestError;

/// Success - command completed.
pub const EXIT_SUCCESS: u8 = 0;

/// Pipeline document or indicator specification failed to parse or validate.
pub const EXIT_INVALID_CONFIG: u8 = 3;

/// Fragments disagree on keys, duplicate keys, column collisions, unusable totals.
pub const EXIT_INGEST: u8 = 4;

/// At least one table failed sum reconciliation and `--strict` was given.
pub const EXIT_RECON_MISMATCH: u8 = 5;

/// Reference key list matched below the REVIEW threshold.
pub const EXIT_COVERAGE_FAIL: u8 = 6;

/// Input could not be read or output could not be written.
pub const EXIT_IO: u8 = 7;

/// Map an ingestion error to its exit code.
pub fn ingest_exit_code(err: &IngestError) -> u8 {
    match err {
        IngestError::ConfigParse(_) | IngestError::ConfigValidation(_) => EXIT_INVALID_CONFIG,
        IngestError::Load { .. } => EXIT_IO,
        IngestError::DuplicateKey { .. }
        | IngestError::FragmentMismatch { .. }
        | IngestError::ColumnCollision { .. }
        | IngestError::Totals { .. } => EXIT_INGEST,
    }
}
