use std::fmt;

use smallarea_core::JoinKey;

/// Keys printed per side in a fragment mismatch message.
const MAX_KEYS_SHOWN: usize = 20;

#[derive(Debug)]
pub enum IngestError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (no tables, duplicate table name, bad tolerance, etc.).
    ConfigValidation(String),
    /// A fragment could not be read or has no key column.
    Load { table: String, message: String },
    /// The same join key occurs twice inside one fragment.
    DuplicateKey { table: String, source: String, key: JoinKey },
    /// Fragments of one source table disagree on their join-key set.
    FragmentMismatch {
        table: String,
        /// 1-based index of the offending fragment.
        fragment: usize,
        source: String,
        /// Keys of the first fragment absent from this one.
        missing: Vec<JoinKey>,
        /// Keys of this fragment absent from the first one.
        extra: Vec<JoinKey>,
    },
    /// The same value column is supplied twice (across fragments or tables).
    ColumnCollision { table: String, column: String },
    /// The expected-totals reference table is unusable.
    Totals { table: String, message: String },
}

fn key_list(keys: &[JoinKey]) -> String {
    let mut shown: Vec<&str> = keys.iter().take(MAX_KEYS_SHOWN).map(|k| k.as_str()).collect();
    if keys.len() > MAX_KEYS_SHOWN {
        shown.push("...");
    }
    shown.join(", ")
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::Load { table, message } => write!(f, "table '{table}': {message}"),
            Self::DuplicateKey { table, source, key } => {
                write!(f, "table '{table}': duplicate key '{key}' in {source}")
            }
            Self::FragmentMismatch { table, fragment, source, missing, extra } => {
                write!(
                    f,
                    "table '{table}': fragment {fragment} ({source}) key set differs from fragment 1: \
                     {} missing [{}], {} extra [{}]",
                    missing.len(),
                    key_list(missing),
                    extra.len(),
                    key_list(extra),
                )
            }
            Self::ColumnCollision { table, column } => {
                write!(f, "table '{table}': column '{column}' is supplied more than once")
            }
            Self::Totals { table, message } => write!(f, "table '{table}': expected totals: {message}"),
        }
    }
}

impl std::error::Error for IngestError {}
