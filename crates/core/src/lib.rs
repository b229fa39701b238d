//! `smallarea-core`: shared data model for the ingestion pipeline and the
//! indicator engine.
//!
//! Join keys are opaque strings. Value cells stay as literal text until a
//! consumer parses them with [`value::parse_numeric`].

pub mod key;
pub mod table;
pub mod value;

pub use key::{JoinKey, KeyNormalization};
pub use table::{IndicatorColumn, SourceTable, UnitTable};
pub use value::{parse_numeric, Numeric};
