//! `smallarea-engine`: declarative indicator computation.
//!
//! Indicators are declared in a TOML document, validated into a [`SpecSet`]
//! and evaluated over a unit table in four fixed phases: raw, denominator,
//! rate, composite. A dependency must always come from an earlier phase.

pub mod compute;
pub mod dep_graph;
pub mod error;
pub mod formula;
pub mod report;
pub mod spec;

pub use compute::{compute, ComputationOutcome, ComputationStatus, Status};
pub use error::SpecValidationError;
pub use report::{build_report, ComputationReport};
pub use spec::{IndicatorKind, IndicatorSpec, Phase, SpecSet};
