//! `smallarea-recon`: ingestion and validation of fragmented survey extracts.
//!
//! Fragments are assembled horizontally per source table, restricted to the
//! analysis subset, reconciled against independently computed totals and
//! merged into one wide per-unit table.

pub mod assemble;
pub mod config;
pub mod coverage;
pub mod error;
pub mod merge;
pub mod model;
pub mod pipeline;
pub mod reconcile;

pub use assemble::assemble;
pub use config::{PipelineConfig, SubsetFilter};
pub use coverage::check_coverage;
pub use error::IngestError;
pub use merge::merge_tables;
pub use model::{
    AssembledTable, ColumnCheck, CoverageQuality, CoverageReport, IngestOutput, IngestSummary,
    ReconciliationReport,
};
pub use pipeline::run_ingest;
pub use reconcile::{reconcile, ExpectedTotals};
