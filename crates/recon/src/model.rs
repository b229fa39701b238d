use serde::Serialize;
use smallarea_core::{SourceTable, UnitTable};

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// All fragments of one source table merged on join key and restricted to
/// the analysis subset.
#[derive(Debug, Clone)]
pub struct AssembledTable {
    pub name: String,
    pub table: SourceTable,
    pub fragment_count: usize,
    /// Unit count before the subset filter.
    pub rows_before_subset: usize,
    /// Non-fatal findings (empty subset, shape mismatch).
    pub warnings: Vec<String>,
}

impl AssembledTable {
    pub fn row_count(&self) -> usize {
        self.table.row_count()
    }

    /// Column count including the key column.
    pub fn column_count(&self) -> usize {
        self.table.value_column_count() + 1
    }
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// Sum check of one column against its expected total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnCheck {
    pub column: String,
    pub expected_total: f64,
    pub observed_total: f64,
    pub absolute_difference: f64,
    pub relative_difference: f64,
    pub passed: bool,
}

/// Outcome of reconciling one assembled table. Never mutates the table.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub table: String,
    pub totals_source: String,
    pub tolerance: f64,
    pub checks: Vec<ColumnCheck>,
    /// Expected columns the assembled table does not have.
    pub missing_columns: Vec<String>,
    /// Non-numeric cells skipped while summing.
    pub unparsed_cells: usize,
}

impl ReconciliationReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failures(&self) -> Vec<&ColumnCheck> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    /// Human-readable lines for every failing column and every missing column.
    pub fn warnings(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .failures()
            .into_iter()
            .map(|c| {
                format!(
                    "{}: observed {} vs expected {} (diff {}, {:.2}% > {:.2}%)",
                    c.column,
                    c.observed_total,
                    c.expected_total,
                    c.absolute_difference,
                    c.relative_difference * 100.0,
                    self.tolerance * 100.0,
                )
            })
            .collect();
        for column in &self.missing_columns {
            lines.push(format!("{column}: expected total given but column not in table"));
        }
        if self.unparsed_cells > 0 {
            lines.push(format!("{} non-numeric cells skipped while summing", self.unparsed_cells));
        }
        lines
    }
}

// ---------------------------------------------------------------------------
// Coverage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoverageQuality {
    Pass,
    Review,
    Fail,
}

impl std::fmt::Display for CoverageQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Review => write!(f, "REVIEW"),
            Self::Fail => write!(f, "FAIL"),
        }
    }
}

/// How well a reference key list is covered by the unit table.
#[derive(Debug, Clone, Serialize)]
pub struct CoverageReport {
    pub reference_count: usize,
    pub table_count: usize,
    pub matched_count: usize,
    pub unmatched_count: usize,
    pub match_rate_percent: f64,
    pub quality: CoverageQuality,
    pub unmatched_sample: Vec<String>,
    /// Units in the table that the reference list does not mention.
    pub extra_in_table_count: usize,
}

// ---------------------------------------------------------------------------
// Ingestion output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub description: String,
    pub fragments: usize,
    pub rows_before_subset: usize,
    pub row_count: usize,
    pub column_count: usize,
    /// Units of the merged table that this source table does not cover.
    pub units_absent: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconciliation_passed: Option<bool>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
    pub subset: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub meta: IngestMeta,
    pub unit_count: usize,
    pub source_column_count: usize,
    pub tables: Vec<TableSummary>,
    pub reconciliations: Vec<ReconciliationReport>,
}

impl IngestSummary {
    pub fn reconciliation_failures(&self) -> usize {
        self.reconciliations.iter().filter(|r| !r.passed()).count()
    }
}

/// Merged unit table plus everything recorded on the way.
#[derive(Debug)]
pub struct IngestOutput {
    pub units: UnitTable,
    pub summary: IngestSummary,
}
