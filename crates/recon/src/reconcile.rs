//! Sum reconciliation of assembled tables against independently computed totals.

use smallarea_core::{parse_numeric, JoinKey, Numeric, SourceTable};

use crate::model::{AssembledTable, ColumnCheck, ReconciliationReport};

/// Expected aggregate per column, in column order of the reference table.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedTotals {
    pub source: String,
    pub totals: Vec<(String, f64)>,
}

impl ExpectedTotals {
    /// Read one row of a reference table as expected totals.
    ///
    /// `row` selects the totals row by key; without it the table must hold
    /// exactly one row. Blank cells are skipped, non-numeric cells are an error.
    /// `columns` restricts the result to the named columns.
    pub fn from_table(
        table: &SourceTable,
        row: Option<&JoinKey>,
        columns: Option<&[String]>,
    ) -> Result<Self, String> {
        let idx = match row {
            Some(key) => table
                .row_of(key)
                .ok_or_else(|| format!("{}: no totals row '{key}'", table.source))?,
            None if table.row_count() == 1 => 0,
            None => {
                return Err(format!(
                    "{}: {} rows but no totals row selected",
                    table.source,
                    table.row_count()
                ))
            }
        };

        let mut totals = Vec::new();
        for (col, name) in table.columns.iter().enumerate() {
            if let Some(wanted) = columns {
                if !wanted.iter().any(|w| w == name) {
                    continue;
                }
            }
            match parse_numeric(table.cell(idx, col)) {
                Numeric::Value(v) => totals.push((name.clone(), v)),
                Numeric::Empty => {}
                Numeric::Invalid => {
                    return Err(format!(
                        "{}: total for '{name}' is not a number: '{}'",
                        table.source,
                        table.cell(idx, col)
                    ))
                }
            }
        }

        if let Some(wanted) = columns {
            for name in wanted {
                if !totals.iter().any(|(c, _)| c == name) {
                    return Err(format!("{}: no total for column '{name}'", table.source));
                }
            }
        }

        Ok(Self {
            source: table.source.clone(),
            totals,
        })
    }
}

/// |observed - expected| relative to the expected magnitude (floored at 1).
pub fn relative_difference(observed: f64, expected: f64) -> f64 {
    (observed - expected).abs() / expected.abs().max(1.0)
}

/// Sum every expected column over the assembled rows and compare within `tolerance`.
pub fn reconcile(
    table: &AssembledTable,
    expected: &ExpectedTotals,
    tolerance: f64,
) -> ReconciliationReport {
    let mut checks = Vec::new();
    let mut missing_columns = Vec::new();
    let mut unparsed_cells = 0;

    for (column, expected_total) in &expected.totals {
        let Some(col) = table.table.column_index(column) else {
            missing_columns.push(column.clone());
            continue;
        };

        let mut observed_total = 0.0;
        for cell in table.table.column_cells(col) {
            match parse_numeric(cell) {
                Numeric::Value(v) => observed_total += v,
                Numeric::Empty => {}
                Numeric::Invalid => unparsed_cells += 1,
            }
        }

        let relative = relative_difference(observed_total, *expected_total);
        checks.push(ColumnCheck {
            column: column.clone(),
            expected_total: *expected_total,
            observed_total,
            absolute_difference: (observed_total - expected_total).abs(),
            relative_difference: relative,
            passed: relative <= tolerance,
        });
    }

    let report = ReconciliationReport {
        table: table.name.clone(),
        totals_source: expected.source.clone(),
        tolerance,
        checks,
        missing_columns,
        unparsed_cells,
    };

    if report.passed() && report.missing_columns.is_empty() {
        log::info!(
            "{}: {} column totals within {:.2}%",
            report.table,
            report.checks.len(),
            tolerance * 100.0
        );
    } else {
        for line in report.warnings() {
            log::warn!("{}: reconciliation: {line}", report.table);
        }
    }

    report
}
