use std::path::Path;

use smallarea_core::{JoinKey, SourceTable};
use smallarea_io::csv::load_fragment;

use crate::assemble::{assemble, check_shape};
use crate::config::{PipelineConfig, TableConfig};
use crate::error::IngestError;
use crate::merge::{merge_tables, units_absent_from};
use crate::model::{AssembledTable, IngestMeta, IngestOutput, IngestSummary, TableSummary};
use crate::reconcile::{reconcile, ExpectedTotals};

/// Load, assemble, reconcile and merge every configured table.
///
/// Paths in the config are resolved against `base_dir`. Structural problems
/// abort with an error; reconciliation and shape findings are recorded in the
/// summary and logged.
pub fn run_ingest(config: &PipelineConfig, base_dir: &Path) -> Result<IngestOutput, IngestError> {
    let subset = config.subset.filter(config.key_normalization);
    let mut assembled_tables = Vec::with_capacity(config.tables.len());
    let mut reconciliations = Vec::new();
    let mut recon_passed = Vec::with_capacity(config.tables.len());

    for table_config in &config.tables {
        let fragments = load_fragments(config, table_config, base_dir)?;
        let mut assembled = assemble(&table_config.name, fragments, &subset)?;
        check_shape(
            &mut assembled,
            table_config.expected_rows,
            table_config.expected_columns,
        );

        let passed = match load_totals(config, table_config, base_dir)? {
            Some(expected) => {
                let report = reconcile(&assembled, &expected, config.tolerance.relative);
                let passed = report.passed();
                reconciliations.push(report);
                Some(passed)
            }
            None => None,
        };
        recon_passed.push(passed);
        assembled_tables.push(assembled);
    }

    let units = merge_tables(&config.key_column, &assembled_tables)?;

    let tables = config
        .tables
        .iter()
        .zip(&assembled_tables)
        .zip(recon_passed)
        .map(|((table_config, assembled), passed)| {
            table_summary(table_config, assembled, units_absent_from(&units, assembled), passed)
        })
        .collect();

    let summary = IngestSummary {
        meta: IngestMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            subset: subset.to_string(),
        },
        unit_count: units.unit_count(),
        source_column_count: units.source_columns().len(),
        tables,
        reconciliations,
    };

    let failures = summary.reconciliation_failures();
    if failures > 0 {
        log::warn!("{failures} table(s) failed sum reconciliation; review before relying on indicators");
    }

    Ok(IngestOutput { units, summary })
}

fn load_fragments(
    config: &PipelineConfig,
    table: &TableConfig,
    base_dir: &Path,
) -> Result<Vec<SourceTable>, IngestError> {
    table
        .fragments
        .iter()
        .map(|fragment| {
            let path = base_dir.join(fragment);
            let loaded = load_fragment(&path, &config.key_column, config.key_normalization)
                .map_err(|message| IngestError::Load {
                    table: table.name.clone(),
                    message,
                })?;
            log::debug!(
                "{}: {} rows x {} value cols from {}",
                table.name,
                loaded.row_count(),
                loaded.value_column_count(),
                path.display()
            );
            Ok(loaded)
        })
        .collect()
}

fn load_totals(
    config: &PipelineConfig,
    table: &TableConfig,
    base_dir: &Path,
) -> Result<Option<ExpectedTotals>, IngestError> {
    let Some(totals) = &table.totals else {
        return Ok(None);
    };
    let totals_error = |message: String| IngestError::Totals {
        table: table.name.clone(),
        message,
    };

    let key_column = totals.key_column.as_deref().unwrap_or(&config.key_column);
    let reference = load_fragment(&base_dir.join(&totals.file), key_column, config.key_normalization)
        .map_err(totals_error)?;
    let row = totals
        .row
        .as_deref()
        .map(|r| JoinKey::new(r, config.key_normalization));

    ExpectedTotals::from_table(&reference, row.as_ref(), totals.columns.as_deref())
        .map(Some)
        .map_err(totals_error)
}

fn table_summary(
    config: &TableConfig,
    assembled: &AssembledTable,
    units_absent: usize,
    reconciliation_passed: Option<bool>,
) -> TableSummary {
    TableSummary {
        name: assembled.name.clone(),
        description: config.description.clone(),
        fragments: assembled.fragment_count,
        rows_before_subset: assembled.rows_before_subset,
        row_count: assembled.row_count(),
        column_count: assembled.column_count(),
        units_absent,
        reconciliation_passed,
        warnings: assembled.warnings.clone(),
    }
}
