//! `smallarea ingest | validate | run | coverage`

use std::path::{Path, PathBuf};

use serde::Serialize;
use smallarea_engine::{build_report, compute, IndicatorKind, Phase, SpecSet};
use smallarea_io::csv::{export_indicators, export_units, read_key_list};
use smallarea_io::json::{to_pretty_string, write_pretty};
use smallarea_recon::{
    check_coverage, run_ingest, CoverageQuality, IngestOutput, IngestSummary, PipelineConfig,
};

use crate::exit_codes::{EXIT_COVERAGE_FAIL, EXIT_RECON_MISMATCH};
use crate::CliError;

// ============================================================================
// Shared loading
// ============================================================================

/// Read and validate a pipeline document. Returns it with the directory its
/// relative paths are resolved against.
fn load_pipeline(path: &Path) -> Result<(PipelineConfig, PathBuf), CliError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::io(format!("cannot read {}: {e}", path.display())))?;
    let config = PipelineConfig::from_toml(&text)
        .map_err(|e| CliError::config(format!("{}: {e}", path.display())))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
    log::debug!(
        "pipeline '{}': {} table(s), paths relative to {}",
        config.name,
        config.tables.len(),
        base_dir.display()
    );
    Ok((config, base_dir))
}

fn load_specs(path: &Path) -> Result<SpecSet, CliError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::io(format!("cannot read {}: {e}", path.display())))?;
    let specs = SpecSet::from_toml(&text).map_err(|e| CliError::spec(path, e))?;
    log::debug!("{}: {} indicator(s) validated", path.display(), specs.len());
    Ok(specs)
}

fn ingest(config: &PipelineConfig, base_dir: &Path) -> Result<IngestOutput, CliError> {
    run_ingest(config, base_dir).map_err(CliError::ingest)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let text = to_pretty_string(value).map_err(CliError::io)?;
    println!("{text}");
    Ok(())
}

fn print_ingest_summary(summary: &IngestSummary) {
    for table in &summary.tables {
        let recon = match table.reconciliation_passed {
            Some(true) => "totals PASS",
            Some(false) => "totals FAIL",
            None => "no totals",
        };
        eprintln!(
            "  {}: {} units x {} columns from {} fragment(s), {}",
            table.name, table.row_count, table.column_count, table.fragments, recon
        );
        for warning in &table.warnings {
            eprintln!("    warning: {warning}");
        }
    }
    for report in summary.reconciliations.iter().filter(|r| !r.passed()) {
        for line in report.warnings() {
            eprintln!("    {}: {line}", report.table);
        }
    }
    eprintln!(
        "{} units, {} source columns",
        summary.unit_count, summary.source_column_count
    );
}

fn check_strict(summary: &IngestSummary, strict: bool) -> Result<(), CliError> {
    let failures = summary.reconciliation_failures();
    if strict && failures > 0 {
        return Err(CliError::new(
            EXIT_RECON_MISMATCH,
            format!("{failures} table(s) failed sum reconciliation"),
        )
        .with_hint("review the fragments, or raise [tolerance] relative if the difference is expected"));
    }
    Ok(())
}

// ============================================================================
// ingest
// ============================================================================

pub fn cmd_ingest(
    pipeline: PathBuf,
    output: Option<PathBuf>,
    json: bool,
    strict: bool,
) -> Result<(), CliError> {
    let (config, base_dir) = load_pipeline(&pipeline)?;
    let out = ingest(&config, &base_dir)?;

    let units_path = output.or_else(|| config.output.units.as_ref().map(|p| base_dir.join(p)));
    if let Some(path) = &units_path {
        export_units(&out.units, path).map_err(CliError::io)?;
        eprintln!("wrote {}", path.display());
    }

    if json {
        print_json(&out.summary)?;
    }
    print_ingest_summary(&out.summary);
    check_strict(&out.summary, strict)
}

// ============================================================================
// validate
// ============================================================================

#[derive(Serialize)]
struct SpecListing<'a> {
    name: &'a str,
    kind: IndicatorKind,
    phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_column: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    calculation: Option<&'a str>,
}

pub fn cmd_validate(spec: PathBuf, json: bool) -> Result<(), CliError> {
    let specs = load_specs(&spec)?;

    let listing: Vec<SpecListing> = specs
        .evaluation_order()
        .iter()
        .map(|&id| {
            let s = specs.spec(id);
            SpecListing {
                name: &s.name,
                kind: s.kind(),
                phase: s.phase(),
                source_column: s.source_column().map(|c| c.as_str()),
                dependencies: s.dependencies(),
                calculation: s.calculation(),
            }
        })
        .collect();

    if json {
        return print_json(&listing);
    }

    for entry in &listing {
        let reads = match (entry.source_column, entry.dependencies.is_empty()) {
            (Some(column), true) => format!("column {column}"),
            (Some(column), false) => format!("column {column}, {}", entry.dependencies.join(", ")),
            (None, _) => entry.dependencies.join(", "),
        };
        match entry.calculation {
            Some(calculation) => {
                println!("{:<12} {:<24} {reads} = {calculation}", entry.kind.to_string(), entry.name)
            }
            None => println!("{:<12} {:<24} {reads}", entry.kind.to_string(), entry.name),
        }
    }
    let per_phase: Vec<String> = Phase::ALL
        .iter()
        .map(|&phase| format!("{} {phase}", specs.in_phase(phase).count()))
        .collect();
    println!("ok: {} indicators ({})", specs.len(), per_phase.join(", "));
    Ok(())
}

// ============================================================================
// run
// ============================================================================

pub fn cmd_run(pipeline: PathBuf, json: bool, strict: bool) -> Result<(), CliError> {
    let (config, base_dir) = load_pipeline(&pipeline)?;
    let indicators = config.indicators.as_ref().ok_or_else(|| {
        CliError::config(format!("{}: no [indicators] file configured", pipeline.display()))
            .with_hint("add [indicators] with file = \"indicators.toml\"")
    })?;
    let specs = load_specs(&base_dir.join(&indicators.file))?;

    let mut out = ingest(&config, &base_dir)?;
    let outcome = compute(&mut out.units, &specs);
    let report = build_report(&out.units, &outcome, &specs);

    if let Some(table) = &config.output.table {
        let path = base_dir.join(table);
        export_indicators(&out.units, &path).map_err(CliError::io)?;
        eprintln!("wrote {}", path.display());
    }
    if let Some(report_file) = &config.output.report {
        let path = base_dir.join(report_file);
        write_pretty(&report, &path).map_err(CliError::io)?;
        eprintln!("wrote {}", path.display());
    }

    if json {
        print_json(&report)?;
    }

    print_ingest_summary(&out.summary);
    for issue in report.issues() {
        if issue.affected_downstream.is_empty() {
            eprintln!("  {}: {}", issue.name, issue.status);
        } else {
            eprintln!(
                "  {}: {} (affects {})",
                issue.name,
                issue.status,
                issue.affected_downstream.join(", ")
            );
        }
    }
    eprintln!("{}", report.summary_line());

    check_strict(&out.summary, strict)
}

// ============================================================================
// coverage
// ============================================================================

pub fn cmd_coverage(pipeline: PathBuf, keys: PathBuf, json: bool) -> Result<(), CliError> {
    let (config, base_dir) = load_pipeline(&pipeline)?;
    let reference = read_key_list(&keys, config.key_normalization).map_err(CliError::io)?;
    let out = ingest(&config, &base_dir)?;
    let report = check_coverage(&reference, &out.units);

    if json {
        print_json(&report)?;
    }
    eprintln!(
        "coverage: {:.1}% ({}/{} reference keys) {}, {} unit(s) not in the reference list",
        report.match_rate_percent,
        report.matched_count,
        report.reference_count,
        report.quality,
        report.extra_in_table_count
    );

    if report.quality == CoverageQuality::Fail {
        let mut err = CliError::new(
            EXIT_COVERAGE_FAIL,
            format!("join coverage {:.1}% is below the review threshold", report.match_rate_percent),
        );
        if !report.unmatched_sample.is_empty() {
            err = err.with_hint(format!("unmatched keys: {}", report.unmatched_sample.join(", ")));
        }
        return Err(err);
    }
    Ok(())
}
