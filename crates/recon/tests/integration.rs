use std::fs;
use std::path::{Path, PathBuf};

use smallarea_core::JoinKey;
use smallarea_io::csv::read_key_list;
use smallarea_recon::config::PipelineConfig;
use smallarea_recon::model::CoverageQuality;
use smallarea_recon::{check_coverage, run_ingest, IngestError, IngestOutput};
use tempfile::tempdir;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn fixture_config() -> PipelineConfig {
    let toml = fs::read_to_string(fixtures_dir().join("manchester.pipeline.toml")).unwrap();
    PipelineConfig::from_toml(&toml).unwrap()
}

fn ingest(config: &PipelineConfig) -> IngestOutput {
    run_ingest(config, &fixtures_dir()).unwrap()
}

// -------------------------------------------------------------------------
// Fixture pipeline
// -------------------------------------------------------------------------

#[test]
fn manchester_subset_assembles_and_reconciles() {
    let out = ingest(&fixture_config());

    assert_eq!(out.summary.unit_count, 3);
    assert_eq!(out.summary.source_column_count, 6);
    assert_eq!(out.summary.meta.config_name, "Manchester 1981");
    assert_eq!(out.summary.meta.subset, "key prefix 03BN");

    let sas02 = &out.summary.tables[0];
    assert_eq!(sas02.fragments, 2);
    assert_eq!(sas02.rows_before_subset, 4);
    assert_eq!(sas02.row_count, 3);
    assert_eq!(sas02.column_count, 4);
    assert_eq!(sas02.reconciliation_passed, Some(true));
    assert!(sas02.warnings.is_empty());

    let sas10 = &out.summary.tables[1];
    assert_eq!(sas10.column_count, 4);
    assert_eq!(sas10.reconciliation_passed, None);

    // Only sas02 has totals
    assert_eq!(out.summary.reconciliations.len(), 1);
    let recon = &out.summary.reconciliations[0];
    assert_eq!(recon.checks.len(), 3);
    let pop = recon.checks.iter().find(|c| c.column == "81sas020001").unwrap();
    assert_eq!(pop.observed_total, 1000.0);
    assert_eq!(pop.expected_total, 1005.0);
}

#[test]
fn summary_json_shape() {
    let out = ingest(&fixture_config());
    let json = serde_json::to_value(&out.summary).unwrap();

    assert_eq!(json["meta"]["engine_version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["tables"][0]["description"], "Demographics");
    assert_eq!(json["tables"][1]["description"], "Housing & Tenure");
    assert_eq!(json["reconciliations"][0]["table"], "sas02");
    assert_eq!(json["reconciliations"][0]["tolerance"], 0.01);
    assert_eq!(json["reconciliations"][0]["checks"][0]["passed"], true);
}

#[test]
fn units_follow_first_fragment_order() {
    let out = ingest(&fixture_config());
    let keys: Vec<&str> = out.units.keys().iter().map(|k| k.as_str()).collect();
    assert_eq!(keys, vec!["03BNFA01", "03BNFA02", "03BNFA03"]);

    // Second sas02 fragment listed keys in another order
    let col = out.units.source_column_index("81sas020010").unwrap();
    assert_eq!(out.units.source_cell(col, 0), Some("20"));
    assert_eq!(out.units.source_cell(col, 2), Some("12"));
}

#[test]
fn tight_tolerance_is_reported_not_fatal() {
    let mut config = fixture_config();
    config.tolerance.relative = 0.001;
    let out = ingest(&config);

    assert_eq!(out.summary.reconciliation_failures(), 1);
    let recon = &out.summary.reconciliations[0];
    let failures = recon.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].column, "81sas020001");
    assert_eq!(out.summary.tables[0].reconciliation_passed, Some(false));
    // Data still flows downstream
    assert_eq!(out.summary.unit_count, 3);
}

#[test]
fn no_subset_keeps_all_units() {
    let mut config = fixture_config();
    config.subset.prefixes.clear();
    config.tables[0].totals = None;
    let out = ingest(&config);
    assert_eq!(out.summary.unit_count, 4);
    // expected_rows = 3 no longer holds
    assert_eq!(out.summary.tables[0].warnings.len(), 1);
}

#[test]
fn truncated_fragment_is_fatal() {
    let mut config = fixture_config();
    config.tables[1].fragments[1] = "raw/sas10_part2_truncated.csv".into();

    match run_ingest(&config, &fixtures_dir()) {
        Err(IngestError::FragmentMismatch { table, fragment, missing, extra, .. }) => {
            assert_eq!(table, "sas10");
            assert_eq!(fragment, 2);
            assert_eq!(missing, vec![JoinKey::from("03BNFA03")]);
            assert_eq!(extra, vec![JoinKey::from("03BNFA09")]);
        }
        Err(other) => panic!("expected FragmentMismatch, got {other}"),
        Ok(_) => panic!("expected FragmentMismatch, got a table"),
    }
}

#[test]
fn missing_fragment_file_is_load_error() {
    let mut config = fixture_config();
    config.tables[0].fragments.push("raw/nope.csv".into());
    let err = run_ingest(&config, &fixtures_dir()).unwrap_err();
    assert!(matches!(err, IngestError::Load { ref table, .. } if table == "sas02"));
}

#[test]
fn unknown_totals_row_is_error() {
    let mut config = fixture_config();
    if let Some(totals) = config.tables[0].totals.as_mut() {
        totals.row = Some("03XX".into());
    }
    let err = run_ingest(&config, &fixtures_dir()).unwrap_err();
    assert!(matches!(err, IngestError::Totals { .. }));
    assert!(err.to_string().contains("no totals row '03XX'"));
}

#[test]
fn coverage_against_reference_keys() {
    let out = ingest(&fixture_config());
    let keys = read_key_list(&fixtures_dir().join("keys.txt"), Default::default()).unwrap();
    let report = check_coverage(&keys, &out.units);
    assert_eq!(report.matched_count, 3);
    assert_eq!(report.match_rate_percent, 75.0);
    assert_eq!(report.quality, CoverageQuality::Fail);
    assert_eq!(report.unmatched_sample, vec!["03BNFA04"]);
}

// -------------------------------------------------------------------------
// On-disk pipelines
// -------------------------------------------------------------------------

fn write(dir: &Path, name: &str, content: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

#[test]
fn leading_zero_keys_align_across_tables() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a1.csv", "code,x\n007,1\n7,2\n");
    write(dir.path(), "a2.csv", "code,y\n7,20\n007,10\n");
    write(dir.path(), "b.csv", "code,z\n007,100\n0007,300\n");

    let config = PipelineConfig::from_toml(
        r#"
name = "zeros"
key_column = "code"

[[table]]
name = "a"
fragments = ["a1.csv", "a2.csv"]

[[table]]
name = "b"
fragments = ["b.csv"]
"#,
    )
    .unwrap();

    let out = run_ingest(&config, dir.path()).unwrap();
    let keys: Vec<&str> = out.units.keys().iter().map(|k| k.as_str()).collect();
    assert_eq!(keys, vec!["007", "7", "0007"]);

    let y = out.units.source_column_index("y").unwrap();
    let z = out.units.source_column_index("z").unwrap();
    assert_eq!(out.units.source_cell(y, 0), Some("10"));
    assert_eq!(out.units.source_cell(z, 0), Some("100"));
    assert_eq!(out.units.source_cell(z, 1), None);
    assert_eq!(out.summary.tables[0].units_absent, 1);
    assert_eq!(out.summary.tables[1].units_absent, 1);
}

#[test]
fn trim_normalization_matches_padded_keys() {
    let dir = tempdir().unwrap();
    write(dir.path(), "p1.csv", "zoneid,x\n03bn01 ,1\n");
    write(dir.path(), "p2.csv", "zoneid,y\n 03BN01,2\n");

    let config = PipelineConfig::from_toml(
        r#"
name = "padded"
key_column = "zoneid"
key_normalization = "trim_upper"

[subset]
prefixes = ["03BN"]

[[table]]
name = "t"
fragments = ["p1.csv", "p2.csv"]
"#,
    )
    .unwrap();

    let out = run_ingest(&config, dir.path()).unwrap();
    assert_eq!(out.summary.unit_count, 1);
    assert_eq!(out.units.keys()[0].as_str(), "03BN01");
}

#[test]
fn lowercase_subset_prefix_matches_uppercased_keys() {
    let dir = tempdir().unwrap();
    write(dir.path(), "p1.csv", "zoneid,x\n03bn0001,1\n03bm0001,2\n");

    let config = PipelineConfig::from_toml(
        r#"
name = "lower"
key_column = "zoneid"
key_normalization = "trim_upper"

[subset]
prefixes = ["03bn"]

[[table]]
name = "t"
fragments = ["p1.csv"]
"#,
    )
    .unwrap();

    let out = run_ingest(&config, dir.path()).unwrap();
    assert_eq!(out.summary.unit_count, 1);
    assert_eq!(out.units.keys()[0].as_str(), "03BN0001");
    assert_eq!(out.summary.meta.subset, "key prefix 03BN");
}

#[test]
fn empty_key_cell_fails_the_load() {
    let dir = tempdir().unwrap();
    write(dir.path(), "p1.csv", "zoneid,x\nU1,1\n,2\n");

    let config = PipelineConfig::from_toml(
        r#"
name = "blank"
key_column = "zoneid"

[[table]]
name = "t"
fragments = ["p1.csv"]
"#,
    )
    .unwrap();

    let err = run_ingest(&config, dir.path()).unwrap_err();
    assert!(matches!(err, IngestError::Load { .. }), "{err}");
    assert!(err.to_string().contains("line 3: empty 'zoneid' value"), "{err}");
}

#[test]
fn column_collision_between_tables_is_fatal() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.csv", "zoneid,pop\nU1,1\n");
    write(dir.path(), "b.csv", "zoneid,pop\nU1,1\n");

    let config = PipelineConfig::from_toml(
        r#"
name = "collide"
key_column = "zoneid"

[[table]]
name = "a"
fragments = ["a.csv"]

[[table]]
name = "b"
fragments = ["b.csv"]
"#,
    )
    .unwrap();

    let err = run_ingest(&config, dir.path()).unwrap_err();
    assert_eq!(err.to_string(), "table 'b': column 'pop' is supplied more than once");
}
