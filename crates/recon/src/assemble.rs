//! Horizontal assembly of fragments into one table per source.

use std::collections::{HashMap, HashSet};

use smallarea_core::{JoinKey, SourceTable};

use crate::config::SubsetFilter;
use crate::error::IngestError;
use crate::model::AssembledTable;

/// Merge the fragments of one source table on join key, then apply the subset filter.
///
/// Every fragment must carry the same key set (order does not matter) and no
/// value column may appear in two fragments. Rows keep the order of the first
/// fragment.
pub fn assemble(
    name: &str,
    fragments: Vec<SourceTable>,
    subset: &SubsetFilter,
) -> Result<AssembledTable, IngestError> {
    let Some(first) = fragments.first() else {
        return Err(IngestError::ConfigValidation(format!(
            "table '{name}' has no fragments"
        )));
    };

    for fragment in &fragments {
        check_unique_keys(name, fragment)?;
    }

    let base: HashSet<&JoinKey> = first.keys.iter().collect();
    for (i, fragment) in fragments.iter().enumerate().skip(1) {
        let keys: HashSet<&JoinKey> = fragment.keys.iter().collect();
        if keys != base {
            let mut missing: Vec<JoinKey> = base.difference(&keys).map(|k| (*k).clone()).collect();
            let mut extra: Vec<JoinKey> = keys.difference(&base).map(|k| (*k).clone()).collect();
            missing.sort();
            extra.sort();
            return Err(IngestError::FragmentMismatch {
                table: name.to_string(),
                fragment: i + 1,
                source: fragment.source.clone(),
                missing,
                extra,
            });
        }
    }

    let mut columns: Vec<String> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for fragment in &fragments {
        for column in &fragment.columns {
            if !seen.insert(column.as_str()) {
                return Err(IngestError::ColumnCollision {
                    table: name.to_string(),
                    column: column.clone(),
                });
            }
            columns.push(column.clone());
        }
    }

    // Row lookup for every fragment after the first
    let lookups: Vec<HashMap<&JoinKey, usize>> = fragments
        .iter()
        .skip(1)
        .map(|f| f.keys.iter().enumerate().map(|(i, k)| (k, i)).collect())
        .collect();

    let mut merged = SourceTable::new(name, first.key_column.clone(), columns);
    let mut rows_before_subset = 0;

    for (row, key) in first.keys.iter().enumerate() {
        rows_before_subset += 1;
        if !subset.accepts(key) {
            continue;
        }
        let mut values = first.rows[row].clone();
        for (fragment, lookup) in fragments.iter().skip(1).zip(&lookups) {
            // Key sets are identical, so every lookup hits
            if let Some(&r) = lookup.get(key) {
                values.extend(fragment.rows[r].iter().cloned());
            }
        }
        merged.push_row(key.clone(), values);
    }

    let mut assembled = AssembledTable {
        name: name.to_string(),
        table: merged,
        fragment_count: fragments.len(),
        rows_before_subset,
        warnings: Vec::new(),
    };

    log::info!(
        "{name}: {} fragments -> {} rows x {} cols ({} rows before subset: {subset})",
        assembled.fragment_count,
        assembled.row_count(),
        assembled.column_count(),
        rows_before_subset,
    );

    if assembled.row_count() == 0 {
        let msg = format!("no units matched the subset ({subset})");
        log::warn!("{name}: {msg}");
        assembled.warnings.push(msg);
    }

    Ok(assembled)
}

/// Compare the assembled shape with configured expectations. Mismatches are warnings.
pub fn check_shape(
    table: &mut AssembledTable,
    expected_rows: Option<usize>,
    expected_columns: Option<usize>,
) {
    if let Some(rows) = expected_rows {
        if table.row_count() != rows {
            let msg = format!("expected {rows} rows, assembled {}", table.row_count());
            log::warn!("{}: {msg}", table.name);
            table.warnings.push(msg);
        }
    }
    if let Some(cols) = expected_columns {
        if table.column_count() != cols {
            let msg = format!("expected {cols} columns, assembled {}", table.column_count());
            log::warn!("{}: {msg}", table.name);
            table.warnings.push(msg);
        }
    }
}

fn check_unique_keys(name: &str, fragment: &SourceTable) -> Result<(), IngestError> {
    let mut seen = HashSet::with_capacity(fragment.keys.len());
    for key in &fragment.keys {
        if !seen.insert(key) {
            return Err(IngestError::DuplicateKey {
                table: name.to_string(),
                source: fragment.source.clone(),
                key: key.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(source: &str, columns: &[&str], rows: &[(&str, &[&str])]) -> SourceTable {
        let mut t = SourceTable::new(source, "zoneid", columns.iter().map(|c| c.to_string()).collect());
        for (key, values) in rows {
            t.push_row(JoinKey::from(*key), values.iter().map(|v| v.to_string()).collect());
        }
        t
    }

    #[test]
    fn merges_columns_in_fragment_order() {
        let p1 = fragment("p1", &["a", "b"], &[("K1", &["1", "2"]), ("K2", &["3", "4"])]);
        // Second fragment lists keys in a different order
        let p2 = fragment("p2", &["c"], &[("K2", &["30"]), ("K1", &["10"])]);

        let t = assemble("sas02", vec![p1, p2], &SubsetFilter::All).unwrap();
        assert_eq!(t.row_count(), 2);
        assert_eq!(t.column_count(), 4);
        assert_eq!(t.table.columns, vec!["a", "b", "c"]);
        assert_eq!(t.table.keys[0].as_str(), "K1");
        assert_eq!(t.table.rows[0], vec!["1", "2", "10"]);
        assert_eq!(t.table.rows[1], vec!["3", "4", "30"]);
    }

    #[test]
    fn mismatch_names_missing_and_extra() {
        let p1 = fragment("p1", &["a"], &[("K1", &["1"]), ("K2", &["2"])]);
        let p2 = fragment("p2", &["b"], &[("K1", &["1"]), ("K3", &["3"])]);

        match assemble("sas04", vec![p1, p2], &SubsetFilter::All) {
            Err(IngestError::FragmentMismatch { table, fragment, missing, extra, .. }) => {
                assert_eq!(table, "sas04");
                assert_eq!(fragment, 2);
                assert_eq!(missing, vec![JoinKey::from("K2")]);
                assert_eq!(extra, vec![JoinKey::from("K3")]);
            }
            other => panic!("expected FragmentMismatch, got {other:?}"),
        }
    }

    #[test]
    fn subset_filter_applies_after_merge() {
        let p1 = fragment("p1", &["a"], &[("03BN01", &["1"]), ("03BM01", &["2"]), ("03BN02", &["3"])]);
        let p2 = fragment("p2", &["b"], &[("03BN01", &["4"]), ("03BM01", &["5"]), ("03BN02", &["6"])]);

        let filter = SubsetFilter::KeyPrefix(vec!["03BN".into()]);
        let t = assemble("sas07", vec![p1, p2], &filter).unwrap();
        assert_eq!(t.rows_before_subset, 3);
        assert_eq!(t.row_count(), 2);
        assert_eq!(t.table.rows[1], vec!["3", "6"]);
        assert!(t.warnings.is_empty());
    }

    #[test]
    fn empty_subset_is_a_warning() {
        let p1 = fragment("p1", &["a"], &[("X1", &["1"])]);
        let filter = SubsetFilter::KeyPrefix(vec!["03BN".into()]);
        let t = assemble("sas07", vec![p1], &filter).unwrap();
        assert_eq!(t.row_count(), 0);
        assert_eq!(t.warnings.len(), 1);
    }

    #[test]
    fn column_collision_is_fatal() {
        let p1 = fragment("p1", &["a"], &[("K1", &["1"])]);
        let p2 = fragment("p2", &["a"], &[("K1", &["2"])]);
        let err = assemble("sas10", vec![p1, p2], &SubsetFilter::All).unwrap_err();
        assert!(matches!(err, IngestError::ColumnCollision { ref column, .. } if column == "a"));
    }

    #[test]
    fn duplicate_key_in_fragment_is_fatal() {
        let p1 = fragment("p1", &["a"], &[("K1", &["1"]), ("K1", &["2"])]);
        let err = assemble("sas10", vec![p1], &SubsetFilter::All).unwrap_err();
        assert!(err.to_string().contains("duplicate key 'K1'"));
    }

    #[test]
    fn keys_are_not_numeric() {
        // "01" and "1" are different units
        let p1 = fragment("p1", &["a"], &[("01", &["1"])]);
        let p2 = fragment("p2", &["b"], &[("1", &["1"])]);
        assert!(assemble("t", vec![p1, p2], &SubsetFilter::All).is_err());
    }

    #[test]
    fn shape_mismatch_recorded() {
        let p1 = fragment("p1", &["a"], &[("K1", &["1"])]);
        let mut t = assemble("t", vec![p1], &SubsetFilter::All).unwrap();
        check_shape(&mut t, Some(1017), Some(2));
        assert_eq!(t.warnings.len(), 1);
        assert!(t.warnings[0].contains("expected 1017 rows"));
    }
}
