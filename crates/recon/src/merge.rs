use smallarea_core::UnitTable;

use crate::error::IngestError;
use crate::model::AssembledTable;

/// Outer-join assembled tables on key into one wide unit table.
///
/// Units are ordered by first appearance. A unit absent from a table keeps
/// null cells for that table's columns. A value column supplied by two
/// tables is a `ColumnCollision`.
pub fn merge_tables(key_column: &str, tables: &[AssembledTable]) -> Result<UnitTable, IngestError> {
    let mut units = UnitTable::new(key_column);

    for assembled in tables {
        let source = &assembled.table;
        let mut cols = Vec::with_capacity(source.columns.len());
        for column in &source.columns {
            let idx = units
                .add_source_column(column)
                .map_err(|column| IngestError::ColumnCollision {
                    table: assembled.name.clone(),
                    column,
                })?;
            cols.push(idx);
        }

        for (row, key) in source.keys.iter().enumerate() {
            let unit = units.ensure_unit(key);
            for (j, &col) in cols.iter().enumerate() {
                units.set_source_cell(col, unit, source.cell(row, j).to_string());
            }
        }
    }

    log::info!(
        "merged {} tables -> {} units x {} source columns",
        tables.len(),
        units.unit_count(),
        units.source_columns().len()
    );

    Ok(units)
}

/// Units of `units` that `table` has no row for.
pub fn units_absent_from(units: &UnitTable, table: &AssembledTable) -> usize {
    units
        .keys()
        .iter()
        .filter(|k| table.table.row_of(k).is_none())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::assemble;
    use crate::config::SubsetFilter;
    use smallarea_core::{JoinKey, SourceTable};

    fn table(name: &str, column: &str, rows: &[(&str, &str)]) -> AssembledTable {
        let mut t = SourceTable::new(name, "zoneid", vec![column.to_string()]);
        for (k, v) in rows {
            t.push_row(JoinKey::from(*k), vec![v.to_string()]);
        }
        assemble(name, vec![t], &SubsetFilter::All).unwrap()
    }

    #[test]
    fn outer_union_with_nulls() {
        let a = table("sas02", "pop", &[("U1", "10"), ("U2", "20")]);
        let b = table("sas10", "hh", &[("U2", "5"), ("U3", "7")]);

        let units = merge_tables("zoneid", &[a.clone(), b.clone()]).unwrap();
        assert_eq!(units.unit_count(), 3);
        assert_eq!(units.keys()[2].as_str(), "U3");

        let pop = units.source_column_index("pop").unwrap();
        let hh = units.source_column_index("hh").unwrap();
        assert_eq!(units.source_cell(pop, 0), Some("10"));
        assert_eq!(units.source_cell(hh, 0), None);
        assert_eq!(units.source_cell(pop, 2), None);
        assert_eq!(units.source_cell(hh, 2), Some("7"));

        assert_eq!(units_absent_from(&units, &a), 1);
        assert_eq!(units_absent_from(&units, &b), 1);
    }

    #[test]
    fn collision_across_tables_is_fatal() {
        let a = table("sas02", "pop", &[("U1", "10")]);
        let b = table("sas10", "pop", &[("U1", "11")]);
        let err = merge_tables("zoneid", &[a, b]).unwrap_err();
        assert!(matches!(err, IngestError::ColumnCollision { ref table, .. } if table == "sas10"));
    }
}
