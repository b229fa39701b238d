use std::collections::HashMap;

use crate::key::JoinKey;

// ---------------------------------------------------------------------------
// Source table (fragment or assembled table)
// ---------------------------------------------------------------------------

/// A keyed table of literal text cells.
///
/// Used both for a single fragment as read from disk and for the assembled
/// table of one source. `rows[i][j]` is the cell of `columns[j]` for `keys[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTable {
    /// Where the table came from (file path or source-table name).
    pub source: String,
    pub key_column: String,
    pub columns: Vec<String>,
    pub keys: Vec<JoinKey>,
    pub rows: Vec<Vec<String>>,
}

impl SourceTable {
    pub fn new(source: impl Into<String>, key_column: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            source: source.into(),
            key_column: key_column.into(),
            columns,
            keys: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Append a row. Short rows are padded with empty cells, long rows truncated.
    pub fn push_row(&mut self, key: JoinKey, mut values: Vec<String>) {
        values.resize(self.columns.len(), String::new());
        self.keys.push(key);
        self.rows.push(values);
    }

    pub fn row_count(&self) -> usize {
        self.keys.len()
    }

    /// Number of value columns (the key column is not counted).
    pub fn value_column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(|s| s.as_str())
            .unwrap_or("")
    }

    pub fn row_of(&self, key: &JoinKey) -> Option<usize> {
        self.keys.iter().position(|k| k == key)
    }

    /// All cells of one column, in row order.
    pub fn column_cells(&self, col: usize) -> impl Iterator<Item = &str> + '_ {
        self.rows
            .iter()
            .map(move |r| r.get(col).map(|s| s.as_str()).unwrap_or(""))
    }
}

// ---------------------------------------------------------------------------
// Unit table
// ---------------------------------------------------------------------------

/// Computed values of one indicator, aligned with the unit table's keys.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorColumn {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

impl IndicatorColumn {
    pub fn non_null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }
}

/// One row per analysis unit: merged source columns plus computed indicators.
///
/// Storage is column-major. Source cells are `None` when the unit is absent
/// from the source table that owns the column.
#[derive(Debug, Clone, Default)]
pub struct UnitTable {
    key_column: String,
    keys: Vec<JoinKey>,
    key_index: HashMap<JoinKey, usize>,
    source_columns: Vec<String>,
    source_index: HashMap<String, usize>,
    source: Vec<Vec<Option<String>>>,
    indicators: Vec<IndicatorColumn>,
}

impl UnitTable {
    pub fn new(key_column: impl Into<String>) -> Self {
        Self {
            key_column: key_column.into(),
            ..Self::default()
        }
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    pub fn keys(&self) -> &[JoinKey] {
        &self.keys
    }

    pub fn unit_count(&self) -> usize {
        self.keys.len()
    }

    pub fn unit_index(&self, key: &JoinKey) -> Option<usize> {
        self.key_index.get(key).copied()
    }

    /// Add a unit if it is not present yet. Returns its row index.
    pub fn ensure_unit(&mut self, key: &JoinKey) -> usize {
        if let Some(&idx) = self.key_index.get(key) {
            return idx;
        }
        let idx = self.keys.len();
        self.keys.push(key.clone());
        self.key_index.insert(key.clone(), idx);
        for column in &mut self.source {
            column.push(None);
        }
        for column in &mut self.indicators {
            column.values.push(None);
        }
        idx
    }

    pub fn source_columns(&self) -> &[String] {
        &self.source_columns
    }

    pub fn source_column_index(&self, name: &str) -> Option<usize> {
        self.source_index.get(name).copied()
    }

    /// Register a new source column filled with nulls.
    ///
    /// Returns `Err(name)` if the column already exists.
    pub fn add_source_column(&mut self, name: &str) -> Result<usize, String> {
        if self.source_index.contains_key(name) {
            return Err(name.to_string());
        }
        let idx = self.source_columns.len();
        self.source_columns.push(name.to_string());
        self.source_index.insert(name.to_string(), idx);
        self.source.push(vec![None; self.keys.len()]);
        Ok(idx)
    }

    pub fn set_source_cell(&mut self, col: usize, row: usize, value: String) {
        if let Some(cell) = self.source.get_mut(col).and_then(|c| c.get_mut(row)) {
            *cell = Some(value);
        }
    }

    pub fn source_cell(&self, col: usize, row: usize) -> Option<&str> {
        self.source
            .get(col)
            .and_then(|c| c.get(row))
            .and_then(|v| v.as_deref())
    }

    /// Cells of a source column in unit order.
    pub fn source_column(&self, col: usize) -> &[Option<String>] {
        self.source.get(col).map(|c| c.as_slice()).unwrap_or(&[])
    }

    pub fn indicators(&self) -> &[IndicatorColumn] {
        &self.indicators
    }

    pub fn indicator(&self, name: &str) -> Option<&IndicatorColumn> {
        self.indicators.iter().find(|c| c.name == name)
    }

    /// Insert an indicator column, replacing any previous column of that name.
    pub fn set_indicator(&mut self, name: &str, mut values: Vec<Option<f64>>) {
        values.resize(self.keys.len(), None);
        if let Some(existing) = self.indicators.iter_mut().find(|c| c.name == name) {
            existing.values = values;
        } else {
            self.indicators.push(IndicatorColumn {
                name: name.to_string(),
                values,
            });
        }
    }

    pub fn clear_indicators(&mut self) {
        self.indicators.clear();
    }

    pub fn indicator_value(&self, name: &str, key: &JoinKey) -> Option<f64> {
        let row = self.unit_index(key)?;
        self.indicator(name).and_then(|c| c.values.get(row).copied().flatten())
    }
}
