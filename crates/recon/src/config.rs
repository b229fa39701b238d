use std::collections::HashSet;

use serde::Deserialize;
use smallarea_core::{JoinKey, KeyNormalization};

use crate::error::IngestError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Pipeline document: which fragments make up which source table, how units
/// are selected, and how strictly totals are reconciled.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub key_column: String,
    #[serde(default)]
    pub key_normalization: KeyNormalization,
    #[serde(default)]
    pub subset: SubsetConfig,
    #[serde(default)]
    pub tolerance: ToleranceConfig,
    #[serde(rename = "table")]
    pub tables: Vec<TableConfig>,
    #[serde(default)]
    pub indicators: Option<IndicatorsConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

// ---------------------------------------------------------------------------
// Source tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct TableConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Fragment paths, relative to the pipeline document.
    pub fragments: Vec<String>,
    /// Expected unit count after the subset filter.
    #[serde(default)]
    pub expected_rows: Option<usize>,
    /// Expected column count, key column included.
    #[serde(default)]
    pub expected_columns: Option<usize>,
    #[serde(default)]
    pub totals: Option<TotalsConfig>,
}

/// Independently computed aggregate for a source table.
#[derive(Debug, Clone, Deserialize)]
pub struct TotalsConfig {
    pub file: String,
    /// Key of the totals row; required when the file holds more than one row.
    #[serde(default)]
    pub row: Option<String>,
    /// Key column of the totals file; defaults to the pipeline key column.
    #[serde(default)]
    pub key_column: Option<String>,
    /// Restrict the check to these columns.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Subset
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubsetConfig {
    #[serde(default)]
    pub prefixes: Vec<String>,
}

impl SubsetConfig {
    /// Prefixes go through the same normalization as the keys they match.
    pub fn filter(&self, normalization: KeyNormalization) -> SubsetFilter {
        if self.prefixes.is_empty() {
            SubsetFilter::All
        } else {
            SubsetFilter::KeyPrefix(
                self.prefixes
                    .iter()
                    .map(|p| JoinKey::new(p, normalization).as_str().to_string())
                    .collect(),
            )
        }
    }
}

/// Predicate over the join key selecting the analysis subset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubsetFilter {
    All,
    /// Keep units whose key starts with any of the prefixes.
    KeyPrefix(Vec<String>),
}

impl SubsetFilter {
    pub fn accepts(&self, key: &JoinKey) -> bool {
        match self {
            Self::All => true,
            Self::KeyPrefix(prefixes) => prefixes.iter().any(|p| key.starts_with(p)),
        }
    }
}

impl std::fmt::Display for SubsetFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all units"),
            Self::KeyPrefix(prefixes) => write!(f, "key prefix {}", prefixes.join("|")),
        }
    }
}

// ---------------------------------------------------------------------------
// Tolerance, indicators, output
// ---------------------------------------------------------------------------

pub const DEFAULT_RELATIVE_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Deserialize)]
pub struct ToleranceConfig {
    #[serde(default = "default_relative")]
    pub relative: f64,
}

fn default_relative() -> f64 {
    DEFAULT_RELATIVE_TOLERANCE
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            relative: DEFAULT_RELATIVE_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndicatorsConfig {
    pub file: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    /// Indicator table (CSV).
    #[serde(default)]
    pub table: Option<String>,
    /// Computation status report (JSON).
    #[serde(default)]
    pub report: Option<String>,
    /// Merged source columns per unit (CSV).
    #[serde(default)]
    pub units: Option<String>,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl PipelineConfig {
    pub fn from_toml(input: &str) -> Result<Self, IngestError> {
        let config: PipelineConfig =
            toml::from_str(input).map_err(|e| IngestError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.key_column.trim().is_empty() {
            return Err(IngestError::ConfigValidation("key_column must not be empty".into()));
        }

        if self.tables.is_empty() {
            return Err(IngestError::ConfigValidation(
                "at least one [[table]] is required".into(),
            ));
        }

        let mut seen = HashSet::new();
        for table in &self.tables {
            if !seen.insert(table.name.as_str()) {
                return Err(IngestError::ConfigValidation(format!(
                    "duplicate table name '{}'",
                    table.name
                )));
            }
            if table.fragments.is_empty() {
                return Err(IngestError::ConfigValidation(format!(
                    "table '{}' lists no fragments",
                    table.name
                )));
            }
        }

        let tol = self.tolerance.relative;
        if !tol.is_finite() || tol < 0.0 {
            return Err(IngestError::ConfigValidation(format!(
                "tolerance.relative must be a finite number >= 0, got {tol}"
            )));
        }

        if self.subset.prefixes.iter().any(|p| p.is_empty()) {
            return Err(IngestError::ConfigValidation(
                "subset.prefixes must not contain an empty prefix".into(),
            ));
        }

        Ok(())
    }
}
