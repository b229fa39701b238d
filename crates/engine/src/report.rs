//! Read-only summary of a finished computation.

use std::collections::BTreeMap;

use serde::Serialize;
use smallarea_core::UnitTable;

use crate::compute::{ComputationOutcome, Status};
use crate::spec::{IndicatorKind, SpecSet};

#[derive(Debug, Clone, Serialize)]
pub struct ReportMeta {
    pub engine_version: String,
    pub run_at: String,
    pub key_column: String,
    pub unit_count: usize,
    pub indicator_count: usize,
}

/// Summary statistics over the non-null values of one indicator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub non_zero_count: usize,
}

impl ValueStats {
    pub fn from_values(values: &[Option<f64>]) -> Option<Self> {
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        if present.is_empty() {
            return None;
        }
        let sum: f64 = present.iter().sum();
        Some(Self {
            mean: sum / present.len() as f64,
            min: present.iter().copied().fold(f64::INFINITY, f64::min),
            max: present.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            sum,
            non_zero_count: present.iter().filter(|v| **v != 0.0).count(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IndicatorReport {
    pub name: String,
    pub kind: IndicatorKind,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_column: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calculation: Option<String>,
    pub status: Status,
    pub non_null_count: usize,
    /// Share of units with a value, in percent, one decimal.
    pub coverage_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ValueStats>,
    pub div_zero_count: usize,
    pub parse_failures: usize,
    pub out_of_range_count: usize,
    /// Indicators that read this one, directly or not. Listed when status is not OK.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub affected_downstream: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComputationReport {
    pub meta: ReportMeta,
    pub indicators: Vec<IndicatorReport>,
    pub status_counts: BTreeMap<Status, usize>,
}

impl ComputationReport {
    /// One line for logs: totals per status.
    pub fn summary_line(&self) -> String {
        let counts: Vec<String> = self
            .status_counts
            .iter()
            .map(|(status, count)| format!("{count} {status}"))
            .collect();
        format!(
            "{} indicators over {} units: {}",
            self.meta.indicator_count,
            self.meta.unit_count,
            counts.join(", ")
        )
    }

    /// Indicators whose status is not OK, in evaluation order.
    pub fn issues(&self) -> impl Iterator<Item = &IndicatorReport> {
        self.indicators.iter().filter(|i| i.status != Status::Ok)
    }

    pub fn indicator(&self, name: &str) -> Option<&IndicatorReport> {
        self.indicators.iter().find(|i| i.name == name)
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Build the report from the finished table. Nothing is modified.
pub fn build_report(table: &UnitTable, outcome: &ComputationOutcome, specs: &SpecSet) -> ComputationReport {
    let mut status_counts = BTreeMap::new();
    let mut indicators = Vec::with_capacity(outcome.statuses.len());

    for status in &outcome.statuses {
        *status_counts.entry(status.status).or_insert(0) += 1;

        let spec = specs.get(&status.name);
        let values = table.indicator(&status.name).map(|c| c.values.as_slice()).unwrap_or(&[]);
        let affected_downstream = if status.status == Status::Ok {
            Vec::new()
        } else {
            specs.downstream_of(&status.name)
        };

        indicators.push(IndicatorReport {
            name: status.name.clone(),
            kind: status.kind,
            description: spec.map(|s| s.description.clone()).unwrap_or_default(),
            table: spec.and_then(|s| s.table.clone()),
            source_column: spec.and_then(|s| s.source_column()).map(|c| c.to_string()),
            dependencies: spec.map(|s| s.dependencies()).unwrap_or_default(),
            calculation: spec.and_then(|s| s.calculation()).map(str::to_string),
            status: status.status,
            non_null_count: status.non_null_count,
            coverage_percent: round1(status.coverage_fraction * 100.0),
            stats: ValueStats::from_values(values),
            div_zero_count: status.div_zero_count,
            parse_failures: status.parse_failures,
            out_of_range_count: status.out_of_range_count,
            affected_downstream,
        });
    }

    ComputationReport {
        meta: ReportMeta {
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            key_column: table.key_column().to_string(),
            unit_count: outcome.unit_count,
            indicator_count: indicators.len(),
        },
        indicators,
        status_counts,
    }
}
