//! Phase-ordered indicator evaluation over a unit table.

use serde::Serialize;
use smallarea_core::{parse_numeric, Numeric, UnitTable};

use crate::formula;
use crate::spec::{ColumnRef, IndicatorKind, IndicatorRule, IndicatorSpec, Numerator, Phase, SpecSet};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Ok,
    MissingSource,
    MissingDenominator,
    DivZeroSome,
    AllNull,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::MissingSource => write!(f, "MISSING_SOURCE"),
            Self::MissingDenominator => write!(f, "MISSING_DENOMINATOR"),
            Self::DivZeroSome => write!(f, "DIV_ZERO_SOME"),
            Self::AllNull => write!(f, "ALL_NULL"),
        }
    }
}

/// Per-indicator result of one computation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputationStatus {
    pub name: String,
    pub kind: IndicatorKind,
    pub status: Status,
    pub non_null_count: usize,
    pub coverage_fraction: f64,
    /// Units whose value is null because of a zero or null divisor.
    pub div_zero_count: usize,
    /// Non-numeric source cells read as null.
    pub parse_failures: usize,
    /// Rate values outside [0, 100]. Finite ones are kept as computed,
    /// non-finite ones are null.
    pub out_of_range_count: usize,
}

/// Statuses of every indicator, in evaluation order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputationOutcome {
    pub unit_count: usize,
    pub statuses: Vec<ComputationStatus>,
}

impl ComputationOutcome {
    pub fn status_of(&self, name: &str) -> Option<&ComputationStatus> {
        self.statuses.iter().find(|s| s.name == name)
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Counters gathered while producing one indicator column.
#[derive(Default)]
struct Tally {
    missing_source: bool,
    missing_denominator: bool,
    div_zero: usize,
    parse_failures: usize,
    out_of_range: usize,
}

/// Evaluate every indicator of `specs` into `table`, phase by phase.
///
/// Previously computed indicator columns are dropped first, so repeated runs
/// over the same input produce identical tables. Data problems never fail
/// the computation; they are recorded in the returned statuses.
pub fn compute(table: &mut UnitTable, specs: &SpecSet) -> ComputationOutcome {
    table.clear_indicators();
    let units = table.unit_count();
    let mut statuses = Vec::with_capacity(specs.len());

    for phase in Phase::ALL {
        let ids: Vec<_> = specs.in_phase(phase).collect();
        if ids.is_empty() {
            continue;
        }
        log::info!("{phase}: {} indicator(s) over {units} units", ids.len());

        for id in ids {
            let spec = specs.spec(id);
            let (values, tally) = evaluate(table, spec);
            let status = finish(spec, &values, tally, units);
            table.set_indicator(&spec.name, values);
            statuses.push(status);
        }
    }

    ComputationOutcome {
        unit_count: units,
        statuses,
    }
}

fn evaluate(table: &UnitTable, spec: &IndicatorSpec) -> (Vec<Option<f64>>, Tally) {
    let units = table.unit_count();
    let mut tally = Tally::default();

    let values = match &spec.rule {
        IndicatorRule::Raw { column } | IndicatorRule::Denominator { column } => {
            read_column(table, column, &mut tally)
        }
        IndicatorRule::Rate { numerator, denominator, .. } => {
            let num = match numerator {
                Numerator::Indicator(name) => indicator_values(table, name),
                Numerator::Column(column) => read_column(table, column, &mut tally),
            };
            let den = indicator_values(table, denominator);
            if den.iter().all(Option::is_none) {
                tally.missing_denominator = true;
            }
            rate(&num, &den, &mut tally)
        }
        IndicatorRule::Composite { calculation } => {
            let lookup = |name: &str| table.indicator(name).map(|c| c.values.as_slice());
            let eval = formula::evaluate(&calculation.expr, units, &lookup);
            tally.div_zero = eval.div_zero_count();
            eval.values
        }
    };

    (values, tally)
}

/// Parse a source column to numbers. Absent units and blank cells are null.
fn read_column(table: &UnitTable, column: &ColumnRef, tally: &mut Tally) -> Vec<Option<f64>> {
    let Some(col) = column.bind(table) else {
        tally.missing_source = true;
        return vec![None; table.unit_count()];
    };
    table
        .source_column(col)
        .iter()
        .map(|cell| match cell.as_deref().map(parse_numeric) {
            Some(Numeric::Value(v)) => Some(v),
            Some(Numeric::Invalid) => {
                tally.parse_failures += 1;
                None
            }
            Some(Numeric::Empty) | None => None,
        })
        .collect()
}

fn indicator_values(table: &UnitTable, name: &str) -> Vec<Option<f64>> {
    match table.indicator(name) {
        Some(column) => column.values.clone(),
        None => vec![None; table.unit_count()],
    }
}

/// `100 * num / den` per unit. Zero or null denominators give null, as do
/// non-finite quotients.
fn rate(num: &[Option<f64>], den: &[Option<f64>], tally: &mut Tally) -> Vec<Option<f64>> {
    num.iter()
        .zip(den)
        .map(|(n, d)| match (*n, *d) {
            (Some(_), None) => {
                tally.div_zero += 1;
                None
            }
            (_, Some(d)) if d == 0.0 => {
                tally.div_zero += 1;
                None
            }
            (Some(n), Some(d)) => {
                let v = 100.0 * n / d;
                if !(0.0..=100.0).contains(&v) {
                    tally.out_of_range += 1;
                }
                v.is_finite().then_some(v)
            }
            (None, _) => None,
        })
        .collect()
}

fn finish(spec: &IndicatorSpec, values: &[Option<f64>], tally: Tally, units: usize) -> ComputationStatus {
    let non_null_count = values.iter().filter(|v| v.is_some()).count();

    let status = if tally.missing_source {
        Status::MissingSource
    } else if tally.missing_denominator {
        Status::MissingDenominator
    } else if non_null_count == 0 {
        Status::AllNull
    } else if tally.div_zero > 0 {
        Status::DivZeroSome
    } else {
        Status::Ok
    };

    let name = &spec.name;
    match status {
        Status::MissingSource => {
            let column = spec.source_column().map(|c| c.as_str()).unwrap_or("?");
            log::warn!("{name}: source column '{column}' not in unit table; all values null");
        }
        Status::MissingDenominator => log::warn!("{name}: denominator has no values; all values null"),
        Status::AllNull => log::warn!("{name}: no unit produced a value"),
        Status::DivZeroSome => {
            log::warn!("{name}: {} unit(s) with zero or null denominator", tally.div_zero)
        }
        Status::Ok => log::debug!("{name}: {non_null_count}/{units} values"),
    }
    if tally.parse_failures > 0 {
        log::warn!("{name}: {} non-numeric cell(s) read as null", tally.parse_failures);
    }
    if tally.out_of_range > 0 {
        log::warn!("{name}: {} value(s) outside [0, 100]", tally.out_of_range);
    }

    ComputationStatus {
        name: name.clone(),
        kind: spec.kind(),
        status,
        non_null_count,
        coverage_fraction: if units == 0 {
            0.0
        } else {
            non_null_count as f64 / units as f64
        },
        div_zero_count: tally.div_zero,
        parse_failures: tally.parse_failures,
        out_of_range_count: tally.out_of_range,
    }
}
