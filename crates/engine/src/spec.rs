use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use smallarea_core::UnitTable;

use crate::dep_graph::{DepGraph, IndicatorId};
use crate::error::SpecValidationError;
use crate::formula::{self, Expr};

// ---------------------------------------------------------------------------
// Kinds and phases
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Raw,
    Denominator,
    Rate,
    Composite,
}

impl IndicatorKind {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "raw" => Some(Self::Raw),
            "denominator" => Some(Self::Denominator),
            "rate" => Some(Self::Rate),
            "composite" => Some(Self::Composite),
            _ => None,
        }
    }

    pub fn phase(self) -> Phase {
        match self {
            Self::Raw => Phase::Raw,
            Self::Denominator => Phase::Denominator,
            Self::Rate => Phase::Rate,
            Self::Composite => Phase::Composite,
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => write!(f, "raw"),
            Self::Denominator => write!(f, "denominator"),
            Self::Rate => write!(f, "rate"),
            Self::Composite => write!(f, "composite"),
        }
    }
}

/// Evaluation phase. Phases run strictly in declaration order of this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Raw,
    Denominator,
    Rate,
    Composite,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::Raw, Phase::Denominator, Phase::Rate, Phase::Composite];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => write!(f, "raw phase"),
            Self::Denominator => write!(f, "denominator phase"),
            Self::Rate => write!(f, "rate phase"),
            Self::Composite => write!(f, "composite phase"),
        }
    }
}

// ---------------------------------------------------------------------------
// Specs
// ---------------------------------------------------------------------------

/// Source column named by an indicator. Bound to a column index of a unit
/// table once per computation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef(String);

impl ColumnRef {
    pub fn new(code: &str) -> Option<Self> {
        let code = code.trim();
        (!code.is_empty()).then(|| Self(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn bind(&self, table: &UnitTable) -> Option<usize> {
        table.source_column_index(&self.0)
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Numerator of a rate: an earlier indicator or a source column.
#[derive(Debug, Clone, PartialEq)]
pub enum Numerator {
    Indicator(String),
    Column(ColumnRef),
}

/// Parsed composite calculation with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Calculation {
    pub text: String,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorRule {
    Raw { column: ColumnRef },
    Denominator { column: ColumnRef },
    /// Always `100 * numerator / denominator`. `calculation` is the declared
    /// formula text, kept for reporting only.
    Rate {
        numerator: Numerator,
        denominator: String,
        calculation: Option<String>,
    },
    Composite { calculation: Calculation },
}

/// One declared indicator. Immutable once the spec set is built.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSpec {
    pub name: String,
    pub rule: IndicatorRule,
    pub description: String,
    /// Informational source-table label.
    pub table: Option<String>,
}

impl IndicatorSpec {
    pub fn kind(&self) -> IndicatorKind {
        match self.rule {
            IndicatorRule::Raw { .. } => IndicatorKind::Raw,
            IndicatorRule::Denominator { .. } => IndicatorKind::Denominator,
            IndicatorRule::Rate { .. } => IndicatorKind::Rate,
            IndicatorRule::Composite { .. } => IndicatorKind::Composite,
        }
    }

    pub fn phase(&self) -> Phase {
        self.kind().phase()
    }

    /// Source column read directly by this indicator, if any.
    pub fn source_column(&self) -> Option<&ColumnRef> {
        match &self.rule {
            IndicatorRule::Raw { column } | IndicatorRule::Denominator { column } => Some(column),
            IndicatorRule::Rate {
                numerator: Numerator::Column(column),
                ..
            } => Some(column),
            _ => None,
        }
    }

    /// Names of the indicators this one reads, in order, without repeats.
    pub fn dependencies(&self) -> Vec<String> {
        match &self.rule {
            IndicatorRule::Raw { .. } | IndicatorRule::Denominator { .. } => Vec::new(),
            IndicatorRule::Rate { numerator, denominator, .. } => {
                let mut deps = Vec::new();
                if let Numerator::Indicator(name) = numerator {
                    deps.push(name.clone());
                }
                if !deps.contains(denominator) {
                    deps.push(denominator.clone());
                }
                deps
            }
            IndicatorRule::Composite { calculation } => formula::referenced_indicators(&calculation.expr),
        }
    }

    pub fn calculation(&self) -> Option<&str> {
        match &self.rule {
            IndicatorRule::Rate { calculation, .. } => calculation.as_deref(),
            IndicatorRule::Composite { calculation } => Some(&calculation.text),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration document
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SpecDocument {
    #[serde(default, rename = "indicator")]
    indicators: Vec<IndicatorEntry>,
}

#[derive(Debug, Deserialize)]
struct IndicatorEntry {
    name: String,
    kind: String,
    #[serde(default, alias = "source_column")]
    code: Option<String>,
    #[serde(default)]
    numerator: Option<String>,
    #[serde(default)]
    denominator: Option<String>,
    #[serde(default)]
    calculation: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    table: Option<String>,
}

impl IndicatorEntry {
    fn into_spec(self) -> Result<IndicatorSpec, SpecValidationError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(SpecValidationError::MissingField {
                indicator: "<unnamed>".into(),
                field: "name",
            });
        }
        let kind = IndicatorKind::parse(&self.kind).ok_or_else(|| SpecValidationError::UnknownKind {
            indicator: name.clone(),
            kind: self.kind.clone(),
        })?;

        let missing = |field: &'static str| SpecValidationError::MissingField {
            indicator: name.clone(),
            field,
        };
        let conflict = |message: String| SpecValidationError::ConflictingFields {
            indicator: name.clone(),
            message,
        };
        let reject = |field: &'static str, present: bool| -> Result<(), SpecValidationError> {
            if present {
                Err(conflict(format!("'{field}' does not apply to {kind} indicators")))
            } else {
                Ok(())
            }
        };
        let column = |code: Option<&str>| code.and_then(ColumnRef::new);

        let rule = match kind {
            IndicatorKind::Raw | IndicatorKind::Denominator => {
                reject("numerator", self.numerator.is_some())?;
                reject("denominator", self.denominator.is_some())?;
                reject("calculation", self.calculation.is_some())?;
                let column = column(self.code.as_deref()).ok_or_else(|| missing("code"))?;
                if kind == IndicatorKind::Raw {
                    IndicatorRule::Raw { column }
                } else {
                    IndicatorRule::Denominator { column }
                }
            }
            IndicatorKind::Rate => {
                let denominator = non_empty(self.denominator).ok_or_else(|| missing("denominator"))?;
                let numerator = match (non_empty(self.numerator), self.code.as_deref()) {
                    (Some(_), Some(_)) => {
                        return Err(conflict("set either 'numerator' or 'code', not both".into()))
                    }
                    (Some(indicator), None) => Numerator::Indicator(indicator),
                    (None, code) => Numerator::Column(column(code).ok_or_else(|| missing("numerator"))?),
                };
                IndicatorRule::Rate {
                    numerator,
                    denominator,
                    calculation: non_empty(self.calculation),
                }
            }
            IndicatorKind::Composite => {
                reject("code", self.code.is_some())?;
                reject("numerator", self.numerator.is_some())?;
                reject("denominator", self.denominator.is_some())?;
                let text = non_empty(self.calculation).ok_or_else(|| missing("calculation"))?;
                let expr = formula::parse(&text).map_err(|message| SpecValidationError::Formula {
                    indicator: name.clone(),
                    message,
                })?;
                if formula::referenced_indicators(&expr).is_empty() {
                    return Err(SpecValidationError::Formula {
                        indicator: name.clone(),
                        message: "calculation references no indicator".into(),
                    });
                }
                IndicatorRule::Composite {
                    calculation: Calculation { text, expr },
                }
            }
        };

        Ok(IndicatorSpec {
            name,
            rule,
            description: self.description,
            table: self.table,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Spec set
// ---------------------------------------------------------------------------

/// Validated, ordered collection of indicator specs.
#[derive(Debug, Clone)]
pub struct SpecSet {
    specs: Vec<IndicatorSpec>,
    index: FxHashMap<String, IndicatorId>,
    graph: DepGraph,
    order: Vec<IndicatorId>,
}

impl SpecSet {
    /// Parse and validate an indicator document.
    pub fn from_toml(input: &str) -> Result<Self, SpecValidationError> {
        let doc: SpecDocument =
            toml::from_str(input).map_err(|e| SpecValidationError::Parse(e.to_string()))?;
        let specs = doc
            .indicators
            .into_iter()
            .map(IndicatorEntry::into_spec)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(specs)
    }

    /// Validate names and dependencies, then fix the evaluation order.
    pub fn new(specs: Vec<IndicatorSpec>) -> Result<Self, SpecValidationError> {
        if specs.is_empty() {
            return Err(SpecValidationError::Empty);
        }

        let mut index = FxHashMap::default();
        for (i, spec) in specs.iter().enumerate() {
            if index.insert(spec.name.clone(), IndicatorId(i)).is_some() {
                return Err(SpecValidationError::DuplicateName(spec.name.clone()));
            }
        }

        let mut graph = DepGraph::new();
        for (i, spec) in specs.iter().enumerate() {
            let mut preds = FxHashSet::default();
            for dependency in spec.dependencies() {
                let Some(&dep_id) = index.get(&dependency) else {
                    return Err(SpecValidationError::UndeclaredDependency {
                        indicator: spec.name.clone(),
                        dependency,
                    });
                };
                let dependency_phase = specs[dep_id.0].phase();
                if dependency_phase >= spec.phase() {
                    return Err(SpecValidationError::PhaseViolation {
                        indicator: spec.name.clone(),
                        phase: spec.phase(),
                        dependency,
                        dependency_phase,
                    });
                }
                preds.insert(dep_id);
            }
            graph.replace_edges(IndicatorId(i), preds);
        }

        // Strictly-earlier dependencies make the graph acyclic
        let order = graph
            .topo_order(specs.len(), |id| (specs[id.0].phase(), id))
            .map_err(|cycle| {
                let spec = &specs[cycle[0].0];
                SpecValidationError::PhaseViolation {
                    indicator: spec.name.clone(),
                    phase: spec.phase(),
                    dependency: spec.dependencies().join(", "),
                    dependency_phase: spec.phase(),
                }
            })?;

        Ok(Self { specs, index, graph, order })
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&IndicatorSpec> {
        self.id(name).map(|id| &self.specs[id.0])
    }

    pub fn id(&self, name: &str) -> Option<IndicatorId> {
        self.index.get(name).copied()
    }

    pub fn spec(&self, id: IndicatorId) -> &IndicatorSpec {
        &self.specs[id.0]
    }

    /// Phase-then-declaration order.
    pub fn evaluation_order(&self) -> &[IndicatorId] {
        &self.order
    }

    pub fn in_phase(&self, phase: Phase) -> impl Iterator<Item = IndicatorId> + '_ {
        self.order
            .iter()
            .copied()
            .filter(move |id| self.specs[id.0].phase() == phase)
    }

    /// Names of indicators affected, directly or transitively, by `name`.
    pub fn downstream_of(&self, name: &str) -> Vec<String> {
        self.id(name)
            .map(|id| {
                self.graph
                    .downstream(id)
                    .into_iter()
                    .map(|d| self.specs[d.0].name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}
