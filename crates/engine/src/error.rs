use std::fmt;

use crate::spec::Phase;

/// A malformed indicator declaration. Always names the offending indicator.
#[derive(Debug, Clone, PartialEq)]
pub enum SpecValidationError {
    /// TOML parse / deserialization error.
    Parse(String),
    /// The document declares no indicators.
    Empty,
    DuplicateName(String),
    UnknownKind { indicator: String, kind: String },
    MissingField { indicator: String, field: &'static str },
    /// A field that does not apply to the kind, or two mutually exclusive fields.
    ConflictingFields { indicator: String, message: String },
    UndeclaredDependency { indicator: String, dependency: String },
    /// Dependency in the same or a later phase.
    PhaseViolation {
        indicator: String,
        phase: Phase,
        dependency: String,
        dependency_phase: Phase,
    },
    /// Composite calculation does not parse.
    Formula { indicator: String, message: String },
}

impl SpecValidationError {
    /// Name of the indicator the error is about, if any.
    pub fn indicator(&self) -> Option<&str> {
        match self {
            Self::Parse(_) | Self::Empty => None,
            Self::DuplicateName(name) => Some(name),
            Self::UnknownKind { indicator, .. }
            | Self::MissingField { indicator, .. }
            | Self::ConflictingFields { indicator, .. }
            | Self::UndeclaredDependency { indicator, .. }
            | Self::PhaseViolation { indicator, .. }
            | Self::Formula { indicator, .. } => Some(indicator),
        }
    }
}

impl fmt::Display for SpecValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(msg) => write!(f, "indicator spec parse error: {msg}"),
            Self::Empty => write!(f, "indicator spec declares no indicators"),
            Self::DuplicateName(name) => write!(f, "indicator '{name}' is declared more than once"),
            Self::UnknownKind { indicator, kind } => write!(
                f,
                "indicator '{indicator}': unknown kind '{kind}' (expected raw, denominator, rate or composite)"
            ),
            Self::MissingField { indicator, field } => {
                write!(f, "indicator '{indicator}': missing required field '{field}'")
            }
            Self::ConflictingFields { indicator, message } => {
                write!(f, "indicator '{indicator}': {message}")
            }
            Self::UndeclaredDependency { indicator, dependency } => {
                write!(f, "indicator '{indicator}': depends on undeclared indicator '{dependency}'")
            }
            Self::PhaseViolation { indicator, phase, dependency, dependency_phase } => write!(
                f,
                "indicator '{indicator}' ({phase}) depends on '{dependency}' ({dependency_phase}); \
                 dependencies must come from an earlier phase"
            ),
            Self::Formula { indicator, message } => {
                write!(f, "indicator '{indicator}': invalid calculation: {message}")
            }
        }
    }
}

impl std::error::Error for SpecValidationError {}
