use serde::{Deserialize, Serialize};

/// How raw key text is normalized before it becomes a [`JoinKey`].
///
/// Normalization never changes the characters of the key beyond whitespace
/// and case: leading zeros and mixed alphanumerics always survive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyNormalization {
    /// Keep the text byte-for-byte.
    Exact,
    /// Strip surrounding whitespace.
    Trim,
    /// Strip surrounding whitespace and uppercase.
    TrimUpper,
}

impl Default for KeyNormalization {
    fn default() -> Self {
        Self::Exact
    }
}

impl std::fmt::Display for KeyNormalization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Trim => write!(f, "trim"),
            Self::TrimUpper => write!(f, "trim_upper"),
        }
    }
}

/// Opaque per-unit identifier used to align fragments and tables.
///
/// Never parsed as a number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JoinKey(String);

impl JoinKey {
    pub fn new(raw: &str, normalization: KeyNormalization) -> Self {
        let text = match normalization {
            KeyNormalization::Exact => raw.to_string(),
            KeyNormalization::Trim => raw.trim().to_string(),
            KeyNormalization::TrimUpper => raw.trim().to_uppercase(),
        };
        Self(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl From<&str> for JoinKey {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl std::fmt::Display for JoinKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
