/// Result of reading a text cell as a number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Value(f64),
    /// Blank cell or an explicit null marker.
    Empty,
    /// Non-empty text that is not a finite number.
    Invalid,
}

const NULL_MARKERS: &[&str] = &["na", "n/a", "nan", "null"];

/// Parse a literal cell into a number.
///
/// Blank cells and null markers (`NA`, `NaN`, `null`) are `Empty`;
/// anything else that is not a finite float is `Invalid`.
pub fn parse_numeric(text: &str) -> Numeric {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Numeric::Empty;
    }
    if NULL_MARKERS.iter().any(|m| trimmed.eq_ignore_ascii_case(m)) {
        return Numeric::Empty;
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => Numeric::Value(v),
        _ => Numeric::Invalid,
    }
}
