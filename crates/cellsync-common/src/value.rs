use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A scalar cell value.
///
/// This is the closed set of values the engine moves into cell coordinates.
/// Formulas, styles and rich text are deliberately absent; anything richer is
/// coerced to one of these variants at the boundary where it enters.
///
/// With the `serde` feature the value maps onto plain JSON scalars:
/// strings, numbers, booleans and `null` (empty).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    Boolean(bool),
    Number(f64),
    Text(String),
    #[default]
    Empty,
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Coerce text that came back from a text-only surface into a typed value.
    ///
    /// `""` is empty, numeric text becomes a number, `TRUE`/`FALSE` (any case)
    /// become booleans; everything else stays text.
    pub fn coerce_from_text(text: &str) -> Self {
        if text.is_empty() {
            return CellValue::Empty;
        }
        let trimmed = text.trim();
        if trimmed.eq_ignore_ascii_case("TRUE") {
            return CellValue::Boolean(true);
        }
        if trimmed.eq_ignore_ascii_case("FALSE") {
            return CellValue::Boolean(false);
        }
        // `f64::from_str` accepts "inf"/"NaN"; a cell holding that text is text.
        if trimmed == text && looks_numeric(trimmed) {
            if let Ok(n) = trimmed.parse::<f64>() {
                if n.is_finite() {
                    return CellValue::Number(n);
                }
            }
        }
        CellValue::Text(text.to_string())
    }

    /// Normalise a value for storage: empty strings collapse to `Empty` and
    /// negative zero to zero.
    pub fn normalized(self) -> Self {
        match self {
            CellValue::Text(s) if s.is_empty() => CellValue::Empty,
            CellValue::Number(n) if n == 0.0 => CellValue::Number(0.0),
            other => other,
        }
    }

    /// Hashable identity of this value, used when the value acts as a merge key.
    pub fn key(&self) -> CellKey {
        CellKey::from(self)
    }
}

fn looks_numeric(s: &str) -> bool {
    let body = s.strip_prefix(['-', '+']).unwrap_or(s);
    !body.is_empty()
        && body.chars().next().is_some_and(|c| c.is_ascii_digit() || c == '.')
        && body
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '-' | '+'))
}

impl Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Empty => Ok(()),
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<i32> for CellValue {
    fn from(value: i32) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Boolean(value)
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl<'a> From<&'a str> for CellValue {
    fn from(value: &'a str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CellValue::Empty)
    }
}

/// Exact-equality key derived from a [`CellValue`].
///
/// Numbers compare by bit pattern after folding `-0.0` into `0.0`, so two keys
/// are equal exactly when the values are. Text is compared verbatim: no case
/// folding, no trimming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellKey {
    Boolean(bool),
    Number(u64),
    Text(String),
    Empty,
}

impl From<&CellValue> for CellKey {
    fn from(value: &CellValue) -> Self {
        match value {
            CellValue::Boolean(b) => CellKey::Boolean(*b),
            CellValue::Number(n) => {
                let n = if *n == 0.0 { 0.0 } else { *n };
                CellKey::Number(n.to_bits())
            }
            CellValue::Text(s) if s.is_empty() => CellKey::Empty,
            CellValue::Text(s) => CellKey::Text(s.clone()),
            CellValue::Empty => CellKey::Empty,
        }
    }
}

impl Hash for CellKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            CellKey::Boolean(b) => {
                state.write_u8(1);
                b.hash(state);
            }
            CellKey::Number(bits) => {
                state.write_u8(2);
                bits.hash(state);
            }
            CellKey::Text(s) => {
                state.write_u8(3);
                s.hash(state);
            }
            CellKey::Empty => state.write_u8(0),
        }
    }
}
