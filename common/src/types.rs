use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Declared type of a filter column, mirroring the MySQL-ish type tags a
/// `RequiredFilter` or optional filter declaration carries in config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    I64,
    U64,
    F64,
    String,
    /// Stored as i64 epoch seconds.
    DateTime,
    /// Stored as i8, matching the source's tinyint-as-bool convention.
    Bool,
}

/// A single typed value in a `FilterTuple`. `Null` is a distinct value, not
/// the absence of one (spec §3, FilterTuple).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterValue {
    I64(i64),
    U64(u64),
    F64(f64),
    Str(String),
    DateTime(i64),
    Bool(bool),
    Null,
}

impl FilterValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            FilterValue::I64(_) => "i64",
            FilterValue::U64(_) => "u64",
            FilterValue::F64(_) => "f64",
            FilterValue::Str(_) => "string",
            FilterValue::DateTime(_) => "datetime",
            FilterValue::Bool(_) => "bool",
            FilterValue::Null => "null",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FilterValue::Null)
    }

    /// Parse a literal string according to a declared column type. Used both
    /// by required-filter evaluation and query-time FILTER clauses.
    pub fn parse(literal: &str, ty: ColumnType) -> Result<FilterValue, String> {
        if literal.eq_ignore_ascii_case("null") {
            return Ok(FilterValue::Null);
        }
        match ty {
            ColumnType::I64 => literal
                .parse::<i64>()
                .map(FilterValue::I64)
                .map_err(|e| e.to_string()),
            ColumnType::U64 => literal
                .parse::<u64>()
                .map(FilterValue::U64)
                .map_err(|e| e.to_string()),
            ColumnType::F64 => literal
                .parse::<f64>()
                .map(FilterValue::F64)
                .map_err(|e| e.to_string()),
            ColumnType::String => Ok(FilterValue::Str(literal.to_string())),
            ColumnType::DateTime => literal
                .parse::<i64>()
                .map(FilterValue::DateTime)
                .map_err(|e| e.to_string()),
            ColumnType::Bool => match literal {
                "0" | "false" | "FALSE" => Ok(FilterValue::Bool(false)),
                "1" | "true" | "TRUE" => Ok(FilterValue::Bool(true)),
                other => other
                    .parse::<i64>()
                    .map(|v| FilterValue::Bool(v != 0))
                    .map_err(|e| e.to_string()),
            },
        }
    }

    /// Numeric/lexicographic ordering used by comparison operators.
    /// Comparisons against `Null` (other than IS NULL/IS NOT NULL) always
    /// yield `None` (spec §4.4).
    pub fn partial_cmp_value(&self, other: &FilterValue) -> Option<Ordering> {
        use FilterValue::*;
        match (self, other) {
            (Null, _) | (_, Null) => None,
            (I64(a), I64(b)) => a.partial_cmp(b),
            (U64(a), U64(b)) => a.partial_cmp(b),
            (F64(a), F64(b)) => a.partial_cmp(b),
            (Str(a), Str(b)) => a.partial_cmp(b),
            (DateTime(a), DateTime(b)) => a.partial_cmp(b),
            (Bool(a), Bool(b)) => a.partial_cmp(b),
            // Cross-numeric comparisons: widen to f64.
            (I64(a), U64(b)) => (*a as f64).partial_cmp(&(*b as f64)),
            (U64(a), I64(b)) => (*a as f64).partial_cmp(&(*b as f64)),
            (I64(a), F64(b)) => (*a as f64).partial_cmp(b),
            (F64(a), I64(b)) => a.partial_cmp(&(*b as f64)),
            (U64(a), F64(b)) => (*a as f64).partial_cmp(b),
            (F64(a), U64(b)) => a.partial_cmp(&(*b as f64)),
            _ => None,
        }
    }

    pub fn eq_value(&self, other: &FilterValue) -> bool {
        if self.is_null() || other.is_null() {
            return false;
        }
        self.partial_cmp_value(other) == Some(Ordering::Equal)
    }
}

/// Ordered tuple of typed per-document values, one per declared filter
/// column (spec §3, FilterTuple).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterTuple {
    pub values: Vec<FilterValue>,
}

impl FilterTuple {
    pub fn new(values: Vec<FilterValue>) -> Self {
        FilterTuple { values }
    }

    pub fn get(&self, idx: usize) -> Option<&FilterValue> {
        self.values.get(idx)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_typed_literals() {
        assert_eq!(FilterValue::parse("42", ColumnType::I64).unwrap(), FilterValue::I64(42));
        assert_eq!(FilterValue::parse("NULL", ColumnType::I64).unwrap(), FilterValue::Null);
        assert!(FilterValue::parse("nope", ColumnType::I64).is_err());
    }

    #[test]
    fn null_comparisons_are_always_false() {
        let a = FilterValue::Null;
        let b = FilterValue::I64(1);
        assert!(!a.eq_value(&b));
        assert_eq!(a.partial_cmp_value(&b), None);
    }

    #[test]
    fn cross_numeric_compares() {
        let a = FilterValue::I64(5);
        let b = FilterValue::F64(5.0);
        assert_eq!(a.partial_cmp_value(&b), Some(Ordering::Equal));
    }
}
