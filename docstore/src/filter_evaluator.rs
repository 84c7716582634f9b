use crate::schema::TableSchema;
use common::config::{FilterOp, RequiredFilter};
use common::types::{FilterTuple, FilterValue};

/// A single clause of a query-time FILTER expression (spec §4.5 grammar,
/// `FilterExpr`).
#[derive(Debug, Clone)]
pub struct FilterClause {
    pub column: String,
    pub op: FilterOp,
    pub value: String,
}

/// `Col Op Value (AND Col Op Value)*` — ANDed clauses, evaluated against
/// optional filter columns at query time (spec §4.5, §4.6).
#[derive(Debug, Clone, Default)]
pub struct OptionalFilterExpr {
    pub clauses: Vec<FilterClause>,
}

/// Evaluates predicates over a `FilterTuple` (spec §2 component 7, §4.4).
/// Stateless: every method takes the schema and tuple it needs.
pub struct FilterEvaluator;

impl FilterEvaluator {
    /// Decides whether a row belongs in the index at all (spec §3,
    /// RequiredFilter). Used identically by `SnapshotBuilder` and
    /// `BinlogApplier`. A literal that fails to parse under its declared
    /// type yields `false` — the caller is responsible for logging this
    /// once per event (spec §4.4).
    pub fn evaluate_required(schema: &TableSchema, tuple: &FilterTuple, filters: &[RequiredFilter]) -> bool {
        filters.iter().all(|f| Self::eval_required_one(schema, tuple, f))
    }

    fn eval_required_one(schema: &TableSchema, tuple: &FilterTuple, f: &RequiredFilter) -> bool {
        let Some(idx) = schema.index_of(&f.column) else { return false };
        let Some(actual) = tuple.get(idx) else { return false };

        if matches!(f.op, FilterOp::IsNull) {
            return actual.is_null();
        }
        if matches!(f.op, FilterOp::IsNotNull) {
            return !actual.is_null();
        }

        let Ok(literal) = FilterValue::parse(&f.value, f.column_type) else { return false };
        Self::compare(actual, f.op, &literal)
    }

    /// Evaluates an optional, query-time FILTER clause over stored
    /// FilterTuples (spec §4.4). Unsupported operator/type combinations do
    /// not error: `<` on a string compares lexicographically; any
    /// comparison against NULL other than IS NULL/IS NOT NULL is false.
    pub fn evaluate_optional(schema: &TableSchema, tuple: &FilterTuple, expr: &OptionalFilterExpr) -> bool {
        expr.clauses.iter().all(|clause| {
            let Some(idx) = schema.index_of(&clause.column) else { return false };
            let Some(actual) = tuple.get(idx) else { return false };
            let Some(column_type) = schema.column_type(&clause.column) else { return false };

            if matches!(clause.op, FilterOp::IsNull) {
                return actual.is_null();
            }
            if matches!(clause.op, FilterOp::IsNotNull) {
                return !actual.is_null();
            }

            match FilterValue::parse(&clause.value, column_type) {
                Ok(literal) => Self::compare(actual, clause.op, &literal),
                Err(_) => false,
            }
        })
    }

    fn compare(actual: &FilterValue, op: FilterOp, literal: &FilterValue) -> bool {
        use std::cmp::Ordering::*;
        match op {
            FilterOp::Eq => actual.eq_value(literal),
            FilterOp::Ne => !actual.eq_value(literal) && !actual.is_null() && !literal.is_null(),
            FilterOp::Lt => actual.partial_cmp_value(literal) == Some(Less),
            FilterOp::Gt => actual.partial_cmp_value(literal) == Some(Greater),
            FilterOp::Le => matches!(actual.partial_cmp_value(literal), Some(Less) | Some(Equal)),
            FilterOp::Ge => matches!(actual.partial_cmp_value(literal), Some(Greater) | Some(Equal)),
            FilterOp::IsNull | FilterOp::IsNotNull => unreachable!("handled by caller"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::schema::TableSchema;
    use common::config::{OptionalFilterDecl, RequiredFilter, TableConfig, TextSource};
    use common::types::ColumnType;

    fn schema() -> TableSchema {
        let cfg = TableConfig {
            name: "posts".to_string(),
            pk_column: "id".to_string(),
            text_source: TextSource { columns: vec!["title".to_string()], delimiter: " ".to_string() },
            required_filters: vec![RequiredFilter {
                column: "enabled".to_string(),
                column_type: ColumnType::I64,
                op: FilterOp::Eq,
                value: "1".to_string(),
            }],
            optional_filters: vec![OptionalFilterDecl {
                column: "status".to_string(),
                column_type: ColumnType::I64,
                nullable: true,
            }],
            w_ascii: 2,
            w_cjk: 0,
            posting: Default::default(),
        };
        TableSchema::from_table_config(&cfg)
    }

    #[test]
    fn required_filter_excludes_non_matching_row() {
        let schema = schema();
        let tuple = FilterTuple::new(vec![FilterValue::I64(0), FilterValue::Null]);
        let filters = vec![RequiredFilter {
            column: "enabled".to_string(),
            column_type: ColumnType::I64,
            op: FilterOp::Eq,
            value: "1".to_string(),
        }];
        assert!(!FilterEvaluator::evaluate_required(&schema, &tuple, &filters));
    }

    #[test]
    fn required_filter_includes_matching_row() {
        let schema = schema();
        let tuple = FilterTuple::new(vec![FilterValue::I64(1), FilterValue::Null]);
        let filters = vec![RequiredFilter {
            column: "enabled".to_string(),
            column_type: ColumnType::I64,
            op: FilterOp::Eq,
            value: "1".to_string(),
        }];
        assert!(FilterEvaluator::evaluate_required(&schema, &tuple, &filters));
    }

    #[test]
    fn null_comparisons_are_false_except_is_null() {
        let schema = schema();
        let tuple = FilterTuple::new(vec![FilterValue::I64(1), FilterValue::Null]);
        let lt_clause = OptionalFilterExpr {
            clauses: vec![FilterClause { column: "status".to_string(), op: FilterOp::Lt, value: "5".to_string() }],
        };
        assert!(!FilterEvaluator::evaluate_optional(&schema, &tuple, &lt_clause));

        let is_null_clause = OptionalFilterExpr {
            clauses: vec![FilterClause {
                column: "status".to_string(),
                op: FilterOp::IsNull,
                value: String::new(),
            }],
        };
        assert!(FilterEvaluator::evaluate_optional(&schema, &tuple, &is_null_clause));
    }

    #[test]
    fn string_lt_is_lexicographic() {
        let cfg = TableConfig {
            name: "posts".to_string(),
            pk_column: "id".to_string(),
            text_source: TextSource { columns: vec!["title".to_string()], delimiter: " ".to_string() },
            required_filters: vec![],
            optional_filters: vec![OptionalFilterDecl {
                column: "category".to_string(),
                column_type: ColumnType::String,
                nullable: false,
            }],
            w_ascii: 2,
            w_cjk: 0,
            posting: Default::default(),
        };
        let schema = TableSchema::from_table_config(&cfg);
        let tuple = FilterTuple::new(vec![FilterValue::Str("apple".to_string())]);
        let expr = OptionalFilterExpr {
            clauses: vec![FilterClause { column: "category".to_string(), op: FilterOp::Lt, value: "banana".to_string() }],
        };
        assert!(FilterEvaluator::evaluate_optional(&schema, &tuple, &expr));
    }
}
