use common::config::TableConfig;
use common::types::ColumnType;

#[derive(Debug, Clone)]
pub struct FilterColumnDecl {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
}

/// The declared, ordered list of filter columns for a table: required
/// filters first, then optional filters, matching the order `FilterTuple`
/// values are built in by the snapshot builder and binlog applier.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub columns: Vec<FilterColumnDecl>,
}

impl TableSchema {
    pub fn from_table_config(cfg: &TableConfig) -> Self {
        let mut columns = Vec::new();
        for rf in &cfg.required_filters {
            columns.push(FilterColumnDecl { name: rf.column.clone(), column_type: rf.column_type, nullable: false });
        }
        for of in &cfg.optional_filters {
            columns.push(FilterColumnDecl {
                name: of.column.clone(),
                column_type: of.column_type,
                nullable: of.nullable,
            });
        }
        TableSchema { columns }
    }

    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == column)
    }

    pub fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.columns.iter().find(|c| c.name == column).map(|c| c.column_type)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use common::config::{OptionalFilterDecl, RequiredFilter, TextSource};
    use common::config::FilterOp;

    fn cfg() -> TableConfig {
        TableConfig {
            name: "posts".to_string(),
            pk_column: "id".to_string(),
            text_source: TextSource { columns: vec!["title".to_string()], delimiter: " ".to_string() },
            required_filters: vec![RequiredFilter {
                column: "enabled".to_string(),
                column_type: ColumnType::Bool,
                op: FilterOp::Eq,
                value: "1".to_string(),
            }],
            optional_filters: vec![OptionalFilterDecl {
                column: "status".to_string(),
                column_type: ColumnType::I64,
                nullable: false,
            }],
            w_ascii: 2,
            w_cjk: 0,
            posting: Default::default(),
        }
    }

    #[test]
    fn orders_required_before_optional() {
        let schema = TableSchema::from_table_config(&cfg());
        assert_eq!(schema.index_of("enabled"), Some(0));
        assert_eq!(schema.index_of("status"), Some(1));
        assert_eq!(schema.index_of("missing"), None);
    }
}
