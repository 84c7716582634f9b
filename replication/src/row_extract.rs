use crate::source::RawCell;
use common::config::TableConfig;
use common::types::{FilterTuple, FilterValue};
use docstore::schema::TableSchema;

/// Builds `(pk, FilterTuple, text)` from a row's raw cells, zipped against
/// the authoritative column name list resolved for the row's table (spec
/// §4.9, "Column name resolution"). Shared by `BinlogApplier` (row events)
/// and `SnapshotBuilder` (streamed SELECT rows) since both start from a
/// column-name-ordered row.
pub fn extract_row(
    config: &TableConfig,
    schema: &TableSchema,
    columns: &[String],
    cells: &[RawCell],
) -> Option<(String, FilterTuple, String)> {
    let pk_idx = columns.iter().position(|c| c == &config.pk_column)?;
    let pk = match cells.get(pk_idx)? {
        RawCell::Value(s) => s.clone(),
        RawCell::Null => return None,
    };

    let mut values = Vec::with_capacity(schema.columns.len());
    for decl in &schema.columns {
        let value = match columns.iter().position(|c| c == &decl.name).and_then(|i| cells.get(i)) {
            Some(RawCell::Value(s)) => FilterValue::parse(s, decl.column_type).unwrap_or(FilterValue::Null),
            Some(RawCell::Null) | None => FilterValue::Null,
        };
        values.push(value);
    }

    let mut text_parts = Vec::with_capacity(config.text_source.columns.len());
    for col in &config.text_source.columns {
        let part = match columns.iter().position(|c| c == col).and_then(|i| cells.get(i)) {
            Some(RawCell::Value(s)) => s.as_str(),
            _ => "",
        };
        text_parts.push(part);
    }
    let text = text_parts.join(&config.text_source.delimiter);

    Some((pk, FilterTuple::new(values), text))
}
