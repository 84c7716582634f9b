pub mod document_store;
pub mod filter_evaluator;
pub mod schema;
pub mod table_context;

pub use document_store::DocumentStore;
pub use filter_evaluator::{FilterClause, FilterEvaluator, OptionalFilterExpr};
pub use schema::TableSchema;
pub use table_context::TableContext;
