use common::config::MysqlConfig;
use common::error::MygramResult;
use common::gtid::Gtid;

/// A single raw cell from a row event, before type coercion into
/// `FilterValue`. Kept as a string + declared type name rather than a typed
/// enum because the authoritative type only becomes known once column
/// metadata from the table-map event (or information-schema fetch) is
/// joined in (spec §4.9, "Column name resolution").
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Value(String),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowAction {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone)]
pub struct ColumnMeta {
    pub name: String,
}

/// Transient numeric table id -> (schema, table, column metadata), valid
/// until the next table-map event for that id (spec §4.9).
#[derive(Debug, Clone)]
pub struct TableMapEvent {
    pub table_id: u64,
    pub schema: String,
    pub table: String,
    pub columns: Vec<ColumnMeta>,
}

#[derive(Debug, Clone)]
pub struct RowEvent {
    pub table_id: u64,
    pub action: RowAction,
    pub before: Option<Vec<RawCell>>,
    pub after: Option<Vec<RawCell>>,
}

#[derive(Debug, Clone)]
pub struct DdlEvent {
    pub schema: String,
    pub table: String,
}

/// The logical event stream `BinlogReader` consumes. Table-map and GTID
/// events are bookkeeping; row and DDL events are handed to
/// `BinlogApplier` (spec §4.9).
#[derive(Debug, Clone)]
pub enum SourceEvent {
    TableMap(TableMapEvent),
    Row(RowEvent),
    Gtid(Gtid),
    Ddl(DdlEvent),
    /// Marks a rotation to a new binlog file; no data of its own.
    Heartbeat,
}

/// Abstraction over the upstream connection, so `BinlogReader`'s state
/// machine and `BinlogApplier`'s dispatch table can be exercised without a
/// live source (spec §4.9 describes the protocol in source-agnostic terms;
/// a concrete MySQL/MariaDB wire implementation plugs in behind this trait
/// the way the teacher's `connection` crate plugs into its `binlog` crate).
#[async_trait::async_trait]
pub trait SourceConnection: Send {
    /// Opens a dedicated connection and issues a binlog-dump request
    /// starting from `from_gtid`. A unique non-zero `replica_id` must be
    /// configured; implementations reject `0` (spec §4.9, Starting).
    async fn open(config: &MysqlConfig, from_gtid: &Gtid) -> MygramResult<Self>
    where
        Self: Sized;

    /// Validates that the source's `gtid_mode`/`binlog_format` are
    /// acceptable before a (re)connect is accepted (spec §2 supplement,
    /// connection validation).
    async fn validate_capabilities(&mut self) -> MygramResult<()>;

    /// Fetches the authoritative, ordinal-ordered column name list for one
    /// table from the source's information schema (spec §4.9, "Column name
    /// resolution").
    async fn fetch_columns(&mut self, schema: &str, table: &str) -> MygramResult<Vec<String>>;

    /// Blocks until the next event is available.
    async fn next_event(&mut self) -> MygramResult<SourceEvent>;

    async fn close(&mut self) -> MygramResult<()>;
}
