use crate::source::RawCell;
use common::config::MysqlConfig;
use common::error::MygramResult;
use common::gtid::Gtid;

/// The connection `SnapshotBuilder` drives: open a consistent-read
/// transaction, stream one table's rows in column order (spec §4.8). A
/// separate trait from `SourceConnection` because a snapshot read and a
/// binlog stream are different connection roles even against the same
/// source.
#[async_trait::async_trait]
pub trait SnapshotSource: Send {
    async fn open(config: &MysqlConfig) -> MygramResult<Self>
    where
        Self: Sized;

    /// Starts a consistent-read transaction and returns the source's
    /// executed-GTID-set at that instant (spec §4.8, step 1).
    async fn begin_consistent_snapshot(&mut self) -> MygramResult<Gtid>;

    async fn row_count_estimate(&mut self, table: &str) -> MygramResult<u64>;

    /// Opens a streaming cursor over `columns` for `table` (spec §4.8, step
    /// 2: "the distinct set of columns referenced by pk, text-source,
    /// required and optional filters").
    async fn open_cursor(&mut self, table: &str, columns: &[String]) -> MygramResult<()>;

    /// Returns the next row's cells in `columns` order, or `None` at
    /// end-of-cursor.
    async fn next_row(&mut self) -> MygramResult<Option<Vec<RawCell>>>;

    async fn close(&mut self) -> MygramResult<()>;
}
