use async_trait::async_trait;
use common::config::MysqlConfig;
use common::error::{MygramError, MygramResult};
use common::gtid::Gtid;
use replication::{RawCell, SnapshotSource, SourceConnection, SourceEvent};

/// A `SourceConnection`/`SnapshotSource` that always reports itself
/// unavailable. The wire-level MySQL/MariaDB binlog client is specified
/// externally and plugs in behind these same traits (spec §1, Non-goals:
/// "the wire protocol of the replication client itself"); this stub lets
/// `BinlogReader`'s state machine and `SyncCoordinator` run against a real
/// (if permanently unreachable) implementation rather than leaving the
/// replication surface unwired.
pub struct UnavailableSource;

impl UnavailableSource {
    /// Unlike `SourceConnection::open`/`SnapshotSource::open`, this always
    /// succeeds: the unavailability is surfaced by the first real operation
    /// (`next_event`, `begin_consistent_snapshot`, ...) instead, so callers
    /// that need a concrete value up front (`SyncCoordinator::start`) can
    /// still exercise the rest of the pipeline's error handling.
    pub fn new() -> Self {
        UnavailableSource
    }
}

impl Default for UnavailableSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceConnection for UnavailableSource {
    async fn open(_config: &MysqlConfig, _from_gtid: &Gtid) -> MygramResult<Self> {
        Err(MygramError::unavailable("no binlog source configured for this build"))
    }

    async fn validate_capabilities(&mut self) -> MygramResult<()> {
        Err(MygramError::unavailable("no binlog source configured for this build"))
    }

    async fn fetch_columns(&mut self, _schema: &str, _table: &str) -> MygramResult<Vec<String>> {
        Err(MygramError::unavailable("no binlog source configured for this build"))
    }

    async fn next_event(&mut self) -> MygramResult<SourceEvent> {
        Err(MygramError::unavailable("no binlog source configured for this build"))
    }

    async fn close(&mut self) -> MygramResult<()> {
        Ok(())
    }
}

#[async_trait]
impl SnapshotSource for UnavailableSource {
    async fn open(_config: &MysqlConfig) -> MygramResult<Self> {
        Err(MygramError::unavailable("no snapshot source configured for this build"))
    }

    async fn begin_consistent_snapshot(&mut self) -> MygramResult<Gtid> {
        Err(MygramError::unavailable("no snapshot source configured for this build"))
    }

    async fn row_count_estimate(&mut self, _table: &str) -> MygramResult<u64> {
        Err(MygramError::unavailable("no snapshot source configured for this build"))
    }

    async fn open_cursor(&mut self, _table: &str, _columns: &[String]) -> MygramResult<()> {
        Err(MygramError::unavailable("no snapshot source configured for this build"))
    }

    async fn next_row(&mut self) -> MygramResult<Option<Vec<RawCell>>> {
        Err(MygramError::unavailable("no snapshot source configured for this build"))
    }

    async fn close(&mut self) -> MygramResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn open_always_reports_unavailable() {
        let cfg = MysqlConfig {
            host: "127.0.0.1".to_string(),
            port: 3306,
            username: "root".to_string(),
            password: String::new(),
            database: None,
            replica_id: 1,
            reconnect_backoff_min_ms: 10,
            reconnect_backoff_max_ms: 20,
            state_write_interval_events: 100,
            event_queue_size: 10,
            use_gtid: true,
        };
        let err = <UnavailableSource as SourceConnection>::open(&cfg, &Gtid::empty()).await.unwrap_err();
        assert_eq!(err.kind(), "Unavailable");
    }
}
