use common::error::{MygramError, MygramResult};
use replication::{BinlogReaderHandle, ReaderState, SyncCoordinator};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// The pre-dispatch checks every command passes through before a handler
/// ever sees it (spec §4.11, "Admission gates"). Each gate is a cheap
/// atomic/lock read; none of them touch a table's own `RwLock`.
pub struct AdmissionGates {
    pub dump_load_in_progress: AtomicBool,
    pub dump_save_in_progress: std::sync::Arc<AtomicBool>,
    pub read_only: AtomicBool,
    pub memory_critical: AtomicBool,
    reader_handle: RwLock<Option<BinlogReaderHandle>>,
}

impl AdmissionGates {
    pub fn new(dump_save_in_progress: std::sync::Arc<AtomicBool>, read_only: bool) -> Self {
        AdmissionGates {
            dump_load_in_progress: AtomicBool::new(false),
            dump_save_in_progress,
            read_only: AtomicBool::new(read_only),
            memory_critical: AtomicBool::new(false),
            reader_handle: RwLock::new(None),
        }
    }

    pub fn set_reader_handle(&self, handle: BinlogReaderHandle) {
        *self.reader_handle.write().expect("reader handle lock poisoned") = Some(handle);
    }

    pub fn is_mysql_reconnecting(&self) -> bool {
        self.reader_handle
            .read()
            .expect("reader handle lock poisoned")
            .as_ref()
            .map(|h| matches!(h.state(), ReaderState::Reconnecting | ReaderState::Starting))
            .unwrap_or(false)
    }

    /// Gate applied to every query (SEARCH/COUNT/GET/INFO/etc.), spec §4.11.
    pub fn check_query(&self) -> MygramResult<()> {
        if self.dump_load_in_progress.load(Ordering::SeqCst) {
            return Err(MygramError::failed_precondition("loading in progress"));
        }
        Ok(())
    }

    /// Gate applied to `DUMP SAVE` and other write-ish operations that must
    /// not race a concurrent save (spec §4.11).
    pub fn check_dump_save(&self) -> MygramResult<()> {
        if self.dump_save_in_progress.load(Ordering::SeqCst) {
            return Err(MygramError::failed_precondition("a snapshot save is already in progress"));
        }
        Ok(())
    }

    /// Gate applied to `DUMP LOAD` and any other write that `api.read_only`
    /// should block (spec §4.11).
    pub fn check_write(&self) -> MygramResult<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(MygramError::permission_denied("server is read_only"));
        }
        Ok(())
    }

    pub fn check_replication_start(&self) -> MygramResult<()> {
        if self.is_mysql_reconnecting() {
            return Err(MygramError::failed_precondition("replication is already reconnecting"));
        }
        Ok(())
    }

    /// Gate applied to `SYNC <table>` (spec §4.11, §4.13): no concurrent SYNC
    /// for the same table, and memory pressure must not be critical.
    pub fn check_sync(&self, table: &str, coordinator: &SyncCoordinator) -> MygramResult<()> {
        if self.memory_critical.load(Ordering::SeqCst) {
            return Err(MygramError::failed_precondition("memory pressure is critical, SYNC refused"));
        }
        if coordinator.is_syncing(table) {
            return Err(MygramError::failed_precondition(format!("SYNC already in progress for table '{table}'")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn load_in_progress_blocks_queries() {
        let gates = AdmissionGates::new(Arc::new(AtomicBool::new(false)), false);
        assert!(gates.check_query().is_ok());
        gates.dump_load_in_progress.store(true, Ordering::SeqCst);
        assert!(gates.check_query().is_err());
    }

    #[test]
    fn read_only_blocks_writes_not_queries() {
        let gates = AdmissionGates::new(Arc::new(AtomicBool::new(false)), true);
        assert!(gates.check_query().is_ok());
        assert!(gates.check_write().is_err());
    }

    #[test]
    fn no_reader_handle_is_not_reconnecting() {
        let gates = AdmissionGates::new(Arc::new(AtomicBool::new(false)), false);
        assert!(!gates.is_mysql_reconnecting());
        assert!(gates.check_replication_start().is_ok());
    }
}
