use crate::admission::AdmissionGates;
use crate::stub_source::UnavailableSource;
use common::config::MysqlConfig;
use common::error::{MygramError, MygramResult};
use common::gtid::Gtid;
use docstore::table_context::TableContext;
use query::ResultCache;
use replication::{
    BinlogApplier, BinlogReaderConfig, BinlogReaderHandle, ReaderState, ReplicationCounters, SourceEvent,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct Running {
    reader_handle: BinlogReaderHandle,
    reader_join: JoinHandle<()>,
    pump_join: JoinHandle<()>,
    applier: Arc<Mutex<BinlogApplier>>,
}

/// Owns the live `BinlogReader` + `BinlogApplier` pair and exposes the
/// start/stop/status surface `REPLICATION START|STOP|STATUS` drives (spec
/// §4.9, §4.11). Only one reader runs at a time; `start` is a no-op error if
/// one is already streaming.
pub struct ReplicationControl {
    mysql_config: Mutex<MysqlConfig>,
    reader_config: BinlogReaderConfig,
    event_queue_size: usize,
    tables: HashMap<String, Arc<TableContext>>,
    cache: Arc<ResultCache>,
    admission: Arc<AdmissionGates>,
    running: Mutex<Option<Running>>,
    last_error: Mutex<Option<String>>,
    failure_count: AtomicU64,
}

impl ReplicationControl {
    pub fn new(
        mysql_config: MysqlConfig,
        reader_config: BinlogReaderConfig,
        event_queue_size: usize,
        tables: HashMap<String, Arc<TableContext>>,
        cache: Arc<ResultCache>,
        admission: Arc<AdmissionGates>,
    ) -> Self {
        ReplicationControl {
            mysql_config: Mutex::new(mysql_config),
            reader_config,
            event_queue_size,
            tables,
            cache,
            admission,
            running: Mutex::new(None),
            last_error: Mutex::new(None),
            failure_count: AtomicU64::new(0),
        }
    }

    pub fn set_endpoint(&self, host: String, port: u16) {
        let mut cfg = self.mysql_config.lock().expect("mysql config lock poisoned");
        cfg.host = host;
        cfg.port = port;
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().expect("replication control lock poisoned").is_some()
    }

    /// Starts the reader from the most-advanced GTID already recorded across
    /// registered tables (spec §4.9: "resume from the captured GTID").
    pub fn start(self: &Arc<Self>) -> MygramResult<()> {
        let mut running = self.running.lock().expect("replication control lock poisoned");
        if running.is_some() {
            return Err(MygramError::failed_precondition("replication is already running"));
        }

        let start_gtid = self.tables.values().map(|t| t.gtid()).find(|g| !g.is_empty()).unwrap_or_else(Gtid::empty);
        let (tx, mut rx) = mpsc::channel::<SourceEvent>(self.event_queue_size.max(1));
        let mysql_config = self.mysql_config.lock().expect("mysql config lock poisoned").clone();
        let (reader_handle, reader_join) =
            replication::reader::spawn::<UnavailableSource>(mysql_config, self.reader_config.clone(), start_gtid, tx);
        self.admission.set_reader_handle(reader_handle.clone());

        let applier = Arc::new(Mutex::new(BinlogApplier::new(self.tables.clone())));
        let pump_applier = applier.clone();
        let pump_cache = self.cache.clone();
        let control = self.clone();
        let pump_join = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let is_mutating = matches!(event, SourceEvent::Row(_) | SourceEvent::Ddl(_));
                pump_applier.lock().expect("applier lock poisoned").apply(event);
                if is_mutating {
                    // Cache invalidation is global in this source, matching
                    // CACHE CLEAR's own scope (spec §9, design note).
                    pump_cache.clear();
                }
            }
            let _ = control;
        });

        *running = Some(Running { reader_handle, reader_join, pump_join, applier });
        Ok(())
    }

    pub fn stop(&self) {
        if let Some(running) = self.running.lock().expect("replication control lock poisoned").take() {
            running.reader_handle.stop();
            running.reader_join.abort();
            running.pump_join.abort();
        }
    }

    /// Stops and restarts the reader, picking up each table's current GTID
    /// (spec §4.13: after a SYNC rebuild this resumes from the freshly
    /// captured GTID).
    pub fn restart(self: &Arc<Self>) -> MygramResult<()> {
        self.stop();
        self.start()
    }

    pub fn record_failure(&self, reason: String) {
        *self.last_error.lock().expect("last error lock poisoned") = Some(reason);
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn state(&self) -> ReaderState {
        self.running
            .lock()
            .expect("replication control lock poisoned")
            .as_ref()
            .map(|r| r.reader_handle.state())
            .unwrap_or(ReaderState::Stopped)
    }

    pub fn gtid(&self) -> Gtid {
        self.running
            .lock()
            .expect("replication control lock poisoned")
            .as_ref()
            .map(|r| r.reader_handle.gtid())
            .unwrap_or_else(Gtid::empty)
    }

    pub fn counters(&self) -> [(&'static str, u64); 11] {
        self.running
            .lock()
            .expect("replication control lock poisoned")
            .as_ref()
            .map(|r| r.applier.lock().expect("applier lock poisoned").counters.snapshot())
            .unwrap_or_else(|| ReplicationCounters::default().snapshot())
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().expect("last error lock poisoned").clone()
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }
}
