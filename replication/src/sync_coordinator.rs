use crate::snapshot_builder::{SnapshotBuilder, SnapshotProgress};
use crate::snapshot_source::SnapshotSource;
use common::error::{MygramError, MygramResult};
use common::gtid::Gtid;
use docstore::table_context::TableContext;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// What happened to the live binlog reader after a rebuild completed (spec
/// §4.13, §2 component 20: "drive replication restart at the captured GTID
/// after rebuild").
#[derive(Debug, Clone)]
pub enum RestartOutcome {
    /// Reader stopped and restarted, now streaming from the rebuilt GTID.
    Restarted,
    /// No restart hook was configured; replication was left untouched.
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone)]
pub enum JobStatus {
    Running { processed_rows: u64, total_rows_estimate: u64, rows_per_second: f64 },
    Succeeded { gtid: Gtid, processed_rows: u64, restart: RestartOutcome },
    Failed { reason: String },
}

/// Callback `ReplicationControl` registers so a successful rebuild can drive
/// a replication restart without this crate depending on the server crate.
pub type RestartHook = Arc<dyn Fn() -> MygramResult<()> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct SyncJob {
    pub job_id: u64,
    pub table: String,
    pub status: JobStatus,
}

/// Serializes SYNC requests per table and drives `SnapshotBuilder` in the
/// background (spec §4.13). Each active job's cancellation flag is held
/// here so a shutdown or a repeated SYNC can abort it cleanly.
pub struct SyncCoordinator {
    jobs: Mutex<HashMap<String, SyncJob>>,
    cancel_flags: Mutex<HashMap<String, Arc<AtomicBool>>>,
    next_job_id: AtomicU64,
    restart_hook: Mutex<Option<RestartHook>>,
}

impl Default for SyncCoordinator {
    fn default() -> Self {
        SyncCoordinator {
            jobs: Mutex::new(HashMap::new()),
            cancel_flags: Mutex::new(HashMap::new()),
            next_job_id: AtomicU64::new(1),
            restart_hook: Mutex::new(None),
        }
    }
}

impl SyncCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the hook a successful rebuild uses to restart replication
    /// at the newly captured GTID (spec §4.13). Set once at startup, after
    /// `ReplicationControl` exists.
    pub fn set_restart_hook(&self, hook: RestartHook) {
        *self.restart_hook.lock().expect("restart hook lock poisoned") = Some(hook);
    }

    pub fn is_syncing(&self, table: &str) -> bool {
        matches!(self.jobs.lock().expect("sync jobs lock poisoned").get(table), Some(job) if matches!(job.status, JobStatus::Running { .. }))
    }

    pub fn status_lines(&self) -> Vec<SyncJob> {
        self.jobs.lock().expect("sync jobs lock poisoned").values().cloned().collect()
    }

    /// Starts a SYNC for `table` if one isn't already running, returning
    /// the assigned job id (spec §4.13, §4.11 admission gate "a table is
    /// currently in SYNC").
    pub async fn start<S: SnapshotSource>(
        self: &Arc<Self>,
        table: Arc<TableContext>,
        mut source: S,
    ) -> MygramResult<u64> {
        let table_name = table.name().to_string();
        if self.is_syncing(&table_name) {
            return Err(MygramError::failed_precondition(format!("SYNC already in progress for table '{table_name}'")));
        }

        let job_id = self.next_job_id.fetch_add(1, Ordering::SeqCst);
        let cancel = Arc::new(AtomicBool::new(false));
        self.cancel_flags.lock().expect("cancel flags lock poisoned").insert(table_name.clone(), cancel.clone());
        self.jobs.lock().expect("sync jobs lock poisoned").insert(
            table_name.clone(),
            SyncJob { job_id, table: table_name.clone(), status: JobStatus::Running { processed_rows: 0, total_rows_estimate: 0, rows_per_second: 0.0 } },
        );

        let coordinator = self.clone();
        let schema = table.schema.clone();
        let config = table.config.clone();

        tokio::spawn(async move {
            let progress_name = table_name.clone();
            let coordinator_progress = coordinator.clone();
            let on_progress = move |p: SnapshotProgress| {
                coordinator_progress.record_progress(&progress_name, p);
            };

            match SnapshotBuilder::build(&mut source, &config, &schema, &cancel, on_progress).await {
                Ok(outcome) => {
                    table.replace_contents(outcome.index, outcome.store);
                    table.set_gtid(outcome.gtid.clone());
                    table.clear_needs_sync();
                    info!(event = "sync_succeeded", table = %table_name, rows = outcome.processed_rows, skipped = outcome.skipped_rows);

                    let hook = coordinator.restart_hook.lock().expect("restart hook lock poisoned").clone();
                    let restart = match hook {
                        Some(hook) => match hook() {
                            Ok(()) => {
                                info!(event = "sync_restarted_replication", table = %table_name, gtid = %outcome.gtid.as_str());
                                RestartOutcome::Restarted
                            }
                            Err(e) => {
                                warn!(event = "sync_restart_failed", table = %table_name, error = %e);
                                RestartOutcome::Failed(e.to_string())
                            }
                        },
                        None => RestartOutcome::Skipped,
                    };
                    coordinator.record_result(
                        &table_name,
                        JobStatus::Succeeded { gtid: outcome.gtid, processed_rows: outcome.processed_rows, restart },
                    );
                }
                Err(e) => {
                    warn!(event = "sync_failed", table = %table_name, error = %e);
                    coordinator.record_result(&table_name, JobStatus::Failed { reason: e.to_string() });
                }
            }
            coordinator.cancel_flags.lock().expect("cancel flags lock poisoned").remove(&table_name);
        });

        Ok(job_id)
    }

    pub fn cancel(&self, table: &str) {
        if let Some(flag) = self.cancel_flags.lock().expect("cancel flags lock poisoned").get(table) {
            flag.store(true, Ordering::SeqCst);
        }
    }

    fn record_progress(&self, table: &str, progress: SnapshotProgress) {
        let mut jobs = self.jobs.lock().expect("sync jobs lock poisoned");
        if let Some(job) = jobs.get_mut(table) {
            job.status = JobStatus::Running {
                processed_rows: progress.processed_rows,
                total_rows_estimate: progress.total_rows_estimate,
                rows_per_second: progress.rows_per_second,
            };
        }
    }

    fn record_result(&self, table: &str, status: JobStatus) {
        let mut jobs = self.jobs.lock().expect("sync jobs lock poisoned");
        if let Some(job) = jobs.get_mut(table) {
            job.status = status;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn not_syncing_by_default() {
        let coordinator = SyncCoordinator::new();
        assert!(!coordinator.is_syncing("posts"));
        assert!(coordinator.status_lines().is_empty());
    }
}
