use crate::codec::SnapshotCodec;
use common::config::DumpConfig;
use common::error::MygramResult;
use common::gtid::Gtid;
use common::time_util::now_str;
use docstore::table_context::TableContext;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const AUTO_PREFIX: &str = "auto_";

/// Performs one save of every registered table into `dir/<name>`, where
/// `name` is either caller-supplied (manual `DUMP SAVE`) or an
/// `auto_<timestamp>` directory owned by the scheduler (spec §4.10).
///
/// Takes `dump_save_in_progress` as a shared flag so a manual `DUMP SAVE`
/// and the background scheduler can never run concurrently (spec §4.10,
/// §4.11 admission gate).
pub fn save_snapshot(
    root: &Path,
    name: &str,
    tables: &HashMap<String, Arc<TableContext>>,
    dump_save_in_progress: &AtomicBool,
) -> MygramResult<PathBuf> {
    if dump_save_in_progress
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(common::error::MygramError::failed_precondition("a snapshot save is already in progress"));
    }
    let result = save_snapshot_inner(root, name, tables);
    dump_save_in_progress.store(false, Ordering::SeqCst);
    result
}

fn save_snapshot_inner(root: &Path, name: &str, tables: &HashMap<String, Arc<TableContext>>) -> MygramResult<PathBuf> {
    let dir = root.join(name);
    fs::create_dir_all(&dir)?;

    let mut names: Vec<String> = tables.keys().cloned().collect();
    names.sort();

    let mut gtid = Gtid::empty();
    for table_name in &names {
        let ctx = &tables[table_name];
        let read = ctx.read();
        SnapshotCodec::save_table(&dir, table_name, read.index(), read.store())?;
        drop(read);
        let table_gtid = ctx.gtid();
        if !table_gtid.is_empty() {
            gtid = table_gtid;
        }
    }

    SnapshotCodec::write_manifest(&dir, &names, &gtid, &now_str())?;
    info!(event = "snapshot_saved", dir = %dir.display(), tables = names.len());
    Ok(dir)
}

/// Loads `dir` into the matching entries of `tables`. A table named in the
/// manifest but not in the live configuration (or vice versa) is skipped
/// with a logged discrepancy rather than treated as fatal (spec §4.10, Load).
pub fn load_snapshot(
    dir: &Path,
    tables: &HashMap<String, Arc<TableContext>>,
) -> MygramResult<Vec<String>> {
    let manifest = SnapshotCodec::read_manifest(dir)?;
    let mut loaded = Vec::new();

    for table_name in &manifest.tables {
        let Some(ctx) = tables.get(table_name) else {
            warn!(event = "snapshot_load_unknown_table", table = %table_name);
            continue;
        };
        let (index, store) = SnapshotCodec::load_table(
            dir,
            table_name,
            ctx.config.w_ascii,
            ctx.config.effective_w_cjk(),
            ngram::posting_list::EncodingParams {
                density_threshold: ctx.config.posting.density_threshold,
                hysteresis_ratio: ctx.config.posting.hysteresis_ratio,
                max_sorted_bytes: ctx.config.posting.max_sorted_bytes,
            },
        )?;
        ctx.replace_contents(index, store);
        ctx.set_gtid(Gtid::from(manifest.gtid.clone()));
        loaded.push(table_name.clone());
    }

    for configured in tables.keys() {
        if !manifest.tables.contains(configured) {
            warn!(event = "snapshot_load_missing_table", table = %configured);
        }
    }

    info!(event = "snapshot_loaded", dir = %dir.display(), tables = loaded.len());
    Ok(loaded)
}

/// Deletes `auto_*` entries in `root` beyond the `retain` most recent,
/// leaving manually-named snapshots untouched (spec §4.10, §6 Persisted state).
pub fn prune_auto_snapshots(root: &Path, retain: usize) -> MygramResult<()> {
    let mut autos: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .filter(|p| p.file_name().and_then(|n| n.to_str()).map(|n| n.starts_with(AUTO_PREFIX)).unwrap_or(false))
        .collect();
    autos.sort();
    if autos.len() > retain {
        for stale in &autos[..autos.len() - retain] {
            if let Err(e) = fs::remove_dir_all(stale) {
                warn!(event = "snapshot_prune_failed", path = %stale.display(), error = %e);
            } else {
                info!(event = "snapshot_pruned", path = %stale.display());
            }
        }
    }
    Ok(())
}

/// Background task that periodically saves a full snapshot under the
/// `dump_save_in_progress` guard, then prunes old `auto_*` directories
/// (spec §4.10, Scheduler). One instance per server; `stop()` is
/// cooperative, checked between sleeps and immediately after a save.
pub struct SnapshotScheduler {
    dump_save_in_progress: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
}

impl SnapshotScheduler {
    pub fn new(dump_save_in_progress: Arc<AtomicBool>) -> Self {
        SnapshotScheduler { dump_save_in_progress, stop: Arc::new(AtomicBool::new(false)) }
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Runs the scheduler loop until `stop()` is called. Intended to be
    /// driven inside a `tokio::spawn`.
    pub async fn run(&self, config: DumpConfig, tables: Arc<HashMap<String, Arc<TableContext>>>) {
        if config.interval_sec == 0 {
            return;
        }
        let root = PathBuf::from(&config.dir);
        loop {
            for _ in 0..config.interval_sec {
                if self.stop.load(Ordering::SeqCst) {
                    return;
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            if self.stop.load(Ordering::SeqCst) {
                return;
            }
            let name = format!("{AUTO_PREFIX}{}", timestamp_token());
            match save_snapshot(&root, &name, &tables, &self.dump_save_in_progress) {
                Ok(dir) => {
                    if let Err(e) = prune_auto_snapshots(&root, config.retain) {
                        warn!(event = "snapshot_scheduler_prune_failed", error = %e);
                    }
                    info!(event = "snapshot_scheduler_tick", dir = %dir.display());
                }
                Err(e) => warn!(event = "snapshot_scheduler_save_failed", error = %e),
            }
        }
    }
}

fn timestamp_token() -> String {
    now_str().replace([':', ' ', '+'], "-")
}

#[cfg(test)]
mod test {
    use super::*;
    use common::config::{TableConfig, TextSource};

    fn table(name: &str) -> Arc<TableContext> {
        let cfg = TableConfig {
            name: name.to_string(),
            pk_column: "id".to_string(),
            text_source: TextSource { columns: vec!["title".to_string()], delimiter: " ".to_string() },
            required_filters: vec![],
            optional_filters: vec![],
            w_ascii: 2,
            w_cjk: 0,
            posting: Default::default(),
        };
        Arc::new(TableContext::new(cfg))
    }

    #[test]
    fn save_then_load_round_trips_table_contents() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = table("posts");
        ctx.insert_document("pk1".to_string(), common::types::FilterTuple::new(vec![]), "hello world").unwrap();

        let mut tables = HashMap::new();
        tables.insert("posts".to_string(), ctx.clone());

        let guard = AtomicBool::new(false);
        let saved_dir = save_snapshot(dir.path(), "manual", &tables, &guard).unwrap();
        assert!(!guard.load(Ordering::SeqCst));

        let fresh = table("posts");
        let mut fresh_tables = HashMap::new();
        fresh_tables.insert("posts".to_string(), fresh.clone());
        let loaded = load_snapshot(&saved_dir, &fresh_tables).unwrap();

        assert_eq!(loaded, vec!["posts".to_string()]);
        assert_eq!(fresh.read().store().get_docid("pk1"), Some(0));
    }

    #[test]
    fn concurrent_save_is_rejected_while_guard_held() {
        let dir = tempfile::tempdir().unwrap();
        let tables = HashMap::new();
        let guard = AtomicBool::new(true);
        let err = save_snapshot(dir.path(), "manual", &tables, &guard).unwrap_err();
        assert_eq!(err.kind(), "FailedPrecondition");
    }

    #[test]
    fn prune_keeps_only_newest_auto_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            fs::create_dir_all(dir.path().join(format!("auto_{i:03}"))).unwrap();
        }
        fs::create_dir_all(dir.path().join("manual_keep")).unwrap();
        prune_auto_snapshots(dir.path(), 2).unwrap();

        let remaining: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert!(remaining.contains(&"manual_keep".to_string()));
        assert!(remaining.contains(&"auto_003".to_string()));
        assert!(remaining.contains(&"auto_004".to_string()));
        assert!(!remaining.contains(&"auto_000".to_string()));
    }
}
