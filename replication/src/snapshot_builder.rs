use crate::row_extract::extract_row;
use crate::snapshot_source::SnapshotSource;
use common::config::TableConfig;
use common::error::{MygramError, MygramResult};
use common::gtid::Gtid;
use docstore::document_store::DocumentStore;
use docstore::filter_evaluator::FilterEvaluator;
use docstore::schema::TableSchema;
use ngram::index::Index;
use ngram::ngrammer::Ngrammer;
use ngram::normalize::NormalizeOptions;
use ngram::posting_list::EncodingParams;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct SnapshotProgress {
    pub total_rows_estimate: u64,
    pub processed_rows: u64,
    pub rows_per_second: f64,
}

pub struct SnapshotOutcome {
    pub gtid: Gtid,
    pub index: Index,
    pub store: DocumentStore,
    pub processed_rows: u64,
    pub skipped_rows: u64,
}

/// Builds one table's `(Index, DocumentStore)` pair from scratch against a
/// consistent read of the upstream source (spec §4.8). Always builds into a
/// fresh pair rather than mutating a live `TableContext` in place, so a
/// cancelled or failed build leaves the live table untouched — the caller
/// only calls `TableContext::replace_contents` after a successful build.
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    pub async fn build<S: SnapshotSource>(
        source: &mut S,
        config: &TableConfig,
        schema: &TableSchema,
        cancel: &AtomicBool,
        mut on_progress: impl FnMut(SnapshotProgress),
    ) -> MygramResult<SnapshotOutcome> {
        let gtid = source.begin_consistent_snapshot().await?;
        let columns = config.referenced_columns();
        let total_rows_estimate = source.row_count_estimate(&config.name).await.unwrap_or(0);
        source.open_cursor(&config.name, &columns).await?;

        let ngrammer = Ngrammer::new(config.w_ascii, config.effective_w_cjk(), NormalizeOptions::default());
        let encoding = EncodingParams {
            density_threshold: config.posting.density_threshold,
            hysteresis_ratio: config.posting.hysteresis_ratio,
            max_sorted_bytes: config.posting.max_sorted_bytes,
        };
        let mut index = Index::new(ngrammer, encoding);
        let mut store = DocumentStore::new();

        let started = Instant::now();
        let mut processed: u64 = 0;
        let mut skipped: u64 = 0;

        loop {
            if cancel.load(Ordering::SeqCst) {
                let _ = source.close().await;
                return Err(MygramError::Cancelled(format!("snapshot of '{}' cancelled after {processed} rows", config.name)));
            }

            let row = match source.next_row().await {
                Ok(row) => row,
                Err(e) => {
                    let _ = source.close().await;
                    return Err(e);
                }
            };
            let Some(cells) = row else { break };

            match extract_row(config, schema, &columns, &cells) {
                Some((pk, tuple, text)) => {
                    // Belt-and-braces: the WHERE clause already applied the
                    // required filters server-side (spec §4.8, step 2).
                    if FilterEvaluator::evaluate_required(schema, &tuple, &config.required_filters) {
                        let domain_size = store.domain_size() + 1;
                        match store.add_document(pk, tuple) {
                            Ok(docid) => index.add(docid, &text, domain_size),
                            Err(e) => {
                                warn!(event = "snapshot_row_add_failed", table = %config.name, error = %e);
                                skipped += 1;
                            }
                        }
                    } else {
                        skipped += 1;
                    }
                }
                None => skipped += 1,
            }

            processed += 1;
            if processed % 1000 == 0 {
                let elapsed = started.elapsed().as_secs_f64().max(0.001);
                on_progress(SnapshotProgress {
                    total_rows_estimate,
                    processed_rows: processed,
                    rows_per_second: processed as f64 / elapsed,
                });
            }
        }

        source.close().await?;
        Ok(SnapshotOutcome { gtid, index, store, processed_rows: processed, skipped_rows: skipped })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::source::RawCell;
    use common::config::{FilterOp, RequiredFilter, TextSource};
    use common::types::ColumnType;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct FakeSource {
        rows: Mutex<VecDeque<Vec<RawCell>>>,
    }

    #[async_trait::async_trait]
    impl SnapshotSource for FakeSource {
        async fn open(_config: &common::config::MysqlConfig) -> MygramResult<Self> {
            unreachable!("test constructs FakeSource directly")
        }
        async fn begin_consistent_snapshot(&mut self) -> MygramResult<Gtid> {
            Ok(Gtid::from("uuid:1-2"))
        }
        async fn row_count_estimate(&mut self, _table: &str) -> MygramResult<u64> {
            Ok(self.rows.lock().unwrap().len() as u64)
        }
        async fn open_cursor(&mut self, _table: &str, _columns: &[String]) -> MygramResult<()> {
            Ok(())
        }
        async fn next_row(&mut self) -> MygramResult<Option<Vec<RawCell>>> {
            Ok(self.rows.lock().unwrap().pop_front())
        }
        async fn close(&mut self) -> MygramResult<()> {
            Ok(())
        }
    }

    fn config() -> TableConfig {
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
            optional_filters: vec![],
            w_ascii: 2,
            w_cjk: 0,
            posting: Default::default(),
        }
    }

    #[tokio::test]
    async fn builds_index_and_store_from_rows() {
        let cfg = config();
        let schema = TableSchema::from_table_config(&cfg);
        let mut source = FakeSource {
            rows: Mutex::new(VecDeque::from(vec![
                vec![RawCell::Value("1".into()), RawCell::Value("hello world".into()), RawCell::Value("1".into())],
                vec![RawCell::Value("2".into()), RawCell::Value("goodbye".into()), RawCell::Value("0".into())],
            ])),
        };
        let cancel = AtomicBool::new(false);
        let outcome = SnapshotBuilder::build(&mut source, &cfg, &schema, &cancel, |_| {}).await.unwrap();

        assert_eq!(outcome.gtid, Gtid::from("uuid:1-2"));
        assert_eq!(outcome.processed_rows, 2);
        assert_eq!(outcome.store.live_count(), 1);
    }

    #[tokio::test]
    async fn cancellation_returns_cancelled_error() {
        let cfg = config();
        let schema = TableSchema::from_table_config(&cfg);
        let mut source = FakeSource { rows: Mutex::new(VecDeque::new()) };
        let cancel = AtomicBool::new(true);
        let err = SnapshotBuilder::build(&mut source, &cfg, &schema, &cancel, |_| {}).await.unwrap_err();
        assert_eq!(err.kind(), "Cancelled");
    }
}
