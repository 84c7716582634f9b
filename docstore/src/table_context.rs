use crate::document_store::DocumentStore;
use crate::schema::TableSchema;
use common::config::TableConfig;
use common::error::MygramResult;
use common::gtid::Gtid;
use common::types::FilterTuple;
use ngram::index::Index;
use ngram::ngrammer::Ngrammer;
use ngram::normalize::NormalizeOptions;
use ngram::posting_list::EncodingParams;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// Owns one `(Index, DocumentStore, TableConfig)` triple, identified by
/// table name (spec §2 component 6). The single-writer/many-reader regime
/// named in spec §4.3/§5 is implemented here: one `RwLock` covers both the
/// index and the document store together, since a mutation must update both
/// consistently.
pub struct TableContext {
    pub config: TableConfig,
    pub schema: TableSchema,
    inner: RwLock<Inner>,
    /// Set when a DDL event (TRUNCATE/ALTER/DROP) arrives for this table;
    /// cleared only by a successful SYNC (spec §4.9, DDL row).
    needs_sync: AtomicBool,
    gtid: RwLock<Gtid>,
}

struct Inner {
    index: Index,
    store: DocumentStore,
}

pub struct TableContextReadGuard<'a> {
    guard: std::sync::RwLockReadGuard<'a, Inner>,
}

impl<'a> TableContextReadGuard<'a> {
    pub fn index(&self) -> &Index {
        &self.guard.index
    }
    pub fn store(&self) -> &DocumentStore {
        &self.guard.store
    }
}

pub struct TableContextWriteGuard<'a> {
    guard: std::sync::RwLockWriteGuard<'a, Inner>,
}

impl<'a> TableContextWriteGuard<'a> {
    pub fn index_mut(&mut self) -> &mut Index {
        &mut self.guard.index
    }
    pub fn store_mut(&mut self) -> &mut DocumentStore {
        &mut self.guard.store
    }
    pub fn index(&self) -> &Index {
        &self.guard.index
    }
    pub fn store(&self) -> &DocumentStore {
        &self.guard.store
    }
}

impl TableContext {
    pub fn new(config: TableConfig) -> Self {
        let schema = TableSchema::from_table_config(&config);
        let ngrammer = Ngrammer::new(config.w_ascii, config.effective_w_cjk(), NormalizeOptions::default());
        let encoding = EncodingParams {
            density_threshold: config.posting.density_threshold,
            hysteresis_ratio: config.posting.hysteresis_ratio,
            max_sorted_bytes: config.posting.max_sorted_bytes,
        };
        TableContext {
            config,
            schema,
            inner: RwLock::new(Inner { index: Index::new(ngrammer, encoding), store: DocumentStore::new() }),
            needs_sync: AtomicBool::new(false),
            gtid: RwLock::new(Gtid::empty()),
        }
    }

    pub fn read(&self) -> TableContextReadGuard<'_> {
        TableContextReadGuard { guard: self.inner.read().expect("table lock poisoned") }
    }

    pub fn write(&self) -> TableContextWriteGuard<'_> {
        TableContextWriteGuard { guard: self.inner.write().expect("table lock poisoned") }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn gtid(&self) -> Gtid {
        self.gtid.read().expect("gtid lock poisoned").clone()
    }

    pub fn set_gtid(&self, gtid: Gtid) {
        *self.gtid.write().expect("gtid lock poisoned") = gtid;
    }

    pub fn mark_needs_sync(&self) {
        self.needs_sync.store(true, Ordering::SeqCst);
    }

    pub fn clear_needs_sync(&self) {
        self.needs_sync.store(false, Ordering::SeqCst);
    }

    pub fn needs_sync(&self) -> bool {
        self.needs_sync.load(Ordering::SeqCst)
    }

    /// Atomically replaces the index and document store, used when loading
    /// a snapshot or finishing a SYNC rebuild (spec §4.10, §4.13).
    pub fn replace_contents(&self, index: Index, store: DocumentStore) {
        let mut guard = self.inner.write().expect("table lock poisoned");
        guard.index = index;
        guard.store = store;
    }

    /// Inserts a document under the write lock: `DocumentStore::AddDocument`
    /// followed by `Index::Add` (spec §4.9, INSERT row passes RF).
    pub fn insert_document(&self, pk: String, filters: FilterTuple, text: &str) -> MygramResult<u32> {
        let mut guard = self.write();
        let docid = guard.store_mut().add_document(pk, filters)?;
        let domain_size = guard.store().domain_size();
        guard.index_mut().add(docid, text, domain_size);
        Ok(docid)
    }

    /// Removes a document under the write lock: `Index::Remove` followed by
    /// `DocumentStore::RemoveDocument` (spec §4.9, DELETE row).
    pub fn remove_document(&self, pk: &str, text: &str) -> Option<u32> {
        let mut guard = self.write();
        let docid = guard.store().get_docid(pk)?;
        let domain_size = guard.store().domain_size();
        guard.index_mut().remove(docid, text, domain_size);
        guard.store_mut().remove_document(pk)
    }

    /// Drops empty postings and resettles encodings under the write lock
    /// (spec §4.4, OPTIMIZE). Returns `(ngrams_dropped, postings_reencoded)`.
    pub fn optimize(&self) -> (usize, usize) {
        let mut guard = self.write();
        let domain_size = guard.store().domain_size();
        guard.index_mut().optimize(domain_size)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use common::config::TextSource;
    use common::types::FilterValue;

    fn config() -> TableConfig {
        TableConfig {
            name: "posts".to_string(),
            pk_column: "id".to_string(),
            text_source: TextSource { columns: vec!["title".to_string()], delimiter: " ".to_string() },
            required_filters: vec![],
            optional_filters: vec![],
            w_ascii: 2,
            w_cjk: 0,
            posting: Default::default(),
        }
    }

    #[test]
    fn insert_then_search_under_read_lock() {
        let ctx = TableContext::new(config());
        ctx.insert_document("pk1".to_string(), FilterTuple::new(vec![]), "hello world").unwrap();

        let read = ctx.read();
        let expr = ngram::ast::BooleanExpr::leaf(ngram::ast::Term::Word("hello".to_string()));
        assert_eq!(read.index().evaluate_all(&expr), vec![0]);
    }

    #[test]
    fn remove_clears_postings_and_store() {
        let ctx = TableContext::new(config());
        ctx.insert_document("pk1".to_string(), FilterTuple::new(vec![]), "hello world").unwrap();
        ctx.remove_document("pk1", "hello world");

        let read = ctx.read();
        assert_eq!(read.store().live_count(), 0);
        let expr = ngram::ast::BooleanExpr::leaf(ngram::ast::Term::Word("hello".to_string()));
        assert!(read.index().evaluate_all(&expr).is_empty());
    }

    #[test]
    fn needs_sync_flag_round_trips() {
        let ctx = TableContext::new(config());
        assert!(!ctx.needs_sync());
        ctx.mark_needs_sync();
        assert!(ctx.needs_sync());
        ctx.clear_needs_sync();
        assert!(!ctx.needs_sync());
        let _ = FilterValue::Null;
    }
}
