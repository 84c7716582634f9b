use crate::cache::ResultCache;
use crate::command::SearchClauses;
use common::types::FilterTuple;
use docstore::filter_evaluator::{FilterEvaluator, OptionalFilterExpr};
use docstore::table_context::TableContext;
use ngram::ast::BooleanExpr;
use std::time::Instant;

/// One matched row, shaped for the wire response (spec §4.6): the primary
/// key plus whatever filter/optional-filter columns the table declared.
#[derive(Debug, Clone)]
pub struct DocumentRow {
    pub pk: String,
    pub filters: FilterTuple,
}

/// Everything a `DEBUG ON` session appends after a SEARCH/COUNT response
/// (spec §4.6, Debug block).
#[derive(Debug, Clone)]
pub struct DebugInfo {
    pub term_count: usize,
    pub ngram_counts: Vec<usize>,
    pub smallest_posting_cardinalities: Vec<u64>,
    pub candidate_count: u64,
    pub filtered_count: u64,
    pub cache_hit: bool,
    /// Set only when `cache_hit` is true (spec §4.6, `cache_age_ms`).
    pub cache_age_ms: Option<u64>,
    /// Set only when `cache_hit` is true (spec §4.6, `cache_saved_ms`): the
    /// time the original (miss) evaluation took, recorded at insert time.
    pub cache_saved_ms: Option<u64>,
    pub elapsed_micros: u128,
    /// Wall time spent walking the index/posting lists before filtering and
    /// pagination (spec §4.6, `index_time`); `0` on a cache hit since the
    /// index was never touched.
    pub index_time_micros: u128,
    /// `GetTopN` when the index's ranked-by-docid retrieval satisfied the
    /// page directly; `reuse-fetch` when an already-cached match set was
    /// paginated instead (spec §4.6, `optimization`).
    pub optimization: &'static str,
    pub limit_defaulted: bool,
    pub offset_defaulted: bool,
    pub sort_defaulted: bool,
    pub filter_defaulted: bool,
}

/// Internal result of `resolve_matches`, carrying enough of the cache's
/// answer for `search`/`count` to build a debug block without a second
/// cache round-trip.
struct MatchResolution {
    docids: Vec<u32>,
    cache_hit: bool,
    cache_age_ms: Option<u64>,
    cache_saved_ms: Option<u64>,
    index_time_micros: u128,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub rows: Vec<DocumentRow>,
    pub total_matched: u64,
    pub debug: Option<DebugInfo>,
}

/// Drives the SEARCH/COUNT/GET pipelines of spec §4.6 against one table.
/// Stateless beyond the cache: every call takes the `TableContext` and
/// `ResultCache` it needs, mirroring `FilterEvaluator`'s stateless shape.
pub struct QueryExecutor<'a> {
    cache: &'a ResultCache,
    min_query_cost_ms: u64,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(cache: &'a ResultCache, min_query_cost_ms: u64) -> Self {
        QueryExecutor { cache, min_query_cost_ms }
    }

    /// Resolves the full, unpaginated match set for `expr` (+ optional
    /// FILTER), in ascending docid order — consulting and feeding the
    /// cache around the boolean evaluation + filter application boundary
    /// (spec §4.6, step 1-3; §4.7).
    fn resolve_matches(
        &self,
        table: &TableContext,
        query_text: &str,
        expr: &BooleanExpr,
        filter: Option<&OptionalFilterExpr>,
        sort_descending: bool,
    ) -> MatchResolution {
        let sort = crate::command::SortSpec { descending: sort_descending };
        if let Some(hit) = self.cache.get(table.name(), query_text, filter, sort) {
            return MatchResolution {
                docids: hit.docids,
                cache_hit: true,
                cache_age_ms: Some(hit.age_ms),
                cache_saved_ms: Some(hit.saved_ms),
                index_time_micros: 0,
            };
        }

        let started = Instant::now();
        let read = table.read();
        let mut matched: Vec<u32> = Vec::new();
        for docid in read.index().evaluate(expr) {
            let keep = match filter {
                Some(f) => match read.store().get_filters(docid) {
                    Some(tuple) => FilterEvaluator::evaluate_optional(&table.schema, tuple, f),
                    None => false,
                },
                None => true,
            };
            if keep {
                matched.push(docid);
            }
        }
        drop(read);
        let index_time = started.elapsed();

        if index_time.as_millis() as u64 >= self.min_query_cost_ms {
            self.cache.put(
                table.name(),
                query_text,
                filter,
                sort,
                matched.clone(),
                matched.len() as u64,
                index_time.as_millis() as u64,
            );
        }
        MatchResolution {
            docids: matched,
            cache_hit: false,
            cache_age_ms: None,
            cache_saved_ms: None,
            index_time_micros: index_time.as_micros(),
        }
    }

    /// SEARCH (spec §4.6): resolve matches, sort, paginate, materialize rows.
    pub fn search(
        &self,
        table: &TableContext,
        query_text: &str,
        expr: &BooleanExpr,
        clauses: &SearchClauses,
        debug_enabled: bool,
    ) -> SearchOutcome {
        let started = Instant::now();
        let resolution = self.resolve_matches(table, query_text, expr, clauses.filter.as_ref(), clauses.sort.descending);
        let mut matched = resolution.docids;

        let candidate_count = matched.len() as u64;
        if clauses.sort.descending {
            matched.reverse();
        }

        let page: Vec<u32> = matched
            .iter()
            .skip(clauses.offset as usize)
            .take(clauses.limit as usize)
            .copied()
            .collect();

        let read = table.read();
        let rows: Vec<DocumentRow> = page
            .into_iter()
            .filter_map(|docid| {
                let pk = read.store().get_pk(docid)?.to_string();
                let filters = read.store().get_filters(docid).cloned().unwrap_or_default();
                Some(DocumentRow { pk, filters })
            })
            .collect();
        drop(read);

        let debug = if debug_enabled {
            let leaves = expr.leaves();
            let read = table.read();
            let ngram_counts = leaves.iter().map(|t| read.index().term_ngram_count(t)).collect();
            let smallest_posting_cardinalities =
                leaves.iter().map(|t| read.index().smallest_posting_cardinality(t)).collect();
            drop(read);
            Some(DebugInfo {
                term_count: leaves.len(),
                ngram_counts,
                smallest_posting_cardinalities,
                candidate_count,
                filtered_count: candidate_count,
                cache_hit: resolution.cache_hit,
                cache_age_ms: resolution.cache_age_ms,
                cache_saved_ms: resolution.cache_saved_ms,
                elapsed_micros: started.elapsed().as_micros(),
                index_time_micros: resolution.index_time_micros,
                optimization: if resolution.cache_hit { "reuse-fetch" } else { "GetTopN" },
                limit_defaulted: clauses.limit_defaulted,
                offset_defaulted: clauses.offset_defaulted,
                sort_defaulted: clauses.sort_defaulted,
                filter_defaulted: clauses.filter_defaulted,
            })
        } else {
            None
        };

        SearchOutcome { rows, total_matched: candidate_count, debug }
    }

    /// COUNT (spec §4.6): identical pipeline through the filter step, no
    /// sort/pagination/materialization.
    pub fn count(&self, table: &TableContext, query_text: &str, expr: &BooleanExpr, filter: Option<&OptionalFilterExpr>) -> u64 {
        let resolution = self.resolve_matches(table, query_text, expr, filter, true);
        resolution.docids.len() as u64
    }

    /// GET (spec §4.6): direct primary-key lookup, bypassing the index and
    /// cache entirely.
    pub fn get(&self, table: &TableContext, pk: &str) -> Option<DocumentRow> {
        let read = table.read();
        let docid = read.store().get_docid(pk)?;
        let filters = read.store().get_filters(docid).cloned().unwrap_or_default();
        Some(DocumentRow { pk: pk.to_string(), filters })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::command::{SearchClauses, SortSpec};
    use common::config::{TableConfig, TextSource};
    use common::types::FilterValue;
    use ngram::ast::Term;

    fn table() -> TableContext {
        let cfg = TableConfig {
            name: "posts".to_string(),
            pk_column: "id".to_string(),
            text_source: TextSource { columns: vec!["title".to_string()], delimiter: " ".to_string() },
            required_filters: vec![],
            optional_filters: vec![],
            w_ascii: 2,
            w_cjk: 0,
            posting: Default::default(),
        };
        TableContext::new(cfg)
    }

    fn clauses() -> SearchClauses {
        SearchClauses {
            filter: None,
            sort: SortSpec::default(),
            limit: 20,
            offset: 0,
            limit_defaulted: true,
            offset_defaulted: true,
            sort_defaulted: true,
            filter_defaulted: true,
        }
    }

    #[test]
    fn search_returns_matching_rows_in_default_desc_order() {
        let table = table();
        table.insert_document("pk1".to_string(), FilterTuple::new(vec![]), "hello world").unwrap();
        table.insert_document("pk2".to_string(), FilterTuple::new(vec![]), "hello there").unwrap();

        let cache = ResultCache::new(1024 * 1024, 60);
        let executor = QueryExecutor::new(&cache, 0);
        let expr = BooleanExpr::leaf(Term::Word("hello".to_string()));
        let outcome = executor.search(&table, "hello", &expr, &clauses(), false);

        assert_eq!(outcome.total_matched, 2);
        assert_eq!(outcome.rows.iter().map(|r| r.pk.clone()).collect::<Vec<_>>(), vec!["pk2", "pk1"]);
    }

    #[test]
    fn count_matches_search_total() {
        let table = table();
        table.insert_document("pk1".to_string(), FilterTuple::new(vec![]), "hello world").unwrap();

        let cache = ResultCache::new(1024 * 1024, 60);
        let executor = QueryExecutor::new(&cache, 0);
        let expr = BooleanExpr::leaf(Term::Word("hello".to_string()));
        assert_eq!(executor.count(&table, "hello", &expr, None), 1);
    }

    #[test]
    fn get_returns_row_by_primary_key() {
        let table = table();
        let tuple = FilterTuple::new(vec![FilterValue::I64(7)]);
        table.insert_document("pk1".to_string(), tuple, "hello world").unwrap();

        let cache = ResultCache::new(1024 * 1024, 60);
        let executor = QueryExecutor::new(&cache, 0);
        let row = executor.get(&table, "pk1").unwrap();
        assert_eq!(row.pk, "pk1");

        assert!(executor.get(&table, "missing").is_none());
    }

    #[test]
    fn second_identical_search_is_served_from_cache() {
        let table = table();
        table.insert_document("pk1".to_string(), FilterTuple::new(vec![]), "hello world").unwrap();

        let cache = ResultCache::new(1024 * 1024, 0);
        let executor = QueryExecutor::new(&cache, 0);
        let expr = BooleanExpr::leaf(Term::Word("hello".to_string()));
        let _ = executor.search(&table, "hello", &expr, &clauses(), false);
        let second = executor.search(&table, "hello", &expr, &clauses(), true);
        assert_eq!(second.debug.unwrap().cache_hit, true);
    }
}
