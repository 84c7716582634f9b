use crate::ast::{BooleanExpr, Term};
use crate::ngrammer::Ngrammer;
use crate::posting_list::{difference, intersect, EncodingParams, PostingList};
use std::collections::{HashMap, VecDeque};

/// Mapping from ngram to posting list, plus the boolean query evaluator
/// (spec §2 component 4, §4.3). `Index` itself holds no lock: the
/// single-writer/many-reader regime is enforced one level up, by the
/// `TableContext` that owns one `Index` + one `DocumentStore` behind a
/// shared `RwLock` (spec §4.3, Thread-safety).
pub struct Index {
    ngrammer: Ngrammer,
    encoding: EncodingParams,
    postings: HashMap<String, PostingList>,
}

impl Index {
    pub fn new(ngrammer: Ngrammer, encoding: EncodingParams) -> Self {
        Index { ngrammer, encoding, postings: HashMap::new() }
    }

    pub fn ngram_count(&self) -> usize {
        self.postings.len()
    }

    /// Reconstructs an `Index` from a decoded ngram -> posting-list map
    /// (spec §4.10, SnapshotCodec load).
    pub fn from_parts(ngrammer: Ngrammer, encoding: EncodingParams, postings: HashMap<String, PostingList>) -> Self {
        Index { ngrammer, encoding, postings }
    }

    /// Iterates every ngram and its posting list, used by `SnapshotCodec`
    /// to serialize the full index (spec §4.10).
    pub fn iter_postings(&self) -> impl Iterator<Item = (&str, &PostingList)> {
        self.postings.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn delta_encoded_count(&self) -> usize {
        self.postings.values().filter(|p| !p.is_bitmap()).count()
    }

    pub fn bitmap_count(&self) -> usize {
        self.postings.values().filter(|p| p.is_bitmap()).count()
    }

    /// Inserts `docid` into every ngram posting list produced from `text`
    /// (spec §4.3, Add).
    pub fn add(&mut self, docid: u32, text: &str, domain_size: u64) {
        for gram in self.ngrammer.ngrams(text) {
            self.postings
                .entry(gram)
                .or_default()
                .insert(docid, domain_size, &self.encoding);
        }
    }

    /// Removes `docid` from every ngram posting list produced from `text`.
    /// The caller must pass the *original* text (spec §4.3, Remove).
    pub fn remove(&mut self, docid: u32, text: &str, domain_size: u64) {
        for gram in self.ngrammer.ngrams(text) {
            if let Some(pl) = self.postings.get_mut(&gram) {
                pl.remove(docid, domain_size, &self.encoding);
            }
        }
    }

    /// Applies only the symmetric difference between the ngram sets of
    /// `old_text` and `new_text` (spec §4.3, Modify).
    pub fn modify(&mut self, docid: u32, old_text: &str, new_text: &str, domain_size: u64) {
        let old: std::collections::HashSet<String> = self.ngrammer.ngrams(old_text).into_iter().collect();
        let new: std::collections::HashSet<String> = self.ngrammer.ngrams(new_text).into_iter().collect();

        for gram in old.difference(&new) {
            if let Some(pl) = self.postings.get_mut(gram) {
                pl.remove(docid, domain_size, &self.encoding);
            }
        }
        for gram in new.difference(&old) {
            self.postings
                .entry(gram.clone())
                .or_default()
                .insert(docid, domain_size, &self.encoding);
        }
    }

    fn posting_iter(&self, gram: &str) -> Box<dyn Iterator<Item = u32> + '_> {
        match self.postings.get(gram) {
            Some(pl) => pl.iter(),
            None => Box::new(std::iter::empty()),
        }
    }

    pub fn posting_cardinality(&self, gram: &str) -> u64 {
        self.postings.get(gram).map(|p| p.cardinality()).unwrap_or(0)
    }

    /// Expands a user term into its ngrams via the configured Ngrammer, then
    /// ANDs the resulting posting lists together. A phrase is "a bag of
    /// ngrams" (spec §4.3) with no positional check; a plain word of more
    /// than one ngram is evaluated the same way. A term shorter than the
    /// applicable width expands to zero ngrams and matches the empty set
    /// (spec §4.6, step 2).
    fn term_iter(&self, term: &Term) -> Box<dyn Iterator<Item = u32> + '_> {
        let grams = self.ngrammer.ngrams(term.text());
        if grams.is_empty() {
            return Box::new(std::iter::empty());
        }
        let mut iter = self.posting_iter(&grams[0]);
        for gram in &grams[1..] {
            iter = Box::new(intersect(iter, self.posting_iter(gram)));
        }
        iter
    }

    /// Returns the number of ngrams the term with the fewest postings would
    /// contribute; used by the executor's planner to estimate candidate
    /// cardinality for a single-ngram term (spec §4.3, Query planner policy).
    pub fn term_ngram_count(&self, term: &Term) -> usize {
        self.ngrammer.ngrams(term.text()).len()
    }

    pub fn smallest_posting_cardinality(&self, term: &Term) -> u64 {
        self.ngrammer
            .ngrams(term.text())
            .iter()
            .map(|g| self.posting_cardinality(g))
            .min()
            .unwrap_or(0)
    }

    /// Evaluates the boolean AST to an ascending, lazily-combined iterator
    /// over docids (spec §4.3, EvaluateBoolean).
    pub fn evaluate<'a>(&'a self, expr: &'a BooleanExpr) -> Box<dyn Iterator<Item = u32> + 'a> {
        match expr {
            BooleanExpr::Leaf(term) => self.term_iter(term),
            BooleanExpr::And(l, r) => Box::new(intersect(self.evaluate(l), self.evaluate(r))),
            BooleanExpr::AndNot(l, r) => Box::new(difference(self.evaluate(l), self.evaluate(r))),
        }
    }

    /// Materializes every matching docid in ascending order.
    pub fn evaluate_all(&self, expr: &BooleanExpr) -> Vec<u32> {
        self.evaluate(expr).collect()
    }

    /// Drops ngrams with no remaining postings and re-evaluates every other
    /// posting list's encoding against the current domain size, settling
    /// lists that drifted between thresholds across many removals without
    /// ever re-reading document text (spec §4.4, OPTIMIZE). Returns the
    /// number of ngrams dropped and the number re-encoded.
    pub fn optimize(&mut self, domain_size: u64) -> (usize, usize) {
        let before = self.postings.len();
        self.postings.retain(|_, pl| pl.cardinality() > 0);
        let dropped = before - self.postings.len();

        let mut reencoded = 0;
        for pl in self.postings.values_mut() {
            let was_bitmap = pl.is_bitmap();
            pl.reencode(domain_size, &self.encoding);
            if pl.is_bitmap() != was_bitmap {
                reencoded += 1;
            }
        }
        (dropped, reencoded)
    }

    /// The first `n` docids in DESC order, computed by walking the ascending
    /// iterator once and keeping only a bounded `n`-sized window — the
    /// "without materializing the full intermediate" path of spec §4.3.
    pub fn get_top_n(&self, expr: &BooleanExpr, n: usize) -> Vec<u32> {
        if n == 0 {
            return Vec::new();
        }
        let mut ring: VecDeque<u32> = VecDeque::with_capacity(n);
        for docid in self.evaluate(expr) {
            if ring.len() == n {
                ring.pop_front();
            }
            ring.push_back(docid);
        }
        ring.into_iter().rev().collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::normalize::NormalizeOptions;

    fn index() -> Index {
        Index::new(Ngrammer::new(2, 1, NormalizeOptions::default()), EncodingParams::default())
    }

    #[test]
    fn add_then_search_finds_document() {
        let mut idx = index();
        idx.add(1, "hello world", 1);
        idx.add(2, "hello universe", 2);
        idx.add(3, "goodbye world", 3);

        let expr = BooleanExpr::leaf(Term::Word("hello".into()));
        let mut got = idx.evaluate_all(&expr);
        got.sort();
        assert_eq!(got, vec![1, 2]);
    }

    #[test]
    fn remove_with_original_text_clears_postings() {
        let mut idx = index();
        idx.add(1, "hello world", 1);
        idx.remove(1, "hello world", 1);
        let expr = BooleanExpr::leaf(Term::Word("hello".into()));
        assert!(idx.evaluate_all(&expr).is_empty());
    }

    #[test]
    fn and_and_not_combine_correctly() {
        let mut idx = index();
        idx.add(1, "machine learning tutorial", 3);
        idx.add(2, "machine learning advanced", 3);
        idx.add(3, "deep learning tutorial", 3);

        let and_expr = BooleanExpr::leaf(Term::Word("machine".into()))
            .and(BooleanExpr::leaf(Term::Word("learning".into())));
        let mut got = idx.evaluate_all(&and_expr);
        got.sort();
        assert_eq!(got, vec![1, 2]);

        let not_expr = BooleanExpr::leaf(Term::Word("learning".into()))
            .and_not(BooleanExpr::leaf(Term::Word("machine".into())));
        assert_eq!(idx.evaluate_all(&not_expr), vec![3]);
    }

    #[test]
    fn short_term_matches_nothing() {
        let mut idx = index();
        idx.add(1, "hello world", 1);
        // width 2, single-char term expands to zero ngrams.
        let expr = BooleanExpr::leaf(Term::Word("h".into()));
        assert!(idx.evaluate_all(&expr).is_empty());
    }

    #[test]
    fn modify_applies_symmetric_difference_only() {
        let mut idx = index();
        idx.add(1, "hello world", 1);
        idx.modify(1, "hello world", "hello there", 1);

        assert!(idx.evaluate_all(&BooleanExpr::leaf(Term::Word("world".into()))).is_empty());
        assert_eq!(idx.evaluate_all(&BooleanExpr::leaf(Term::Word("there".into()))), vec![1]);
        assert_eq!(idx.evaluate_all(&BooleanExpr::leaf(Term::Word("hello".into()))), vec![1]);
    }

    #[test]
    fn optimize_drops_empty_postings() {
        let mut idx = index();
        idx.add(1, "hello world", 2);
        idx.remove(1, "hello world", 2);
        assert_eq!(idx.ngram_count(), 3);
        let (dropped, _) = idx.optimize(0);
        assert_eq!(dropped, 3);
        assert_eq!(idx.ngram_count(), 0);
    }

    #[test]
    fn get_top_n_returns_descending_tail() {
        let mut idx = index();
        for d in 0..10u32 {
            idx.add(d, "test", 10);
        }
        let expr = BooleanExpr::leaf(Term::Word("test".into()));
        let top = idx.get_top_n(&expr, 3);
        assert_eq!(top, vec![9, 8, 7]);
    }
}
