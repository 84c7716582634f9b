use roaring::RoaringBitmap;

/// Density/size parameters governing when a posting list re-encodes itself
/// (spec §4.2). Mirrors `common::config::PostingEncodingConfig` but kept
/// dependency-free here so `ngram` does not need to depend on `common`'s
/// config module for its hottest path; `docstore`/`query` pass the values
/// through from the loaded `TableConfig`.
#[derive(Debug, Clone, Copy)]
pub struct EncodingParams {
    pub density_threshold: f64,
    pub hysteresis_ratio: f64,
    pub max_sorted_bytes: usize,
}

impl Default for EncodingParams {
    fn default() -> Self {
        EncodingParams {
            density_threshold: 0.18,
            hysteresis_ratio: 0.5,
            max_sorted_bytes: 64 * 1024,
        }
    }
}

/// A set of docids backing one ngram's postings (spec §4.2). Two encodings:
/// a sorted ascending vector (cheap for small/sparse sets) and a compressed
/// bitmap (`roaring::RoaringBitmap`, cheap for dense sets). Transitions are
/// amortized and never lose or duplicate a docid.
#[derive(Debug, Clone)]
pub enum PostingList {
    Sorted(Vec<u32>),
    Bitmap(RoaringBitmap),
}

impl Default for PostingList {
    fn default() -> Self {
        PostingList::Sorted(Vec::new())
    }
}

impl PostingList {
    pub fn new() -> Self {
        PostingList::default()
    }

    pub fn cardinality(&self) -> u64 {
        match self {
            PostingList::Sorted(v) => v.len() as u64,
            PostingList::Bitmap(b) => b.len(),
        }
    }

    /// Approximate in-memory byte size, used for the size-based transition
    /// trigger (spec §4.2: "or when the sorted variant exceeds a configured
    /// size").
    pub fn byte_size(&self) -> usize {
        match self {
            PostingList::Sorted(v) => v.len() * std::mem::size_of::<u32>(),
            PostingList::Bitmap(b) => b.serialized_size(),
        }
    }

    pub fn contains(&self, docid: u32) -> bool {
        match self {
            PostingList::Sorted(v) => v.binary_search(&docid).is_ok(),
            PostingList::Bitmap(b) => b.contains(docid),
        }
    }

    /// Idempotent insert: inserting an already-present docid is a no-op
    /// (spec §4.2).
    pub fn insert(&mut self, docid: u32, domain_size: u64, params: &EncodingParams) {
        match self {
            PostingList::Sorted(v) => match v.binary_search(&docid) {
                Ok(_) => {}
                Err(pos) => v.insert(pos, docid),
            },
            PostingList::Bitmap(b) => {
                b.insert(docid);
            }
        }
        self.maybe_transition(domain_size, params);
    }

    /// Idempotent remove: removing an absent docid is a no-op (spec §4.2).
    pub fn remove(&mut self, docid: u32, domain_size: u64, params: &EncodingParams) {
        match self {
            PostingList::Sorted(v) => {
                if let Ok(pos) = v.binary_search(&docid) {
                    v.remove(pos);
                }
            }
            PostingList::Bitmap(b) => {
                b.remove(docid);
            }
        }
        self.maybe_transition(domain_size, params);
    }

    fn density(&self, domain_size: u64) -> f64 {
        if domain_size == 0 {
            0.0
        } else {
            self.cardinality() as f64 / domain_size as f64
        }
    }

    /// Re-evaluates the encoding transition without touching membership,
    /// used by `Index::optimize` to let a posting list settle into its
    /// ideal representation after a batch of removals (spec §4.2).
    pub fn reencode(&mut self, domain_size: u64, params: &EncodingParams) {
        self.maybe_transition(domain_size, params);
    }

    fn maybe_transition(&mut self, domain_size: u64, params: &EncodingParams) {
        match self {
            PostingList::Sorted(_) => {
                let oversized = self.byte_size() > params.max_sorted_bytes;
                let dense = self.density(domain_size) >= params.density_threshold;
                if oversized || dense {
                    self.convert_to_bitmap();
                }
            }
            PostingList::Bitmap(_) => {
                let sparse_threshold = params.density_threshold * params.hysteresis_ratio;
                if self.density(domain_size) < sparse_threshold {
                    self.convert_to_sorted();
                }
            }
        }
    }

    fn convert_to_bitmap(&mut self) {
        if let PostingList::Sorted(v) = self {
            let bitmap: RoaringBitmap = v.iter().copied().collect();
            *self = PostingList::Bitmap(bitmap);
        }
    }

    fn convert_to_sorted(&mut self) {
        if let PostingList::Bitmap(b) = self {
            let v: Vec<u32> = b.iter().collect();
            *self = PostingList::Sorted(v);
        }
    }

    /// Ascending iterator over docids (spec §4.2 iteration guarantee).
    pub fn iter(&self) -> Box<dyn Iterator<Item = u32> + '_> {
        match self {
            PostingList::Sorted(v) => Box::new(v.iter().copied()),
            PostingList::Bitmap(b) => Box::new(b.iter()),
        }
    }

    pub fn is_bitmap(&self) -> bool {
        matches!(self, PostingList::Bitmap(_))
    }
}

/// Ascending sorted-merge intersection of two docid iterators, used by
/// `Index::EvaluateBoolean` for AND (spec §4.2 iteration guarantee).
pub fn intersect<'a>(
    a: impl Iterator<Item = u32> + 'a,
    b: impl Iterator<Item = u32> + 'a,
) -> impl Iterator<Item = u32> + 'a {
    MergeIntersect { a: a.peekable(), b: b.peekable() }
}

/// Ascending sorted-merge difference (`a` minus `b`), used for NOT.
pub fn difference<'a>(
    a: impl Iterator<Item = u32> + 'a,
    b: impl Iterator<Item = u32> + 'a,
) -> impl Iterator<Item = u32> + 'a {
    MergeDifference { a: a.peekable(), b: b.peekable() }
}

struct MergeIntersect<A: Iterator<Item = u32>, B: Iterator<Item = u32>> {
    a: std::iter::Peekable<A>,
    b: std::iter::Peekable<B>,
}

impl<A: Iterator<Item = u32>, B: Iterator<Item = u32>> Iterator for MergeIntersect<A, B> {
    type Item = u32;
    fn next(&mut self) -> Option<u32> {
        loop {
            match (self.a.peek(), self.b.peek()) {
                (Some(&x), Some(&y)) => {
                    if x == y {
                        self.a.next();
                        self.b.next();
                        return Some(x);
                    } else if x < y {
                        self.a.next();
                    } else {
                        self.b.next();
                    }
                }
                _ => return None,
            }
        }
    }
}

struct MergeDifference<A: Iterator<Item = u32>, B: Iterator<Item = u32>> {
    a: std::iter::Peekable<A>,
    b: std::iter::Peekable<B>,
}

impl<A: Iterator<Item = u32>, B: Iterator<Item = u32>> Iterator for MergeDifference<A, B> {
    type Item = u32;
    fn next(&mut self) -> Option<u32> {
        loop {
            match (self.a.peek(), self.b.peek()) {
                (Some(&x), Some(&y)) => {
                    if x == y {
                        self.a.next();
                        self.b.next();
                    } else if x < y {
                        self.a.next();
                        return Some(x);
                    } else {
                        self.b.next();
                    }
                }
                (Some(&x), None) => {
                    self.a.next();
                    return Some(x);
                }
                (None, _) => return None,
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn insert_is_idempotent() {
        let params = EncodingParams::default();
        let mut pl = PostingList::new();
        pl.insert(5, 100, &params);
        pl.insert(5, 100, &params);
        assert_eq!(pl.cardinality(), 1);
    }

    #[test]
    fn remove_absent_is_noop() {
        let params = EncodingParams::default();
        let mut pl = PostingList::new();
        pl.insert(5, 100, &params);
        pl.remove(9, 100, &params);
        assert_eq!(pl.cardinality(), 1);
    }

    #[test]
    fn transitions_to_bitmap_when_dense() {
        let params = EncodingParams { density_threshold: 0.1, hysteresis_ratio: 0.5, max_sorted_bytes: 1 << 20 };
        let mut pl = PostingList::new();
        for d in 0..20 {
            pl.insert(d, 100, &params);
        }
        assert!(pl.is_bitmap());
    }

    #[test]
    fn transitions_back_to_sorted_with_hysteresis() {
        let params = EncodingParams { density_threshold: 0.2, hysteresis_ratio: 0.5, max_sorted_bytes: 1 << 20 };
        let mut pl = PostingList::new();
        for d in 0..25 {
            pl.insert(d, 100, &params);
        }
        assert!(pl.is_bitmap());
        for d in 0..20 {
            pl.remove(d, 100, &params);
        }
        // cardinality now 5/100 = 0.05 < 0.2*0.5 = 0.1
        assert!(!pl.is_bitmap());
        assert_eq!(pl.cardinality(), 5);
    }

    #[test]
    fn iteration_is_ascending_across_transitions() {
        let params = EncodingParams { density_threshold: 0.1, hysteresis_ratio: 0.5, max_sorted_bytes: 1 << 20 };
        let mut pl = PostingList::new();
        for d in [9, 3, 7, 1, 5, 2, 8, 4, 6, 0] {
            pl.insert(d, 1000, &params);
        }
        let collected: Vec<u32> = pl.iter().collect();
        assert_eq!(collected, (0..10).collect::<Vec<u32>>());
    }

    #[test]
    fn intersect_merges_ascending() {
        let a = vec![1u32, 2, 4, 6];
        let b = vec![2u32, 3, 4, 8];
        let got: Vec<u32> = intersect(a.into_iter(), b.into_iter()).collect();
        assert_eq!(got, vec![2, 4]);
    }

    #[test]
    fn difference_removes_shared() {
        let a = vec![1u32, 2, 4, 6];
        let b = vec![2u32, 4];
        let got: Vec<u32> = difference(a.into_iter(), b.into_iter()).collect();
        assert_eq!(got, vec![1, 6]);
    }
}
