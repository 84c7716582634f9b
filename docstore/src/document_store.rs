use common::error::{MygramError, MygramResult};
use common::types::FilterTuple;
use std::collections::HashMap;

/// Maps an external primary key to an internal monotonic docid and back,
/// plus the dense docid -> FilterTuple vector (spec §2 component 5, §3).
/// Docids are assigned densely in insertion order; a removed docid is
/// tombstoned and never reused (spec §3, DocumentStore invariants).
#[derive(Debug, Default)]
pub struct DocumentStore {
    pk_to_docid: HashMap<String, u32>,
    /// `None` once the slot is tombstoned.
    docid_to_pk: Vec<Option<String>>,
    filters: Vec<Option<FilterTuple>>,
    live_count: usize,
    next_docid: u32,
}

impl DocumentStore {
    pub fn new() -> Self {
        DocumentStore::default()
    }

    /// Total docid slots ever allocated, used as the "domain size" the
    /// posting-list density transition is computed against (spec §4.2).
    pub fn domain_size(&self) -> u64 {
        self.docid_to_pk.len() as u64
    }

    pub fn live_count(&self) -> usize {
        self.live_count
    }

    /// Inserts a new document. Fails with `AlreadyExists` if `pk` is
    /// currently live (spec §4.4).
    pub fn add_document(&mut self, pk: String, filters: FilterTuple) -> MygramResult<u32> {
        if self.pk_to_docid.contains_key(&pk) {
            return Err(MygramError::AlreadyExists(format!("primary key '{pk}' already indexed")));
        }
        let docid = self.next_docid;
        self.next_docid += 1;
        self.pk_to_docid.insert(pk.clone(), docid);
        self.docid_to_pk.push(Some(pk));
        self.filters.push(Some(filters));
        self.live_count += 1;
        Ok(docid)
    }

    /// Removes a document by primary key, returning its now-dead docid so
    /// the caller can drive `Index::remove` with it (spec §4.4).
    pub fn remove_document(&mut self, pk: &str) -> Option<u32> {
        let docid = self.pk_to_docid.remove(pk)?;
        self.docid_to_pk[docid as usize] = None;
        self.filters[docid as usize] = None;
        self.live_count -= 1;
        Some(docid)
    }

    pub fn get_docid(&self, pk: &str) -> Option<u32> {
        self.pk_to_docid.get(pk).copied()
    }

    pub fn get_pk(&self, docid: u32) -> Option<&str> {
        self.docid_to_pk.get(docid as usize).and_then(|o| o.as_deref())
    }

    pub fn get_filters(&self, docid: u32) -> Option<&FilterTuple> {
        self.filters.get(docid as usize).and_then(|o| o.as_ref())
    }

    /// Replaces the FilterTuple for a live document in place, used when a
    /// row's required-filter outcome is unchanged but other filter columns
    /// changed (spec §4.9, "text unchanged" update row).
    pub fn update_filters(&mut self, docid: u32, filters: FilterTuple) -> MygramResult<()> {
        match self.filters.get_mut(docid as usize) {
            Some(slot @ Some(_)) => {
                *slot = Some(filters);
                Ok(())
            }
            _ => Err(MygramError::NotFound(format!("docid {docid} is not live"))),
        }
    }

    pub fn is_live(&self, docid: u32) -> bool {
        self.docid_to_pk.get(docid as usize).map(|o| o.is_some()).unwrap_or(false)
    }

    /// Iterates live docids in ascending order.
    pub fn iter_live(&self) -> impl Iterator<Item = u32> + '_ {
        self.docid_to_pk
            .iter()
            .enumerate()
            .filter_map(|(i, pk)| pk.as_ref().map(|_| i as u32))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use common::types::FilterValue;

    fn tuple(status: i64) -> FilterTuple {
        FilterTuple::new(vec![FilterValue::I64(status)])
    }

    #[test]
    fn add_then_lookup_round_trips() {
        let mut store = DocumentStore::new();
        let docid = store.add_document("pk1".to_string(), tuple(1)).unwrap();
        assert_eq!(store.get_docid("pk1"), Some(docid));
        assert_eq!(store.get_pk(docid), Some("pk1"));
        assert_eq!(store.get_filters(docid).unwrap().values[0], FilterValue::I64(1));
    }

    #[test]
    fn duplicate_pk_rejected() {
        let mut store = DocumentStore::new();
        store.add_document("pk1".to_string(), tuple(1)).unwrap();
        let err = store.add_document("pk1".to_string(), tuple(2)).unwrap_err();
        assert_eq!(err.kind(), "AlreadyExists");
    }

    #[test]
    fn tombstoned_docid_never_reused() {
        let mut store = DocumentStore::new();
        let d1 = store.add_document("pk1".to_string(), tuple(1)).unwrap();
        store.remove_document("pk1").unwrap();
        assert!(!store.is_live(d1));
        let d2 = store.add_document("pk2".to_string(), tuple(2)).unwrap();
        assert_ne!(d1, d2);
        assert!(d2 > d1);
    }

    #[test]
    fn iter_live_skips_tombstones() {
        let mut store = DocumentStore::new();
        let d1 = store.add_document("pk1".to_string(), tuple(1)).unwrap();
        let d2 = store.add_document("pk2".to_string(), tuple(2)).unwrap();
        store.remove_document("pk1").unwrap();
        let live: Vec<u32> = store.iter_live().collect();
        assert_eq!(live, vec![d2]);
        let _ = d1;
    }
}
