use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use common::error::{MygramError, MygramResult};
use common::gtid::Gtid;
use common::types::FilterTuple;
use docstore::document_store::DocumentStore;
use ngram::index::Index;
use ngram::ngrammer::Ngrammer;
use ngram::normalize::NormalizeOptions;
use ngram::posting_list::{EncodingParams, PostingList};
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const FORMAT_VERSION: &str = "1.0";
const SORTED_TAG: u8 = 0;
const BITMAP_TAG: u8 = 1;

/// `meta.json` (spec §4.10): identifies the table set and the GTID the
/// snapshot was captured at. A directory missing this file, or whose
/// `tables` list does not match what's on disk, is a partial write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub tables: Vec<String>,
    pub gtid: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct DocRangeMeta {
    next_docid: u32,
    domain_size: u32,
}

/// Writes and reads the v1 on-disk snapshot format (spec §4.10). Stateless:
/// every call takes the directory and table data it needs.
pub struct SnapshotCodec;

impl SnapshotCodec {
    /// Writes one table's `<table>.index` + `<table>.docs`, each via
    /// temp-file + atomic rename, then the shared `meta.json` last so a
    /// reader never observes a manifest referencing a half-written table.
    pub fn save_table(dir: &Path, table: &str, index: &Index, store: &DocumentStore) -> MygramResult<()> {
        fs::create_dir_all(dir)?;
        Self::write_atomic(&dir.join(format!("{table}.docs")), &Self::encode_docs(store)?)?;
        Self::write_atomic(&dir.join(format!("{table}.index")), &Self::encode_index(index)?)?;
        Ok(())
    }

    pub fn write_manifest(dir: &Path, tables: &[String], gtid: &Gtid, timestamp: &str) -> MygramResult<()> {
        let manifest = Manifest {
            version: FORMAT_VERSION.to_string(),
            tables: tables.to_vec(),
            gtid: gtid.as_str().to_string(),
            timestamp: timestamp.to_string(),
        };
        let bytes = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| MygramError::internal(format!("manifest serialize failed: {e}")))?;
        Self::write_atomic(&dir.join("meta.json"), &bytes)
    }

    pub fn read_manifest(dir: &Path) -> MygramResult<Manifest> {
        let path = dir.join("meta.json");
        let bytes = fs::read(&path)
            .map_err(|e| MygramError::data_loss(format!("snapshot directory missing meta.json: {e}")))?;
        serde_json::from_slice(&bytes).map_err(|e| MygramError::data_loss(format!("manifest corrupt: {e}")))
    }

    /// Loads one table's index + document store back from disk, validating
    /// both files' trailing CRC32 first (spec §4.10, VERIFY).
    pub fn load_table(
        dir: &Path,
        table: &str,
        w_ascii: usize,
        w_cjk: usize,
        encoding: EncodingParams,
    ) -> MygramResult<(Index, DocumentStore)> {
        let docs_bytes = fs::read(dir.join(format!("{table}.docs")))?;
        let index_bytes = fs::read(dir.join(format!("{table}.index")))?;
        let store = Self::decode_docs(&docs_bytes)?;
        let ngrammer = Ngrammer::new(w_ascii, w_cjk, NormalizeOptions::default());
        let index = Self::decode_index(&index_bytes, ngrammer, encoding)?;
        Ok((index, store))
    }

    /// Verifies the trailing CRC32 of every file belonging to `table`
    /// without reconstructing the in-memory structures (spec §4.10, VERIFY).
    pub fn verify_table(dir: &Path, table: &str) -> MygramResult<()> {
        for ext in ["docs", "index"] {
            let bytes = fs::read(dir.join(format!("{table}.{ext}")))?;
            Self::check_crc(&bytes)?;
        }
        Ok(())
    }

    fn write_atomic(path: &Path, bytes: &[u8]) -> MygramResult<()> {
        let tmp = tmp_path(path);
        {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(bytes)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn encode_docs(store: &DocumentStore) -> MygramResult<Vec<u8>> {
        let domain_size = store.domain_size() as u32;
        let meta = DocRangeMeta { next_docid: domain_size, domain_size };
        let pks: Vec<Option<String>> = (0..domain_size).map(|d| store.get_pk(d).map(str::to_string)).collect();
        let filters: Vec<Option<FilterTuple>> = (0..domain_size).map(|d| store.get_filters(d).cloned()).collect();

        let mut buf = Vec::new();
        write_section(&mut buf, &bincode_ser(&meta)?)?;
        write_section(&mut buf, &bincode_ser(&pks)?)?;
        write_section(&mut buf, &bincode_ser(&filters)?)?;
        append_crc(&mut buf);
        Ok(buf)
    }

    fn decode_docs(bytes: &[u8]) -> MygramResult<DocumentStore> {
        let body = Self::check_crc(bytes)?;
        let (meta_bytes, cursor) = read_section(body)?;
        let meta: DocRangeMeta = bincode_de(meta_bytes)?;
        let (pk_bytes, cursor) = read_section(cursor)?;
        let pks: Vec<Option<String>> = bincode_de(pk_bytes)?;
        let (filter_bytes, _cursor) = read_section(cursor)?;
        let filters: Vec<Option<FilterTuple>> = bincode_de(filter_bytes)?;

        let mut store = DocumentStore::new();
        for (pk, tuple) in pks.into_iter().zip(filters.into_iter()) {
            match (pk, tuple) {
                (Some(pk), Some(tuple)) => {
                    store.add_document(pk, tuple)?;
                }
                _ => {
                    // Tombstoned slot: re-allocate and immediately remove so
                    // the docid sequence and next_docid line up exactly.
                    let placeholder = format!("\u{0}tombstone\u{0}{}", store.domain_size());
                    store.add_document(placeholder.clone(), FilterTuple::default())?;
                    store.remove_document(&placeholder);
                }
            }
        }
        if store.domain_size() != meta.domain_size as u64 {
            return Err(MygramError::data_loss("snapshot docid domain size mismatch"));
        }
        Ok(store)
    }

    fn encode_index(index: &Index) -> MygramResult<Vec<u8>> {
        let mut buf = Vec::new();
        let mut postings: Vec<(&str, &PostingList)> = index.iter_postings().collect();
        postings.sort_by_key(|(g, _)| *g);

        buf.write_u32::<LittleEndian>(postings.len() as u32)?;
        for (gram, list) in postings {
            let gram_bytes = gram.as_bytes();
            buf.write_u32::<LittleEndian>(gram_bytes.len() as u32)?;
            buf.write_all(gram_bytes)?;
            match list {
                PostingList::Sorted(ids) => {
                    buf.write_u8(SORTED_TAG)?;
                    let payload_len = 4 * ids.len() as u32;
                    buf.write_u32::<LittleEndian>(payload_len)?;
                    for id in ids {
                        buf.write_u32::<LittleEndian>(*id)?;
                    }
                }
                PostingList::Bitmap(bitmap) => {
                    buf.write_u8(BITMAP_TAG)?;
                    let mut payload = Vec::with_capacity(bitmap.serialized_size());
                    bitmap
                        .serialize_into(&mut payload)
                        .map_err(|e| MygramError::internal(format!("bitmap serialize failed: {e}")))?;
                    buf.write_u32::<LittleEndian>(payload.len() as u32)?;
                    buf.write_all(&payload)?;
                }
            }
        }
        append_crc(&mut buf);
        Ok(buf)
    }

    fn decode_index(bytes: &[u8], ngrammer: Ngrammer, encoding: EncodingParams) -> MygramResult<Index> {
        let body = Self::check_crc(bytes)?;
        let mut cursor = body;
        let count = cursor.read_u32::<LittleEndian>()?;
        let mut postings = HashMap::with_capacity(count as usize);
        for _ in 0..count {
            let gram_len = cursor.read_u32::<LittleEndian>()? as usize;
            let (gram_bytes, rest) = take(cursor, gram_len)?;
            cursor = rest;
            let gram = String::from_utf8(gram_bytes.to_vec())
                .map_err(|e| MygramError::data_loss(format!("non-utf8 ngram in snapshot: {e}")))?;
            let tag = cursor.read_u8()?;
            let payload_len = cursor.read_u32::<LittleEndian>()? as usize;
            let (payload, rest) = take(cursor, payload_len)?;
            cursor = rest;
            let list = match tag {
                SORTED_TAG => {
                    let mut ids = Vec::with_capacity(payload.len() / 4);
                    let mut p = payload;
                    while !p.is_empty() {
                        ids.push(p.read_u32::<LittleEndian>()?);
                    }
                    PostingList::Sorted(ids)
                }
                BITMAP_TAG => {
                    let bitmap = RoaringBitmap::deserialize_from(payload)
                        .map_err(|e| MygramError::data_loss(format!("bitmap corrupt: {e}")))?;
                    PostingList::Bitmap(bitmap)
                }
                other => return Err(MygramError::data_loss(format!("unknown posting-list tag {other}"))),
            };
            postings.insert(gram, list);
        }
        Ok(Index::from_parts(ngrammer, encoding, postings))
    }

    fn check_crc(bytes: &[u8]) -> MygramResult<&[u8]> {
        if bytes.len() < 4 {
            return Err(MygramError::data_loss("snapshot file too short for CRC trailer"));
        }
        let (body, trailer) = bytes.split_at(bytes.len() - 4);
        let expected = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let actual = crc32fast::hash(body);
        if expected != actual {
            return Err(MygramError::data_loss("snapshot CRC32 mismatch"));
        }
        Ok(body)
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().and_then(|n| n.to_str()).unwrap_or("snapshot").to_string();
    name.push_str(".tmp");
    path.with_file_name(name)
}

fn append_crc(buf: &mut Vec<u8>) {
    let crc = crc32fast::hash(buf);
    buf.extend_from_slice(&crc.to_le_bytes());
}

fn write_section(buf: &mut Vec<u8>, payload: &[u8]) -> MygramResult<()> {
    buf.write_u32::<LittleEndian>(payload.len() as u32)?;
    buf.write_all(payload)?;
    Ok(())
}

fn read_section(cursor: &[u8]) -> MygramResult<(&[u8], &[u8])> {
    let mut c = cursor;
    let len = c.read_u32::<LittleEndian>()? as usize;
    take(c, len)
}

fn take(bytes: &[u8], len: usize) -> MygramResult<(&[u8], &[u8])> {
    if bytes.len() < len {
        return Err(MygramError::data_loss("snapshot section truncated"));
    }
    Ok(bytes.split_at(len))
}

fn bincode_ser<T: Serialize>(value: &T) -> MygramResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| MygramError::internal(format!("snapshot encode failed: {e}")))
}

fn bincode_de<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> MygramResult<T> {
    bincode::deserialize(bytes).map_err(|e| MygramError::data_loss(format!("snapshot decode failed: {e}")))
}

#[cfg(test)]
mod test {
    use super::*;
    use common::types::FilterValue;
    use ngram::ast::{BooleanExpr, Term};

    fn encoding() -> EncodingParams {
        EncodingParams::default()
    }

    #[test]
    fn docs_round_trip_preserves_pk_and_filters() {
        let mut store = DocumentStore::new();
        store.add_document("pk1".to_string(), FilterTuple::new(vec![FilterValue::I64(7)])).unwrap();
        store.add_document("pk2".to_string(), FilterTuple::new(vec![FilterValue::I64(9)])).unwrap();
        store.remove_document("pk1");
        store.add_document("pk3".to_string(), FilterTuple::new(vec![FilterValue::Null])).unwrap();

        let bytes = SnapshotCodec::encode_docs(&store).unwrap();
        let restored = SnapshotCodec::decode_docs(&bytes).unwrap();

        assert_eq!(restored.domain_size(), store.domain_size());
        assert_eq!(restored.live_count(), 2);
        assert_eq!(restored.get_docid("pk2"), store.get_docid("pk2"));
        assert_eq!(restored.get_docid("pk3"), store.get_docid("pk3"));
        assert_eq!(restored.get_pk(0), None);
    }

    #[test]
    fn index_round_trip_preserves_postings_across_encodings() {
        let ngrammer = Ngrammer::new(2, 1, NormalizeOptions::default());
        let mut index = Index::new(ngrammer, encoding());
        for d in 0..40u32 {
            index.add(d, "hello world", 100);
        }
        index.add(40, "goodbye", 100);

        let bytes = SnapshotCodec::encode_index(&index).unwrap();
        let restored = SnapshotCodec::decode_index(&bytes, ngrammer, encoding()).unwrap();

        let expr = BooleanExpr::leaf(Term::Word("hello".to_string()));
        let mut got = restored.evaluate_all(&expr);
        got.sort();
        let mut want = index.evaluate_all(&expr);
        want.sort();
        assert_eq!(got, want);
        assert_eq!(restored.ngram_count(), index.ngram_count());
    }

    #[test]
    fn tampered_crc_is_rejected() {
        let store = DocumentStore::new();
        let mut bytes = SnapshotCodec::encode_docs(&store).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let err = SnapshotCodec::decode_docs(&bytes).unwrap_err();
        assert_eq!(err.kind(), "DataLoss");
    }

    #[test]
    fn save_and_load_table_round_trips_via_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let ngrammer = Ngrammer::new(2, 1, NormalizeOptions::default());
        let mut index = Index::new(ngrammer, encoding());
        index.add(0, "hello world", 1);
        let mut store = DocumentStore::new();
        store.add_document("pk1".to_string(), FilterTuple::new(vec![FilterValue::I64(1)])).unwrap();

        SnapshotCodec::save_table(dir.path(), "posts", &index, &store).unwrap();
        SnapshotCodec::verify_table(dir.path(), "posts").unwrap();
        let (loaded_index, loaded_store) = SnapshotCodec::load_table(dir.path(), "posts", 2, 1, encoding()).unwrap();

        assert_eq!(loaded_store.get_docid("pk1"), Some(0));
        let expr = BooleanExpr::leaf(Term::Word("hello".to_string()));
        assert_eq!(loaded_index.evaluate_all(&expr), vec![0]);
    }

    #[test]
    fn manifest_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let tables = vec!["posts".to_string(), "users".to_string()];
        SnapshotCodec::write_manifest(dir.path(), &tables, &Gtid::from("uuid:1-10"), "2026-01-01T00:00:00Z").unwrap();
        let manifest = SnapshotCodec::read_manifest(dir.path()).unwrap();
        assert_eq!(manifest.tables, tables);
        assert_eq!(manifest.gtid, "uuid:1-10");
        assert_eq!(manifest.version, "1.0");
    }
}
