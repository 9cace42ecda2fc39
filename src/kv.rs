//! The narrow KV façade the Indexer Core and Query Layer are built against.
//!
//! `RocksKv` is the reference implementation: one column family per index,
//! an atomic multi-key batch modeled on the collaborator's own
//! `AtomicBatchWriter` (accumulate puts/deletes, commit as a single
//! `WriteBatch` inside `spawn_blocking`), and bounded forward range scans.

use std::sync::Arc;

use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};

use crate::error::IndexerError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Index {
    Tip,
    TxIndex,
    TxoIndex,
    SpentIndex,
    ScriptIndex,
    FeeIndex,
    LabelIndex,
}

impl Index {
    pub const ALL: [Index; 7] = [
        Index::Tip,
        Index::TxIndex,
        Index::TxoIndex,
        Index::SpentIndex,
        Index::ScriptIndex,
        Index::FeeIndex,
        Index::LabelIndex,
    ];

    pub fn cf_name(&self) -> &'static str {
        match self {
            Index::Tip => "tip",
            Index::TxIndex => "tx_index",
            Index::TxoIndex => "txo_index",
            Index::SpentIndex => "spent_index",
            Index::ScriptIndex => "script_index",
            Index::FeeIndex => "fee_index",
            Index::LabelIndex => "label_index",
        }
    }
}

/// Bounds for a forward range scan: `[gte, lt)`, at most `limit` entries.
pub struct ScanRange {
    pub gte: Vec<u8>,
    pub lt: Vec<u8>,
    pub limit: usize,
}

/// A batch of puts/deletes committed all-or-nothing.
pub struct Batch {
    db: Arc<DB>,
    ops: Vec<Op>,
}

enum Op {
    Put { index: Index, key: Vec<u8>, value: Vec<u8> },
    Delete { index: Index, key: Vec<u8> },
}

impl Batch {
    fn new(db: Arc<DB>) -> Self {
        Self { db, ops: Vec::new() }
    }

    pub fn put(&mut self, index: Index, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(Op::Put { index, key, value });
    }

    pub fn del(&mut self, index: Index, key: Vec<u8>) {
        self.ops.push(Op::Delete { index, key });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Commit every accumulated operation in one atomic RocksDB write.
    pub async fn commit(self) -> Result<(), IndexerError> {
        if self.ops.is_empty() {
            return Ok(());
        }
        let db = self.db;
        let ops = self.ops;
        tokio::task::spawn_blocking(move || {
            let mut batch = WriteBatch::default();
            for op in &ops {
                match op {
                    Op::Put { index, key, value } => {
                        let cf = db
                            .cf_handle(index.cf_name())
                            .ok_or_else(|| IndexerError::kv("commit", format!("missing cf {}", index.cf_name())))?;
                        batch.put_cf(&cf, key, value);
                    }
                    Op::Delete { index, key } => {
                        let cf = db
                            .cf_handle(index.cf_name())
                            .ok_or_else(|| IndexerError::kv("commit", format!("missing cf {}", index.cf_name())))?;
                        batch.delete_cf(&cf, key);
                    }
                }
            }
            db.write(batch).map_err(IndexerError::from)
        })
        .await
        .map_err(|e| IndexerError::kv("commit", e.to_string()))?
    }
}

#[async_trait]
pub trait Kv: Send + Sync {
    async fn get(&self, index: Index, key: Vec<u8>) -> Result<Option<Vec<u8>>, IndexerError>;
    fn atomic(&self) -> Batch;
    async fn iterate(&self, index: Index, range: ScanRange) -> Result<Vec<(Vec<u8>, Vec<u8>)>, IndexerError>;
}

pub struct RocksKv {
    db: Arc<DB>,
}

impl RocksKv {
    /// Open (or create) the database directory with one column family per
    /// index, mirroring the collaborator's `ColumnFamilyDescriptor`/
    /// `DB::open_cf_descriptors` setup.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, IndexerError> {
        let mut db_options = Options::default();
        db_options.create_if_missing(true);
        db_options.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = Index::ALL
            .iter()
            .map(|idx| ColumnFamilyDescriptor::new(idx.cf_name(), Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_options, path, cf_descriptors)?;
        Ok(Self { db: Arc::new(db) })
    }
}

#[async_trait]
impl Kv for RocksKv {
    async fn get(&self, index: Index, key: Vec<u8>) -> Result<Option<Vec<u8>>, IndexerError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let cf = db
                .cf_handle(index.cf_name())
                .ok_or_else(|| IndexerError::kv("get", format!("missing cf {}", index.cf_name())))?;
            db.get_cf(&cf, key).map_err(IndexerError::from)
        })
        .await
        .map_err(|e| IndexerError::kv("get", e.to_string()))?
    }

    fn atomic(&self) -> Batch {
        Batch::new(self.db.clone())
    }

    async fn iterate(&self, index: Index, range: ScanRange) -> Result<Vec<(Vec<u8>, Vec<u8>)>, IndexerError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let cf = db
                .cf_handle(index.cf_name())
                .ok_or_else(|| IndexerError::kv("iterate", format!("missing cf {}", index.cf_name())))?;
            let iter = db.iterator_cf(&cf, IteratorMode::From(&range.gte, rocksdb::Direction::Forward));
            let mut out = Vec::new();
            for item in iter {
                let (key, value) = item.map_err(IndexerError::from)?;
                if key.as_ref() >= range.lt.as_slice() {
                    break;
                }
                out.push((key.to_vec(), value.to_vec()));
                if out.len() >= range.limit {
                    break;
                }
            }
            Ok(out)
        })
        .await
        .map_err(|e| IndexerError::kv("iterate", e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_test_kv() -> (RocksKv, TempDir) {
        let dir = TempDir::new().unwrap();
        let kv = RocksKv::open(dir.path()).unwrap();
        (kv, dir)
    }

    #[tokio::test]
    async fn batch_commit_is_visible_after_commit() {
        let (kv, _dir) = open_test_kv();
        let mut batch = kv.atomic();
        batch.put(Index::TxIndex, b"k1".to_vec(), b"v1".to_vec());
        batch.commit().await.unwrap();

        let got = kv.get(Index::TxIndex, b"k1".to_vec()).await.unwrap();
        assert_eq!(got, Some(b"v1".to_vec()));
    }

    #[tokio::test]
    async fn delete_removes_key() {
        let (kv, _dir) = open_test_kv();
        let mut batch = kv.atomic();
        batch.put(Index::TxoIndex, b"k".to_vec(), b"v".to_vec());
        batch.commit().await.unwrap();

        let mut batch = kv.atomic();
        batch.del(Index::TxoIndex, b"k".to_vec());
        batch.commit().await.unwrap();

        assert!(kv.get(Index::TxoIndex, b"k".to_vec()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn iterate_respects_bounds_and_limit() {
        let (kv, _dir) = open_test_kv();
        let mut batch = kv.atomic();
        for i in 0u8..5 {
            batch.put(Index::ScriptIndex, vec![i], vec![i]);
        }
        batch.commit().await.unwrap();

        let range = ScanRange { gte: vec![1], lt: vec![4], limit: 10 };
        let got = kv.iterate(Index::ScriptIndex, range).await.unwrap();
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].0, vec![1]);
        assert_eq!(got[2].0, vec![3]);

        let range = ScanRange { gte: vec![0], lt: vec![5], limit: 2 };
        let got = kv.iterate(Index::ScriptIndex, range).await.unwrap();
        assert_eq!(got.len(), 2);
    }

    #[tokio::test]
    async fn empty_batch_commit_is_a_noop() {
        let (kv, _dir) = open_test_kv();
        let batch = kv.atomic();
        assert!(batch.is_empty());
        batch.commit().await.unwrap();
    }
}
