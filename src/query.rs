//! The Query Layer (§4.4): read-only algorithms over the seven indexes,
//! plus the supplemented label operations (SPEC_FULL §3/§4.4).

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::error::IndexerError;
use crate::key_codec::*;
use crate::kv::{Index, Kv, ScanRange};
use crate::rpc::ChainRpc;

const DEFAULT_TXOS_LIMIT: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Txo {
    pub tx_id: TxId,
    pub vout: u32,
    pub sc_id: ScId,
    pub height: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct Position {
    pub height: u32,
    pub offset: usize,
}

/// `transactionIdsByScriptId`'s `limitSpec`: either a plain count or the
/// `(offset, end)` pager convention from §4.4 / §9.
#[derive(Debug, Clone, Copy)]
pub enum LimitSpec {
    Limit(usize),
    Range { offset: usize, end: usize },
}

#[derive(Debug, Clone)]
pub struct FeeRow {
    pub height: u32,
    pub fees: FeeSummary,
    pub size: u64,
}

pub struct Query<K, R> {
    kv: Arc<K>,
    rpc: Arc<R>,
}

impl<K, R> Query<K, R>
where
    K: Kv,
    R: ChainRpc,
{
    pub fn new(kv: Arc<K>, rpc: Arc<R>) -> Self {
        Self { kv, rpc }
    }

    pub async fn tip(&self) -> Result<Option<TipValue>, IndexerError> {
        match self.kv.get(Index::Tip, tip_key()).await? {
            Some(bytes) => Ok(Some(decode_tip_value(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn tip_height(&self) -> Result<Option<u32>, IndexerError> {
        Ok(self.tip().await?.map(|t| t.height))
    }

    pub async fn block_height_by_transaction_id(&self, tx_id: &TxId) -> Result<Option<u32>, IndexerError> {
        match self.kv.get(Index::TxIndex, tx_index_key(tx_id)).await? {
            Some(bytes) => Ok(Some(decode_tx_index_value(&bytes)?.height)),
            None => Ok(None),
        }
    }

    pub async fn block_id_by_transaction_id(&self, tx_id: &TxId) -> Result<Option<BlockId>, IndexerError> {
        match self.block_height_by_transaction_id(tx_id).await? {
            Some(height) => Ok(Some(self.rpc.block_id_at_height(height).await?)),
            None => Ok(None),
        }
    }

    pub async fn txo_by_txo(&self, tx_id: &TxId, vout: u32) -> Result<Option<TxoIndexValue>, IndexerError> {
        match self.kv.get(Index::TxoIndex, txo_index_key(tx_id, vout)).await? {
            Some(bytes) => Ok(Some(decode_txo_index_value(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn spent_from_txo(&self, tx_id: &TxId, vout: u32) -> Result<Option<SpentIndexValue>, IndexerError> {
        match self.kv.get(Index::SpentIndex, spent_index_key(tx_id, vout)).await? {
            Some(bytes) => Ok(Some(decode_spent_index_value(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn seen_script_id(&self, sc_id: &ScId) -> Result<bool, IndexerError> {
        let range = ScanRange {
            gte: script_index_lower_bound(sc_id, 0),
            lt: script_index_upper_bound_exclusive(sc_id),
            limit: 1,
        };
        Ok(!self.kv.iterate(Index::ScriptIndex, range).await?.is_empty())
    }

    /// `txosByScriptId(scId, fromHeight, limit)`: forward scan deduped by
    /// (txId, vout) — the same output can surface at one key but overlapping
    /// queries can still revisit it.
    pub async fn txos_by_script_id(
        &self,
        sc_id: &ScId,
        from_height: u32,
        limit: Option<usize>,
    ) -> Result<BTreeMap<String, Txo>, IndexerError> {
        let rows = self.scan_script_index(sc_id, from_height, limit.unwrap_or(DEFAULT_TXOS_LIMIT)).await?;
        let mut out = BTreeMap::new();
        for (key, _) in rows {
            let decoded = decode_script_index_key(&key)?;
            let dedup_key = format!("{}:{}", hex::encode(decoded.tx_id), decoded.vout);
            out.entry(dedup_key).or_insert(Txo {
                tx_id: decoded.tx_id,
                vout: decoded.vout,
                sc_id: decoded.sc_id,
                height: decoded.height,
            });
        }
        Ok(out)
    }

    /// `transactionIdsByScriptId(scId, fromHeight, limitSpec)`: enumerate
    /// ScriptIndex entries via `__txosListByScriptId`, honoring the
    /// `(offset, end)` pager, then join each txo against SpentIndex to fold
    /// in the spending tx. Returns `{producing txIds} ∪ {spending txIds}`
    /// and a `Position` enabling paged continuation.
    pub async fn transaction_ids_by_script_id(
        &self,
        sc_id: &ScId,
        from_height: u32,
        limit_spec: LimitSpec,
    ) -> Result<(HashSet<TxId>, Position), IndexerError> {
        let (offset, end) = match limit_spec {
            LimitSpec::Limit(n) => (0, n),
            LimitSpec::Range { offset, end } => (offset, end),
        };

        let rows = self.txos_list_by_script_id(sc_id, from_height, end).await?;

        let mut tx_ids = HashSet::new();
        let mut max_height = from_height;
        let mut walked = 0usize;

        for (idx, (key, _)) in rows.iter().enumerate() {
            walked = idx + 1;
            // The O(offset) walk is preserved bug-for-bug per §9's design
            // note: every row up to `offset` is still fetched and decoded,
            // just not folded into the result.
            if idx < offset {
                continue;
            }
            let decoded = decode_script_index_key(key)?;
            max_height = max_height.max(decoded.height);
            tx_ids.insert(decoded.tx_id);
            if let Some(spent) = self.spent_from_txo(&decoded.tx_id, decoded.vout).await? {
                tx_ids.insert(spent.tx_id);
            }
        }

        Ok((tx_ids, Position { height: max_height, offset: walked }))
    }

    /// `__txosListByScriptId`: the raw ScriptIndex enumeration the pager is
    /// built on top of, exposed for callers that want the unjoined rows.
    async fn txos_list_by_script_id(
        &self,
        sc_id: &ScId,
        from_height: u32,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, IndexerError> {
        self.scan_script_index(sc_id, from_height, limit).await
    }

    async fn scan_script_index(
        &self,
        sc_id: &ScId,
        from_height: u32,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, IndexerError> {
        let range = ScanRange {
            gte: script_index_lower_bound(sc_id, from_height),
            lt: script_index_upper_bound_exclusive(sc_id),
            limit,
        };
        self.kv.iterate(Index::ScriptIndex, range).await
    }

    /// `fees(n)`: read Tip, then the last `n` FeeIndex rows ending at the
    /// tip height.
    pub async fn fees(&self, n: usize) -> Result<Vec<FeeRow>, IndexerError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let max_height = match self.tip().await? {
            Some(tip) => tip.height,
            None => return Ok(Vec::new()),
        };
        let from_height = max_height.saturating_sub(n as u32 - 1);
        let range = ScanRange {
            gte: fee_index_key(from_height),
            lt: fee_index_key(max_height.saturating_add(1)),
            limit: n,
        };
        let rows = self.kv.iterate(Index::FeeIndex, range).await?;
        rows.into_iter()
            .map(|(key, value)| {
                let height = decode_fee_index_key(&key)?;
                let v = decode_fee_index_value(&value)?;
                Ok(FeeRow { height, fees: v.fees, size: v.size })
            })
            .collect()
    }

    /// **[SUPPLEMENT]** `labelScript(scId, label)`: create a label. Not
    /// tied to CONNECT/DISCONNECT (§3).
    pub async fn label_script(&self, sc_id: &ScId, label: &[u8]) -> Result<(), IndexerError> {
        let mut batch = self.kv.atomic();
        batch.put(Index::LabelIndex, label_index_key(sc_id, label), Vec::new());
        batch.commit().await
    }

    /// **[SUPPLEMENT]** `listLabels(scId) -> Vec<label bytes>`.
    pub async fn list_labels(&self, sc_id: &ScId) -> Result<Vec<Vec<u8>>, IndexerError> {
        let prefix = label_index_prefix(sc_id);
        let upper = prefix_upper_bound(&prefix);
        let range = ScanRange { gte: prefix.clone(), lt: upper, limit: usize::MAX };
        let rows = self.kv.iterate(Index::LabelIndex, range).await?;
        rows.into_iter().map(|(key, _)| decode_label_from_key(sc_id, &key)).collect()
    }

    /// **[SUPPLEMENT]** `unlabelScript(scId, label)`.
    pub async fn unlabel_script(&self, sc_id: &ScId, label: &[u8]) -> Result<(), IndexerError> {
        let mut batch = self.kv.atomic();
        batch.del(Index::LabelIndex, label_index_key(sc_id, label));
        batch.commit().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::RocksKv;
    use crate::rpc::mock::MockChainRpc;
    use tempfile::TempDir;

    fn open_test_query() -> (Query<RocksKv, MockChainRpc>, TempDir) {
        let dir = TempDir::new().unwrap();
        let kv = Arc::new(RocksKv::open(dir.path()).unwrap());
        let rpc = Arc::new(MockChainRpc::builder().build());
        (Query::new(kv, rpc), dir)
    }

    #[tokio::test]
    async fn tip_is_absent_before_any_connect() {
        let (q, _dir) = open_test_query();
        assert!(q.tip().await.unwrap().is_none());
        assert!(q.tip_height().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fees_returns_empty_before_any_tip() {
        let (q, _dir) = open_test_query();
        assert!(q.fees(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn label_round_trips_through_list_and_unlabel() {
        let (q, _dir) = open_test_query();
        let sc_id = [3u8; 32];
        q.label_script(&sc_id, b"savings").await.unwrap();
        q.label_script(&sc_id, b"cold").await.unwrap();

        let mut labels = q.list_labels(&sc_id).await.unwrap();
        labels.sort();
        assert_eq!(labels, vec![b"cold".to_vec(), b"savings".to_vec()]);

        q.unlabel_script(&sc_id, b"cold").await.unwrap();
        let labels = q.list_labels(&sc_id).await.unwrap();
        assert_eq!(labels, vec![b"savings".to_vec()]);
    }

    #[tokio::test]
    async fn labels_on_one_scid_do_not_leak_into_another() {
        let (q, _dir) = open_test_query();
        q.label_script(&[1u8; 32], b"a").await.unwrap();
        q.label_script(&[2u8; 32], b"b").await.unwrap();
        assert_eq!(q.list_labels(&[1u8; 32]).await.unwrap(), vec![b"a".to_vec()]);
        assert_eq!(q.list_labels(&[2u8; 32]).await.unwrap(), vec![b"b".to_vec()]);
    }
}
