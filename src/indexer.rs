//! The Indexer Core (§4.3): CONNECT and DISCONNECT against the KV
//! Abstraction, the two-phase CONNECT batch, and the event-emission
//! contract.
//!
//! Grounded on `atomic_writer.rs`'s batch discipline and `reorg.rs`'s
//! per-transaction disconnect loop, restructured as a direct re-fetch of
//! the block body (spec's DISCONNECT re-fetches rather than replaying a
//! stored undo log).

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, instrument};

use crate::error::IndexerError;
use crate::events::{BlockEvent, Event, EventBus, ScriptEvent, SpentEvent, TransactionEvent};
use crate::key_codec::*;
use crate::kv::{Index, Kv};
use crate::metrics;
use crate::rpc::ChainRpc;
use crate::telemetry::truncate_hex;
use crate::types::BlockBody;

pub struct Indexer<K, R> {
    kv: Arc<K>,
    rpc: Arc<R>,
    events: EventBus,
}

impl<K, R> Indexer<K, R>
where
    K: Kv + 'static,
    R: ChainRpc + 'static,
{
    pub fn new(kv: Arc<K>, rpc: Arc<R>, events: EventBus) -> Self {
        Self { kv, rpc, events }
    }

    /// CONNECT(blockId, expectedHeight) → nextBlockHash (§4.3.1).
    ///
    /// Returns `None` when the RPC collaborator reports no `nextblockhash`,
    /// i.e. the connected block is the current chain tip. This is the
    /// steady-state case once the indexer has caught up, not an edge case,
    /// so it must be distinguishable from an actual next block to connect —
    /// a follower must not be handed `block_id` back as if it were the next
    /// block.
    #[instrument(skip(self), fields(block_id = %truncate_hex(&hex::encode(block_id), 16)))]
    pub async fn connect(&self, block_id: BlockId, expected_height: u32) -> Result<Option<BlockId>, IndexerError> {
        let start = Instant::now();

        let block = self.rpc.block(&block_id).await.map_err(|e| {
            error!(height = expected_height, error = %e, "rpc fetch failed during connect");
            e
        })?;
        if block.height != expected_height {
            let err = IndexerError::HeightMismatch { expected: expected_height, actual: block.height };
            error!(expected = expected_height, actual = block.height, "height mismatch during connect");
            return Err(err);
        }

        let mut batch = self.kv.atomic();
        let mut queued_events = Vec::new();

        for tx in &block.transactions {
            for (vin, input) in tx.inputs.iter().enumerate() {
                if input.coinbase {
                    continue;
                }
                let prev_tx_id = input
                    .prev_tx_id
                    .expect("non-coinbase input always carries a prevTxId");
                batch.put(
                    Index::SpentIndex,
                    spent_index_key(&prev_tx_id, input.vout),
                    encode_spent_index_value(&SpentIndexValue { tx_id: tx.tx_id, vin: vin as u32 }),
                );
                queued_events.push(Event::Spent(SpentEvent {
                    prev_tx_id,
                    vout: input.vout,
                    tx_id: tx.tx_id,
                    vin: vin as u32,
                }));
            }

            for output in &tx.outputs {
                batch.put(
                    Index::ScriptIndex,
                    script_index_key(&output.sc_id, block.height, &tx.tx_id, output.vout),
                    Vec::new(),
                );
                batch.put(
                    Index::TxoIndex,
                    txo_index_key(&tx.tx_id, output.vout),
                    encode_txo_index_value(&TxoIndexValue { value: output.value, script: output.script.clone() }),
                );
                queued_events.push(Event::Script(ScriptEvent {
                    sc_id: output.sc_id,
                    tx_id: tx.tx_id,
                    tx_buffer: tx.tx_buffer.clone(),
                }));
            }

            batch.put(
                Index::TxIndex,
                tx_index_key(&tx.tx_id),
                encode_tx_index_value(&TxIndexValue { height: block.height }),
            );
            queued_events.push(Event::Transaction(TransactionEvent {
                tx_id: tx.tx_id,
                tx_buffer: tx.tx_buffer.clone(),
                block_id,
            }));
        }

        queued_events.push(Event::Block(BlockEvent { block_id, height: block.height }));
        batch.put(Index::Tip, tip_key(), encode_tip_value(&TipValue { block_id, height: block.height }));

        let commit_start = Instant::now();
        batch.commit().await.map_err(|e| {
            error!(height = block.height, error = %e, "primary batch commit failed, no events emitted");
            e
        })?;
        metrics::observe_primary_commit_latency(commit_start.elapsed().as_secs_f64());
        metrics::record_block_connected();

        let fee_start = Instant::now();
        if let Err(e) = self.fee_pass(&block).await {
            if matches!(e, IndexerError::MissingTxo { .. }) {
                metrics::record_fee_pass_missing_txo();
            }
            error!(
                height = block.height,
                error = %e,
                "fee pass failed after primary batch committed; operator intervention required"
            );
            return Err(e);
        }
        metrics::observe_fee_commit_latency(fee_start.elapsed().as_secs_f64());

        let next_block_hash = block.next_block_hash;

        // Deferred past this point: the caller gets `next_block_hash` back
        // before any subscriber observes an event, per §4.3.1 step 8.
        self.events.queue(queued_events);
        metrics::set_tip_height(block.height as i64);

        info!(
            height = block.height,
            tx_count = block.transactions.len(),
            elapsed_ms = start.elapsed().as_millis(),
            at_tip = next_block_hash.is_none(),
            "connected block"
        );
        Ok(next_block_hash)
    }

    /// DISCONNECT(blockId) (§4.3.2). No events, no fee-summary touch (§9).
    #[instrument(skip(self), fields(block_id = %truncate_hex(&hex::encode(block_id), 16)))]
    pub async fn disconnect(&self, block_id: BlockId) -> Result<(), IndexerError> {
        let start = Instant::now();
        let block = self.rpc.block(&block_id).await.map_err(|e| {
            error!(error = %e, "rpc fetch failed during disconnect");
            e
        })?;

        let mut batch = self.kv.atomic();
        for tx in &block.transactions {
            for input in &tx.inputs {
                if input.coinbase {
                    continue;
                }
                let prev_tx_id = input
                    .prev_tx_id
                    .expect("non-coinbase input always carries a prevTxId");
                batch.del(Index::SpentIndex, spent_index_key(&prev_tx_id, input.vout));
            }
            for output in &tx.outputs {
                // txId here is the enclosing transaction's, correct by
                // construction since each output belongs to the tx it is
                // iterated under (§9 open question #2).
                batch.del(Index::ScriptIndex, script_index_key(&output.sc_id, block.height, &tx.tx_id, output.vout));
                batch.del(Index::TxoIndex, txo_index_key(&tx.tx_id, output.vout));
            }
            batch.del(Index::TxIndex, tx_index_key(&tx.tx_id));
        }

        let prev_height = block.height.saturating_sub(1);
        let prev_block_id = block.previous_block_hash.unwrap_or([0u8; 32]);
        batch.put(Index::Tip, tip_key(), encode_tip_value(&TipValue { block_id: prev_block_id, height: prev_height }));

        batch.commit().await.map_err(|e| {
            error!(height = block.height, error = %e, "disconnect batch commit failed");
            e
        })?;
        metrics::record_block_disconnected();
        metrics::set_tip_height(prev_height as i64);

        info!(height = block.height, elapsed_ms = start.elapsed().as_millis(), "disconnected block");
        Ok(())
    }

    /// The 2nd-order fee pass (§4.3.3): resolve every non-coinbase input's
    /// TXO, compute fee/vsize per transaction, then the box summary over
    /// the whole block. Per-transaction TXO lookups run concurrently; the
    /// sort and box-summary pick stay a single deterministic sequential
    /// step over the complete sample.
    async fn fee_pass(&self, block: &BlockBody) -> Result<(), IndexerError> {
        let mut fee_rates: Vec<i64> = Vec::with_capacity(block.transactions.len());

        for tx in &block.transactions {
            if tx.is_coinbase() {
                fee_rates.push(0);
                continue;
            }

            let mut handles = Vec::new();
            for input in &tx.inputs {
                if input.coinbase {
                    continue;
                }
                let prev_tx_id = input
                    .prev_tx_id
                    .expect("non-coinbase input always carries a prevTxId");
                let vout = input.vout;
                let kv = self.kv.clone();
                handles.push(tokio::spawn(async move {
                    let key = txo_index_key(&prev_tx_id, vout);
                    match kv.get(Index::TxoIndex, key).await? {
                        Some(bytes) => decode_txo_index_value(&bytes),
                        None => Err(IndexerError::MissingTxo { txid: prev_tx_id, vout }),
                    }
                }));
            }

            let mut in_accum: u64 = 0;
            for handle in handles {
                let txo = handle
                    .await
                    .map_err(|e| IndexerError::kv("fee_pass_join", e.to_string()))??;
                in_accum += txo.value;
            }
            let out_accum: u64 = tx.outputs.iter().map(|o| o.value).sum();

            let fee = in_accum as i64 - out_accum as i64;
            let vsize = tx.vsize.max(1) as i64;
            fee_rates.push(fee.div_euclid(vsize));
        }

        fee_rates.sort_unstable();
        let summary = box_summary(&fee_rates);

        let mut fee_batch = self.kv.atomic();
        fee_batch.put(
            Index::FeeIndex,
            fee_index_key(block.height),
            encode_fee_index_value(&FeeIndexValue { fees: summary, size: block.size }),
        );
        fee_batch.commit().await
    }
}

/// Box summary over an ascending sample (§4.3.3, §8): q1 = sample[⌊n/4⌋],
/// median = sample[⌊n/2⌋], q3 = sample[⌊n/2⌋ + ⌊n/4⌋]. All zero for n = 0.
fn box_summary(sorted_ascending: &[i64]) -> FeeSummary {
    let n = sorted_ascending.len();
    if n == 0 {
        return FeeSummary { q1: 0, median: 0, q3: 0 };
    }
    let q = n / 4;
    let m = n / 2;
    FeeSummary { q1: sorted_ascending[q], median: sorted_ascending[m], q3: sorted_ascending[m + q] }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_summary_n0_is_all_zero() {
        assert_eq!(box_summary(&[]), FeeSummary { q1: 0, median: 0, q3: 0 });
    }

    #[test]
    fn box_summary_n1_is_the_single_sample() {
        assert_eq!(box_summary(&[7]), FeeSummary { q1: 7, median: 7, q3: 7 });
    }

    #[test]
    fn box_summary_n4_picks_by_index_formula() {
        // q = n/4 = 1, m = n/2 = 2, m + q = 3 on [a=1,b=2,c=3,d=4]:
        // q1 = sample[1] = b, median = sample[2] = c, q3 = sample[3] = d.
        let s = box_summary(&[1, 2, 3, 4]);
        assert_eq!(s, FeeSummary { q1: 2, median: 3, q3: 4 });
    }

    #[test]
    fn fee_rate_floors_toward_negative_infinity() {
        let fee: i64 = -1;
        let vsize: i64 = 250;
        assert_eq!(fee.div_euclid(vsize), -1);
    }
}
