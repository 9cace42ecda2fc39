//! Domain types handed across the Indexer Core / Chain RPC boundary.
//!
//! These are already-parsed structures — the core performs no wire
//! decoding of raw transactions; that is the RPC collaborator's job.

use crate::key_codec::{BlockId, ScId, TxId};

#[derive(Debug, Clone)]
pub struct TxInput {
    pub coinbase: bool,
    /// Absent iff `coinbase` is true.
    pub prev_tx_id: Option<TxId>,
    pub vout: u32,
}

#[derive(Debug, Clone)]
pub struct TxOutput {
    pub sc_id: ScId,
    pub script: Vec<u8>,
    pub value: u64,
    pub vout: u32,
}

#[derive(Debug, Clone)]
pub struct Transaction {
    pub tx_id: TxId,
    /// Opaque serialized transaction handed to event subscribers verbatim.
    pub tx_buffer: Vec<u8>,
    pub vsize: u64,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    pub fn is_coinbase(&self) -> bool {
        self.inputs.iter().all(|i| i.coinbase)
    }
}

#[derive(Debug, Clone)]
pub struct BlockBody {
    pub block_id: BlockId,
    pub height: u32,
    pub size: u64,
    pub previous_block_hash: Option<BlockId>,
    pub next_block_hash: Option<BlockId>,
    pub transactions: Vec<Transaction>,
}
