//! Single-publisher, multi-subscriber event sink (§4.5).
//!
//! Modeled on `websocket.rs`'s `EventBroadcaster`: one `tokio::sync::
//! broadcast` channel per event kind, fire-and-forget sends so a lagging
//! subscriber just drops old events instead of back-pressuring the
//! indexer. The piece `EventBroadcaster` didn't need is the deferral
//! contract from §4.3.1/§9: emission must happen strictly after the
//! CONNECT completion callback returns, never inline with the commit. A
//! bounded `mpsc` queue plus one background task draining it gives every
//! `connect()` call a place to drop its event batch without waiting for
//! subscribers, and guarantees per-block ordering since the queue is FIFO.

use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use crate::key_codec::{BlockId, ScId, TxId};
use crate::metrics;

const BROADCAST_CAPACITY: usize = 1024;
const QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct SpentEvent {
    pub prev_tx_id: TxId,
    pub vout: u32,
    pub tx_id: TxId,
    pub vin: u32,
}

#[derive(Debug, Clone)]
pub struct ScriptEvent {
    pub sc_id: ScId,
    pub tx_id: TxId,
    pub tx_buffer: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct TransactionEvent {
    pub tx_id: TxId,
    pub tx_buffer: Vec<u8>,
    pub block_id: BlockId,
}

#[derive(Debug, Clone)]
pub struct BlockEvent {
    pub block_id: BlockId,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub enum Event {
    Spent(SpentEvent),
    Script(ScriptEvent),
    Transaction(TransactionEvent),
    Block(BlockEvent),
}

#[derive(Clone)]
pub struct EventBus {
    spent_tx: broadcast::Sender<SpentEvent>,
    script_tx: broadcast::Sender<ScriptEvent>,
    transaction_tx: broadcast::Sender<TransactionEvent>,
    block_tx: broadcast::Sender<BlockEvent>,
    queue_tx: mpsc::Sender<Vec<Event>>,
}

impl EventBus {
    /// Builds the bus and spawns the single background task that drains the
    /// queue. Must be called from within a tokio runtime.
    pub fn new() -> Self {
        let (spent_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (script_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (transaction_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (block_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (queue_tx, mut queue_rx) = mpsc::channel::<Vec<Event>>(QUEUE_CAPACITY);

        let spent_out = spent_tx.clone();
        let script_out = script_tx.clone();
        let transaction_out = transaction_tx.clone();
        let block_out = block_tx.clone();
        tokio::spawn(async move {
            while let Some(batch) = queue_rx.recv().await {
                for event in batch {
                    match event {
                        Event::Spent(e) => {
                            let _ = spent_out.send(e);
                        }
                        Event::Script(e) => {
                            let _ = script_out.send(e);
                        }
                        Event::Transaction(e) => {
                            let _ = transaction_out.send(e);
                        }
                        Event::Block(e) => {
                            let _ = block_out.send(e);
                        }
                    }
                }
            }
        });

        Self { spent_tx, script_tx, transaction_tx, block_tx, queue_tx }
    }

    pub fn subscribe_spent(&self) -> broadcast::Receiver<SpentEvent> {
        self.spent_tx.subscribe()
    }

    pub fn subscribe_script(&self) -> broadcast::Receiver<ScriptEvent> {
        self.script_tx.subscribe()
    }

    pub fn subscribe_transaction(&self) -> broadcast::Receiver<TransactionEvent> {
        self.transaction_tx.subscribe()
    }

    pub fn subscribe_block(&self) -> broadcast::Receiver<BlockEvent> {
        self.block_tx.subscribe()
    }

    /// Queue one CONNECT's worth of events for deferred emission. Never
    /// called synchronously from within the primary or fee batch commit —
    /// only after both have succeeded.
    pub fn queue(&self, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        match self.queue_tx.try_send(events) {
            Ok(()) => metrics::set_event_queue_depth((QUEUE_CAPACITY - self.queue_tx.capacity()) as i64),
            Err(e) => warn!(error = %e, "event queue full, dropping a block's worth of events"),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
