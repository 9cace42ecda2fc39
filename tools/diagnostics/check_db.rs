//! Diagnostic tool: reports the tip, per-index entry counts, and a couple
//! of cross-index consistency spot checks against a data directory.
//!
//! Run against a live directory only when no `chainindex-follower` process
//! holds the writer lock — it opens the RocksDB handle itself and does not
//! coordinate with the lock file.

use std::path::PathBuf;
use std::sync::Arc;

use chainindex::kv::{Index, Kv, RocksKv, ScanRange};
use chainindex::key_codec::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let db_path = std::env::args().nth(1).ok_or("usage: check-db <db-path>")?;
    let kv = Arc::new(RocksKv::open(PathBuf::from(db_path))?);

    match kv.get(Index::Tip, tip_key()).await? {
        Some(bytes) => {
            let tip = decode_tip_value(&bytes)?;
            println!("tip: {} @ height {}", hex::encode(tip.block_id), tip.height);
        }
        None => println!("tip: none"),
    }

    for index in Index::ALL {
        let count = count_entries(&kv, index).await?;
        println!("{}: {} entries", index.cf_name(), count);
    }

    let missing_txos = check_spent_index_against_txo_index(&kv).await?;
    println!("SpentIndex entries whose prevTxo is absent from TxoIndex: {}", missing_txos);

    let orphan_scripts = check_script_index_against_txo_index(&kv).await?;
    println!("ScriptIndex entries with no matching TxoIndex entry: {}", orphan_scripts);

    Ok(())
}

async fn count_entries(kv: &RocksKv, index: Index) -> Result<usize, Box<dyn std::error::Error>> {
    let range = ScanRange { gte: vec![0u8], lt: vec![0xFFu8; 64], limit: usize::MAX };
    Ok(kv.iterate(index, range).await?.len())
}

/// Every SpentIndex row's `(prevTxId, vout)` key should resolve to a real
/// TxoIndex entry — a miss here means a spend was recorded against an
/// output the index never saw created.
async fn check_spent_index_against_txo_index(kv: &RocksKv) -> Result<usize, Box<dyn std::error::Error>> {
    let range = ScanRange { gte: vec![0u8], lt: vec![0xFFu8; 64], limit: usize::MAX };
    let rows = kv.iterate(Index::SpentIndex, range).await?;
    let mut missing = 0;
    for (key, _) in rows {
        if key.len() < 37 {
            continue;
        }
        let mut tx_id = [0u8; 32];
        tx_id.copy_from_slice(&key[1..33]);
        let vout = u32::from_be_bytes([key[33], key[34], key[35], key[36]]);
        if kv.get(Index::TxoIndex, txo_index_key(&tx_id, vout)).await?.is_none() {
            missing += 1;
        }
    }
    Ok(missing)
}

/// Every ScriptIndex row names a `(txId, vout)` pair that should also carry
/// a TxoIndex entry, since both are written in the same primary batch.
async fn check_script_index_against_txo_index(kv: &RocksKv) -> Result<usize, Box<dyn std::error::Error>> {
    let range = ScanRange { gte: vec![0u8], lt: vec![0xFFu8; 64], limit: usize::MAX };
    let rows = kv.iterate(Index::ScriptIndex, range).await?;
    let mut orphans = 0;
    for (key, _) in rows {
        let decoded = match decode_script_index_key(&key) {
            Ok(d) => d,
            Err(_) => continue,
        };
        if kv.get(Index::TxoIndex, txo_index_key(&decoded.tx_id, decoded.vout)).await?.is_none() {
            orphans += 1;
        }
    }
    Ok(orphans)
}
