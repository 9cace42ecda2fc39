//! End-to-end scenarios driving `Indexer`/`Query` against a real `RocksKv`
//! over a temp directory and a canned `MockChainRpc`.

use std::sync::Arc;

use chainindex::events::EventBus;
use chainindex::indexer::Indexer;
use chainindex::kv::RocksKv;
use chainindex::query::{LimitSpec, Query};
use chainindex::rpc::mock::MockChainRpc;
use chainindex::types::{BlockBody, Transaction, TxInput, TxOutput};
use tempfile::TempDir;

fn coinbase_tx(tx_id: [u8; 32], sc_id: [u8; 32], value: u64) -> Transaction {
    Transaction {
        tx_id,
        tx_buffer: vec![0xde, 0xad],
        vsize: 200,
        inputs: vec![TxInput { coinbase: true, prev_tx_id: None, vout: 0 }],
        outputs: vec![TxOutput { sc_id, script: vec![0x76, 0xa9], value, vout: 0 }],
    }
}

fn spending_tx(tx_id: [u8; 32], prev_tx_id: [u8; 32], prev_vout: u32, sc_id: [u8; 32], value: u64) -> Transaction {
    Transaction {
        tx_id,
        tx_buffer: vec![0xbe, 0xef],
        vsize: 250,
        inputs: vec![TxInput { coinbase: false, prev_tx_id: Some(prev_tx_id), vout: prev_vout }],
        outputs: vec![TxOutput { sc_id, script: vec![0x76, 0xa9], value, vout: 0 }],
    }
}

#[tokio::test]
async fn connecting_an_empty_block_advances_the_tip_only() {
    let dir = TempDir::new().unwrap();
    let kv = Arc::new(RocksKv::open(dir.path()).unwrap());

    let block = BlockBody {
        block_id: [1u8; 32],
        height: 0,
        size: 0,
        previous_block_hash: None,
        next_block_hash: Some([2u8; 32]),
        transactions: Vec::new(),
    };
    let rpc = Arc::new(MockChainRpc::builder().with_block(block).build());

    let indexer = Indexer::new(kv.clone(), rpc.clone(), EventBus::new());
    let query = Query::new(kv, rpc);

    let next = indexer.connect([1u8; 32], 0).await.unwrap();
    assert_eq!(next, Some([2u8; 32]));

    let tip = query.tip().await.unwrap().unwrap();
    assert_eq!(tip.block_id, [1u8; 32]);
    assert_eq!(tip.height, 0);

    let fees = query.fees(1).await.unwrap();
    assert_eq!(fees.len(), 1);
    assert_eq!(fees[0].fees.q1, 0);
    assert_eq!(fees[0].fees.median, 0);
    assert_eq!(fees[0].fees.q3, 0);
}

#[tokio::test]
async fn coinbase_only_block_indexes_the_output_with_zero_fee() {
    let dir = TempDir::new().unwrap();
    let kv = Arc::new(RocksKv::open(dir.path()).unwrap());

    let sc_id = [9u8; 32];
    let tx_id = [10u8; 32];
    let block = BlockBody {
        block_id: [1u8; 32],
        height: 0,
        size: 300,
        previous_block_hash: None,
        next_block_hash: Some([2u8; 32]),
        transactions: vec![coinbase_tx(tx_id, sc_id, 5_000_000_000)],
    };
    let rpc = Arc::new(MockChainRpc::builder().with_block(block).build());

    let indexer = Indexer::new(kv.clone(), rpc.clone(), EventBus::new());
    let query = Query::new(kv, rpc);

    indexer.connect([1u8; 32], 0).await.unwrap();

    let txo = query.txo_by_txo(&tx_id, 0).await.unwrap().unwrap();
    assert_eq!(txo.value, 5_000_000_000);

    assert!(query.seen_script_id(&sc_id).await.unwrap());

    let fees = query.fees(1).await.unwrap();
    assert_eq!(fees[0].fees.median, 0);

    let txos = query.txos_by_script_id(&sc_id, 0, None).await.unwrap();
    assert_eq!(txos.len(), 1);
}

#[tokio::test]
async fn spending_an_earlier_output_records_the_spend_and_a_nonzero_fee() {
    let dir = TempDir::new().unwrap();
    let kv = Arc::new(RocksKv::open(dir.path()).unwrap());

    let sc_id_a = [1u8; 32];
    let sc_id_b = [2u8; 32];
    let coinbase_id = [11u8; 32];
    let spend_id = [12u8; 32];

    let block0 = BlockBody {
        block_id: [1u8; 32],
        height: 0,
        size: 300,
        previous_block_hash: None,
        next_block_hash: Some([2u8; 32]),
        transactions: vec![coinbase_tx(coinbase_id, sc_id_a, 1_000_000)],
    };
    let block1 = BlockBody {
        block_id: [2u8; 32],
        height: 1,
        size: 300,
        previous_block_hash: Some([1u8; 32]),
        next_block_hash: None,
        transactions: vec![spending_tx(spend_id, coinbase_id, 0, sc_id_b, 900_000)],
    };
    let rpc = Arc::new(MockChainRpc::builder().with_block(block0).with_block(block1).build());

    let indexer = Indexer::new(kv.clone(), rpc.clone(), EventBus::new());
    let query = Query::new(kv, rpc);

    indexer.connect([1u8; 32], 0).await.unwrap();
    indexer.connect([2u8; 32], 1).await.unwrap();

    let spent = query.spent_from_txo(&coinbase_id, 0).await.unwrap().unwrap();
    assert_eq!(spent.tx_id, spend_id);
    assert_eq!(spent.vin, 0);

    let fees = query.fees(2).await.unwrap();
    let spend_row = fees.iter().find(|r| r.height == 1).unwrap();
    // fee = 1_000_000 - 900_000 = 100_000 over vsize 250 -> rate 400
    assert_eq!(spend_row.fees.median, 400);
}

#[tokio::test]
async fn disconnect_undoes_the_spend_and_rewinds_the_tip() {
    let dir = TempDir::new().unwrap();
    let kv = Arc::new(RocksKv::open(dir.path()).unwrap());

    let sc_id_a = [1u8; 32];
    let sc_id_b = [2u8; 32];
    let coinbase_id = [11u8; 32];
    let spend_id = [12u8; 32];

    let block0 = BlockBody {
        block_id: [1u8; 32],
        height: 0,
        size: 300,
        previous_block_hash: None,
        next_block_hash: Some([2u8; 32]),
        transactions: vec![coinbase_tx(coinbase_id, sc_id_a, 1_000_000)],
    };
    let block1 = BlockBody {
        block_id: [2u8; 32],
        height: 1,
        size: 300,
        previous_block_hash: Some([1u8; 32]),
        next_block_hash: None,
        transactions: vec![spending_tx(spend_id, coinbase_id, 0, sc_id_b, 900_000)],
    };
    let rpc = Arc::new(MockChainRpc::builder().with_block(block0).with_block(block1).build());

    let indexer = Indexer::new(kv.clone(), rpc.clone(), EventBus::new());
    let query = Query::new(kv, rpc);

    indexer.connect([1u8; 32], 0).await.unwrap();
    indexer.connect([2u8; 32], 1).await.unwrap();

    indexer.disconnect([2u8; 32]).await.unwrap();

    assert!(query.spent_from_txo(&coinbase_id, 0).await.unwrap().is_none());
    assert!(query.txo_by_txo(&spend_id, 0).await.unwrap().is_none());

    let tip = query.tip().await.unwrap().unwrap();
    assert_eq!(tip.block_id, [1u8; 32]);
    assert_eq!(tip.height, 0);
}

#[tokio::test]
async fn connect_rejects_a_height_that_does_not_match_the_fetched_block() {
    let dir = TempDir::new().unwrap();
    let kv = Arc::new(RocksKv::open(dir.path()).unwrap());

    let block = BlockBody {
        block_id: [1u8; 32],
        height: 5,
        size: 0,
        previous_block_hash: None,
        next_block_hash: None,
        transactions: Vec::new(),
    };
    let rpc = Arc::new(MockChainRpc::builder().with_block(block).build());

    let indexer = Indexer::new(kv.clone(), rpc.clone(), EventBus::new());
    let query = Query::new(kv, rpc);

    let err = indexer.connect([1u8; 32], 0).await.unwrap_err();
    assert!(matches!(err, chainindex::error::IndexerError::HeightMismatch { expected: 0, actual: 5 }));
    assert!(query.tip().await.unwrap().is_none());
}

#[tokio::test]
async fn transaction_ids_by_script_id_joins_producing_and_spending_transactions() {
    let dir = TempDir::new().unwrap();
    let kv = Arc::new(RocksKv::open(dir.path()).unwrap());

    let sc_id_a = [1u8; 32];
    let sc_id_b = [2u8; 32];
    let coinbase_id = [11u8; 32];
    let spend_id = [12u8; 32];

    let block0 = BlockBody {
        block_id: [1u8; 32],
        height: 0,
        size: 300,
        previous_block_hash: None,
        next_block_hash: Some([2u8; 32]),
        transactions: vec![coinbase_tx(coinbase_id, sc_id_a, 1_000_000)],
    };
    let block1 = BlockBody {
        block_id: [2u8; 32],
        height: 1,
        size: 300,
        previous_block_hash: Some([1u8; 32]),
        next_block_hash: None,
        transactions: vec![spending_tx(spend_id, coinbase_id, 0, sc_id_b, 900_000)],
    };
    let rpc = Arc::new(MockChainRpc::builder().with_block(block0).with_block(block1).build());

    let indexer = Indexer::new(kv.clone(), rpc.clone(), EventBus::new());
    let query = Query::new(kv, rpc);

    indexer.connect([1u8; 32], 0).await.unwrap();
    indexer.connect([2u8; 32], 1).await.unwrap();

    let (tx_ids, position) = query
        .transaction_ids_by_script_id(&sc_id_a, 0, chainindex::query::LimitSpec::Limit(10))
        .await
        .unwrap();

    assert!(tx_ids.contains(&coinbase_id));
    assert!(tx_ids.contains(&spend_id));
    assert_eq!(position.height, 0);
    assert_eq!(position.offset, 1);
}

#[tokio::test]
async fn connect_reports_no_next_block_when_the_rpc_reports_none() {
    let dir = TempDir::new().unwrap();
    let kv = Arc::new(RocksKv::open(dir.path()).unwrap());

    let block = BlockBody {
        block_id: [1u8; 32],
        height: 0,
        size: 0,
        previous_block_hash: None,
        next_block_hash: None,
        transactions: Vec::new(),
    };
    let rpc = Arc::new(MockChainRpc::builder().with_block(block).build());

    let indexer = Indexer::new(kv.clone(), rpc.clone(), EventBus::new());
    let query = Query::new(kv, rpc);

    let next = indexer.connect([1u8; 32], 0).await.unwrap();
    assert_eq!(next, None, "an absent nextblockhash must surface as None, not the just-connected block_id");

    let tip = query.tip().await.unwrap().unwrap();
    assert_eq!(tip.block_id, [1u8; 32]);
}

/// Spec §8 scenario 6: three blocks producing outputs to the same scId at
/// heights 10/20/30, then a later block spending the height-20 output.
/// Exercises the ScriptIndex range scan across several heights for one
/// scId, not just a single key.
#[tokio::test]
async fn script_scan_spans_multiple_heights_and_joins_the_spender() {
    let dir = TempDir::new().unwrap();
    let kv = Arc::new(RocksKv::open(dir.path()).unwrap());

    let sc_id = [7u8; 32];
    let other_sc_id = [8u8; 32];
    let tx_10 = [10u8; 32];
    let tx_20 = [20u8; 32];
    let tx_30 = [30u8; 32];
    let spender = [99u8; 32];

    let block_at = |height: u32, tx: Transaction, prev: Option<[u8; 32]>, id: [u8; 32]| BlockBody {
        block_id: id,
        height,
        size: 300,
        previous_block_hash: prev,
        next_block_hash: None,
        transactions: vec![tx],
    };

    let b10 = block_at(10, coinbase_tx(tx_10, sc_id, 1_000), None, [110u8; 32]);
    let b20 = block_at(20, coinbase_tx(tx_20, sc_id, 2_000), Some([110u8; 32]), [120u8; 32]);
    let b30 = block_at(30, coinbase_tx(tx_30, sc_id, 3_000), Some([120u8; 32]), [130u8; 32]);
    let b40 = block_at(40, spending_tx(spender, tx_20, 0, other_sc_id, 1_900), Some([130u8; 32]), [140u8; 32]);

    let rpc = Arc::new(
        MockChainRpc::builder().with_block(b10).with_block(b20).with_block(b30).with_block(b40).build(),
    );

    let indexer = Indexer::new(kv.clone(), rpc.clone(), EventBus::new());
    let query = Query::new(kv, rpc);

    indexer.connect([110u8; 32], 10).await.unwrap();
    indexer.connect([120u8; 32], 20).await.unwrap();
    indexer.connect([130u8; 32], 30).await.unwrap();
    indexer.connect([140u8; 32], 40).await.unwrap();

    assert!(query.seen_script_id(&sc_id).await.unwrap());

    let txos = query.txos_by_script_id(&sc_id, 0, None).await.unwrap();
    assert_eq!(txos.len(), 3);
    let heights: Vec<u32> = txos.values().map(|t| t.height).collect();
    assert!(heights.contains(&10));
    assert!(heights.contains(&20));
    assert!(heights.contains(&30));

    let (tx_ids, _) = query.transaction_ids_by_script_id(&sc_id, 0, LimitSpec::Limit(100)).await.unwrap();
    assert!(tx_ids.contains(&tx_10));
    assert!(tx_ids.contains(&tx_20));
    assert!(tx_ids.contains(&tx_30));
    assert!(tx_ids.contains(&spender), "the tx spending the height-20 output must be joined in");
}
