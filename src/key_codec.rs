//! Deterministic, order-preserving binary encoding for the seven indexes.
//!
//! Every key starts with a one-byte type tag so each index occupies a
//! disjoint, contiguous range of the keyspace; the reference `RocksKv`
//! additionally gives each index its own column family, making the tag
//! redundant-but-defensive rather than load-bearing. All fixed-width
//! integers are encoded big-endian so lexicographic byte order agrees
//! with numeric order — this is what makes range scans correct.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::error::IndexerError;

pub const TAG_TIP: u8 = 0x01;
pub const TAG_TX_INDEX: u8 = 0x02;
pub const TAG_TXO_INDEX: u8 = 0x03;
pub const TAG_SPENT_INDEX: u8 = 0x04;
pub const TAG_SCRIPT_INDEX: u8 = 0x05;
pub const TAG_FEE_INDEX: u8 = 0x06;
pub const TAG_LABEL_INDEX: u8 = 0x07;

pub type BlockId = [u8; 32];
pub type TxId = [u8; 32];
pub type ScId = [u8; 32];

fn decode_err(context: &'static str, reason: impl Into<String>) -> IndexerError {
    IndexerError::decode(context, reason)
}

fn read_array32(cur: &mut Cursor<&[u8]>, context: &'static str) -> Result<[u8; 32], IndexerError> {
    let pos = cur.position() as usize;
    let buf = cur.get_ref();
    if buf.len() < pos + 32 {
        return Err(decode_err(context, "truncated 32-byte field"));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&buf[pos..pos + 32]);
    cur.set_position((pos + 32) as u64);
    Ok(out)
}

fn read_u32(cur: &mut Cursor<&[u8]>, context: &'static str) -> Result<u32, IndexerError> {
    cur.read_u32::<BigEndian>().map_err(|e| decode_err(context, e.to_string()))
}

fn read_tag(cur: &mut Cursor<&[u8]>, expected: u8, context: &'static str) -> Result<(), IndexerError> {
    let tag = cur.read_u8().map_err(|e| decode_err(context, e.to_string()))?;
    if tag != expected {
        return Err(decode_err(context, format!("tag mismatch: expected {:#x}, got {:#x}", expected, tag)));
    }
    Ok(())
}

/// Tip key: singleton, just the tag byte.
pub fn tip_key() -> Vec<u8> {
    vec![TAG_TIP]
}

pub struct TipValue {
    pub block_id: BlockId,
    pub height: u32,
}

pub fn encode_tip_value(v: &TipValue) -> Vec<u8> {
    let mut buf = Vec::with_capacity(36);
    buf.extend_from_slice(&v.block_id);
    buf.write_u32::<BigEndian>(v.height).unwrap();
    buf
}

pub fn decode_tip_value(bytes: &[u8]) -> Result<TipValue, IndexerError> {
    let mut cur = Cursor::new(bytes);
    let block_id = read_array32(&mut cur, "tip value")?;
    let height = read_u32(&mut cur, "tip value")?;
    Ok(TipValue { block_id, height })
}

/// TxIndex key: tag + txId.
pub fn tx_index_key(tx_id: &TxId) -> Vec<u8> {
    let mut buf = Vec::with_capacity(33);
    buf.push(TAG_TX_INDEX);
    buf.extend_from_slice(tx_id);
    buf
}

pub struct TxIndexValue {
    pub height: u32,
}

pub fn encode_tx_index_value(v: &TxIndexValue) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4);
    buf.write_u32::<BigEndian>(v.height).unwrap();
    buf
}

pub fn decode_tx_index_value(bytes: &[u8]) -> Result<TxIndexValue, IndexerError> {
    let mut cur = Cursor::new(bytes);
    let height = read_u32(&mut cur, "tx index value")?;
    Ok(TxIndexValue { height })
}

/// TxoIndex key: tag + txId + vout (big-endian).
pub fn txo_index_key(tx_id: &TxId, vout: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(37);
    buf.push(TAG_TXO_INDEX);
    buf.extend_from_slice(tx_id);
    buf.write_u32::<BigEndian>(vout).unwrap();
    buf
}

pub struct TxoIndexValue {
    pub value: u64,
    pub script: Vec<u8>,
}

pub fn encode_txo_index_value(v: &TxoIndexValue) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + v.script.len());
    buf.write_u64::<BigEndian>(v.value).unwrap();
    buf.extend_from_slice(&v.script);
    buf
}

pub fn decode_txo_index_value(bytes: &[u8]) -> Result<TxoIndexValue, IndexerError> {
    if bytes.len() < 8 {
        return Err(decode_err("txo index value", "truncated value field"));
    }
    let mut cur = Cursor::new(bytes);
    let value = cur.read_u64::<BigEndian>().map_err(|e| decode_err("txo index value", e.to_string()))?;
    let script = bytes[8..].to_vec();
    Ok(TxoIndexValue { value, script })
}

/// SpentIndex key: tag + prevTxId + vout.
pub fn spent_index_key(prev_tx_id: &TxId, vout: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(37);
    buf.push(TAG_SPENT_INDEX);
    buf.extend_from_slice(prev_tx_id);
    buf.write_u32::<BigEndian>(vout).unwrap();
    buf
}

pub struct SpentIndexValue {
    pub tx_id: TxId,
    pub vin: u32,
}

pub fn encode_spent_index_value(v: &SpentIndexValue) -> Vec<u8> {
    let mut buf = Vec::with_capacity(36);
    buf.extend_from_slice(&v.tx_id);
    buf.write_u32::<BigEndian>(v.vin).unwrap();
    buf
}

pub fn decode_spent_index_value(bytes: &[u8]) -> Result<SpentIndexValue, IndexerError> {
    let mut cur = Cursor::new(bytes);
    let tx_id = read_array32(&mut cur, "spent index value")?;
    let vin = read_u32(&mut cur, "spent index value")?;
    Ok(SpentIndexValue { tx_id, vin })
}

/// ScriptIndex key: tag + scId + height + txId + vout. No value (presence-only).
pub fn script_index_key(sc_id: &ScId, height: u32, tx_id: &TxId, vout: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + 32 + 4 + 32 + 4);
    buf.push(TAG_SCRIPT_INDEX);
    buf.extend_from_slice(sc_id);
    buf.write_u32::<BigEndian>(height).unwrap();
    buf.extend_from_slice(tx_id);
    buf.write_u32::<BigEndian>(vout).unwrap();
    buf
}

pub struct ScriptIndexKey {
    pub sc_id: ScId,
    pub height: u32,
    pub tx_id: TxId,
    pub vout: u32,
}

pub fn decode_script_index_key(bytes: &[u8]) -> Result<ScriptIndexKey, IndexerError> {
    let mut cur = Cursor::new(bytes);
    read_tag(&mut cur, TAG_SCRIPT_INDEX, "script index key")?;
    let sc_id = read_array32(&mut cur, "script index key")?;
    let height = read_u32(&mut cur, "script index key")?;
    let tx_id = read_array32(&mut cur, "script index key")?;
    let vout = read_u32(&mut cur, "script index key")?;
    Ok(ScriptIndexKey { sc_id, height, tx_id, vout })
}

/// Lower/upper bound helpers for a `gte={scId, height, 0, 0} .. lt={scId, height+1, 0, 0}` scan.
pub fn script_index_lower_bound(sc_id: &ScId, height: u32) -> Vec<u8> {
    script_index_key(sc_id, height, &[0u8; 32], 0)
}

pub fn script_index_upper_bound_exclusive(sc_id: &ScId) -> Vec<u8> {
    // One past the maximum height keeps the upper bound exclusive without
    // needing a 33rd "infinity" byte: 0xFFFFFFFF is the declared sentinel
    // height in spec's seenScriptId scan.
    script_index_key(sc_id, 0xFFFF_FFFF, &[0u8; 32], 0)
}

/// FeeIndex key: tag + height.
pub fn fee_index_key(height: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5);
    buf.push(TAG_FEE_INDEX);
    buf.write_u32::<BigEndian>(height).unwrap();
    buf
}

pub fn decode_fee_index_key(bytes: &[u8]) -> Result<u32, IndexerError> {
    let mut cur = Cursor::new(bytes);
    read_tag(&mut cur, TAG_FEE_INDEX, "fee index key")?;
    read_u32(&mut cur, "fee index key")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeeSummary {
    pub q1: i64,
    pub median: i64,
    pub q3: i64,
}

pub struct FeeIndexValue {
    pub fees: FeeSummary,
    pub size: u64,
}

pub fn encode_fee_index_value(v: &FeeIndexValue) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32);
    buf.write_i64::<BigEndian>(v.fees.q1).unwrap();
    buf.write_i64::<BigEndian>(v.fees.median).unwrap();
    buf.write_i64::<BigEndian>(v.fees.q3).unwrap();
    buf.write_u64::<BigEndian>(v.size).unwrap();
    buf
}

pub fn decode_fee_index_value(bytes: &[u8]) -> Result<FeeIndexValue, IndexerError> {
    let mut cur = Cursor::new(bytes);
    let q1 = cur.read_i64::<BigEndian>().map_err(|e| decode_err("fee index value", e.to_string()))?;
    let median = cur.read_i64::<BigEndian>().map_err(|e| decode_err("fee index value", e.to_string()))?;
    let q3 = cur.read_i64::<BigEndian>().map_err(|e| decode_err("fee index value", e.to_string()))?;
    let size = cur.read_u64::<BigEndian>().map_err(|e| decode_err("fee index value", e.to_string()))?;
    Ok(FeeIndexValue { fees: FeeSummary { q1, median, q3 }, size })
}

/// LabelIndex key: tag + scId + label bytes (variable-width, trailing —
/// nothing follows it in the tuple, so it is allowed to vary in length).
pub fn label_index_key(sc_id: &ScId, label: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(33 + label.len());
    buf.push(TAG_LABEL_INDEX);
    buf.extend_from_slice(sc_id);
    buf.extend_from_slice(label);
    buf
}

pub fn label_index_prefix(sc_id: &ScId) -> Vec<u8> {
    let mut buf = Vec::with_capacity(33);
    buf.push(TAG_LABEL_INDEX);
    buf.extend_from_slice(sc_id);
    buf
}

pub fn decode_label_from_key(sc_id: &ScId, key: &[u8]) -> Result<Vec<u8>, IndexerError> {
    let prefix = label_index_prefix(sc_id);
    if key.len() < prefix.len() || &key[..prefix.len()] != prefix.as_slice() {
        return Err(decode_err("label index key", "key does not match scId prefix"));
    }
    Ok(key[prefix.len()..].to_vec())
}

/// Smallest key that is strictly greater than every key starting with `prefix`.
///
/// Used to turn a fixed prefix into an exclusive upper bound for `iterate`.
/// Increments the last non-0xFF byte and drops everything after it; if
/// every byte is already 0xFF (only possible for a pathological all-0xFF
/// scId) falls back to appending a byte, which is still a valid bound since
/// LabelIndex never stores a bare `prefix` with nothing after it.
pub fn prefix_upper_bound(prefix: &[u8]) -> Vec<u8> {
    let mut upper = prefix.to_vec();
    for i in (0..upper.len()).rev() {
        if upper[i] != 0xFF {
            upper[i] += 1;
            upper.truncate(i + 1);
            return upper;
        }
    }
    upper.push(0xFF);
    upper
}
