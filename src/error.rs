use std::fmt;

/// Error type returned by every CONNECT/DISCONNECT/query operation.
///
/// Hand-rolled `Display`/`Error` impls, matching the collaborator's own
/// error type rather than pulling in a derive-macro crate.
#[derive(Debug, Clone)]
pub enum IndexerError {
    /// The chain RPC collaborator failed to answer a call.
    RpcFailure { method: &'static str, reason: String },
    /// A block's actual height didn't match the height the caller expected.
    HeightMismatch { expected: u32, actual: u32 },
    /// The KV store rejected a read, write, or commit.
    KvFailure { op: &'static str, reason: String },
    /// The fee pass needed a TXO that isn't in the index.
    MissingTxo { txid: [u8; 32], vout: u32 },
    /// Stored bytes didn't decode to the shape the codec expects.
    DecodeFailure { context: &'static str, reason: String },
}

impl fmt::Display for IndexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexerError::RpcFailure { method, reason } => {
                write!(f, "rpc call {} failed: {}", method, reason)
            }
            IndexerError::HeightMismatch { expected, actual } => {
                write!(f, "height mismatch: expected {}, got {}", expected, actual)
            }
            IndexerError::KvFailure { op, reason } => {
                write!(f, "kv op {} failed: {}", op, reason)
            }
            IndexerError::MissingTxo { txid, vout } => {
                write!(f, "missing txo {}:{}", hex::encode(txid), vout)
            }
            IndexerError::DecodeFailure { context, reason } => {
                write!(f, "decode failure in {}: {}", context, reason)
            }
        }
    }
}

impl std::error::Error for IndexerError {}

impl IndexerError {
    pub fn kv(op: &'static str, reason: impl Into<String>) -> Self {
        IndexerError::KvFailure { op, reason: reason.into() }
    }

    pub fn rpc(method: &'static str, reason: impl Into<String>) -> Self {
        IndexerError::RpcFailure { method, reason: reason.into() }
    }

    pub fn decode(context: &'static str, reason: impl Into<String>) -> Self {
        IndexerError::DecodeFailure { context, reason: reason.into() }
    }
}

impl From<rocksdb::Error> for IndexerError {
    fn from(e: rocksdb::Error) -> Self {
        IndexerError::KvFailure { op: "rocksdb", reason: e.to_string() }
    }
}
