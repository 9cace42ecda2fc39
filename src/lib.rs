//! chainindex — secondary-index core for a UTXO-style chain.
//!
//! The crate is organized leaf-first, per the component budget: key codec,
//! KV abstraction, indexer core, query layer, event bus, with the chain RPC
//! collaborator and the ambient config/telemetry/metrics stack around them.

pub mod config;
pub mod error;
pub mod events;
pub mod indexer;
pub mod key_codec;
pub mod kv;
pub mod metrics;
pub mod query;
pub mod rpc;
pub mod telemetry;
pub mod types;
