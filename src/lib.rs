#![doc = include_str!("../README.md")]
//! ## Feature flags
#![doc = document_features::document_features!()]
//!

// Public modules
mod common;

mod dht;
mod error;
pub mod rpc;
pub mod server;

pub use crate::common::{
    messages, BucketList, Id, NeighborList, PrefixTree, RoutingBackend, RoutingTable, SeekRequest,
    SeekResponse, MAX_BUCKET_SIZE_K,
};
pub use bytes::Bytes;
pub use dht::{Dht, Testnet};

pub use error::{Error, Result};
