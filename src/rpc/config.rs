use std::time::Duration;

use crate::common::MAX_BUCKET_SIZE_K;

use super::{
    DEFAULT_LOOKAHEAD, DEFAULT_REFRESH_INTERVAL, DEFAULT_REQUEST_ID_LEN, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_RETURN_NODES,
};

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
/// Dht Configurations
pub struct Config {
    /// Capacity of the bucket farthest from this node, halved for every closer bucket.
    ///
    /// Defaults to [MAX_BUCKET_SIZE_K]
    pub bucket_size: usize,
    /// How many ids the routing table may hold past its capacity before pruning.
    ///
    /// Defaults to None, where `bucket_size` is used.
    pub prune_threshold: Option<usize>,
    /// Maximum number of ids returned to a seek request.
    ///
    /// Defaults to [DEFAULT_RETURN_NODES]
    pub return_nodes: usize,
    /// Don't add requesters to the routing table.
    ///
    /// Defaults to false
    pub skip_request_update: bool,
    /// Length of request ids in bytes.
    ///
    /// Defaults to [DEFAULT_REQUEST_ID_LEN]
    pub request_id_len: usize,
    /// Number of closest candidates searched for one that wasn't queried yet.
    ///
    /// Defaults to [DEFAULT_LOOKAHEAD]
    pub lookahead: usize,
    /// Last bucket a refresh sweeps one by one, before jumping to the closest bucket.
    ///
    /// Buckets past the first few are very likely empty in large networks, skipping
    /// them saves requests at the cost of a less complete routing table.
    ///
    /// Defaults to None, where every bucket is swept.
    pub update_depth: Option<usize>,
    /// Duration a [super::Transport] waits for a response.
    ///
    /// Defaults to [DEFAULT_REQUEST_TIMEOUT]
    pub request_timeout: Duration,
    /// Mean interval between two refresh sweeps, the actual wait is randomized
    /// between half and one and a half of it.
    ///
    /// Defaults to [DEFAULT_REFRESH_INTERVAL]
    pub refresh_interval: Duration,
}

impl Config {
    /// Returns `prune_threshold` or its default.
    pub fn prune_threshold(&self) -> usize {
        self.prune_threshold.unwrap_or(self.bucket_size)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bucket_size: MAX_BUCKET_SIZE_K,
            prune_threshold: None,
            return_nodes: DEFAULT_RETURN_NODES,
            skip_request_update: false,
            request_id_len: DEFAULT_REQUEST_ID_LEN,
            lookahead: DEFAULT_LOOKAHEAD,
            update_depth: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}
