//! Answering incoming seek requests.

use std::fmt::Debug;

use tracing::trace;

use crate::common::{RoutingTable, SeekRequest, SeekResponse};
use crate::rpc::{Config, DEFAULT_RETURN_NODES};
use crate::Result;

/// Dht server that can handle incoming seek requests
pub trait Server: Debug + Send + Sync {
    /// Handle an incoming request, answering from `routing_table`.
    ///
    /// Called concurrently with lookups and refreshes of the same routing table,
    /// so it needs to be fast and lightweight.
    fn handle_seek(&self, routing_table: &RoutingTable, request: &SeekRequest)
        -> Result<SeekResponse>;
}

#[derive(Debug, Clone)]
/// Default implementation of [Server] trait.
///
/// Returns the closest ids it knows, and learns about every requester.
/// It doesn't implement any rate-limiting or blocking.
pub struct DefaultServer {
    /// Maximum number of ids in a response.
    ///
    /// Defaults to [DEFAULT_RETURN_NODES]
    pub return_nodes: usize,
    /// Don't add requesters to the routing table.
    ///
    /// Defaults to false
    pub skip_request_update: bool,
}

impl Default for DefaultServer {
    fn default() -> Self {
        Self {
            return_nodes: DEFAULT_RETURN_NODES,
            skip_request_update: false,
        }
    }
}

impl DefaultServer {
    pub fn new(config: &Config) -> Self {
        Self {
            return_nodes: config.return_nodes,
            skip_request_update: config.skip_request_update,
        }
    }
}

impl Server for DefaultServer {
    fn handle_seek(
        &self,
        routing_table: &RoutingTable,
        request: &SeekRequest,
    ) -> Result<SeekResponse> {
        let own = routing_table.id();
        own.check_len(&request.target)?;
        own.check_len(&request.from)?;

        trace!(from = ?request.from, target = ?request.target, "Seek request");

        if !self.skip_request_update {
            routing_table.add(&request.from, true);
        }

        Ok(SeekResponse {
            id: request.id.clone(),
            nodes: routing_table.seek_n(&request.target, self.return_nodes, request.must_be_closer),
        })
    }
}
