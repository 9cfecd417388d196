//! Routing table refresh, sweeping buckets from the farthest to the closest.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::common::{Id, RoutingTable, SeekRequest, SeekResponse};

use super::{request_id, Config, Query};

#[derive(Debug, Clone)]
struct Action {
    bucket: usize,
    candidate: Id,
    /// This node's id with the bit of `bucket` flipped.
    target: Id,
}

#[derive(Debug)]
/// One sweep over the buckets of a routing table, looking up the middle of each
/// bucket's range to discover nodes belonging to it.
///
/// Buckets are queued lazily, only once the previous ones ran out of work, so
/// nodes learned for one bucket are already known when seeking the next.
pub struct Updater {
    table: Arc<RoutingTable>,
    /// Last in, first out.
    queue: Vec<Action>,
    /// `(candidate, target)` pairs queued at some point during this sweep.
    queued: HashSet<(Id, Id)>,
    inflight_requests: HashMap<Bytes, Action>,
    /// Next bucket to queue.
    cursor: usize,
    depth: Option<usize>,
    request_id_len: usize,
    responses: usize,
    added: usize,
}

impl Updater {
    pub fn new(table: Arc<RoutingTable>, config: &Config) -> Self {
        let mut updater = Self {
            table,
            queue: Vec::new(),
            queued: HashSet::new(),
            inflight_requests: HashMap::new(),
            cursor: 1,
            depth: config.update_depth,
            request_id_len: config.request_id_len,
            responses: 0,
            added: 0,
        };

        updater.queue_idx(0);

        updater
    }

    // === Getters ===

    /// Number of requests without a response yet.
    pub fn pending(&self) -> usize {
        self.inflight_requests.len()
    }

    /// Number of answered requests.
    pub fn responses(&self) -> usize {
        self.responses
    }

    /// Number of ids this sweep added to the routing table.
    pub fn added(&self) -> usize {
        self.added
    }

    // === Private Methods ===

    /// Queue a request for the middle of the bucket at `index` to the closest
    /// known node, returns `false` if there is none or it was queued before.
    fn queue_idx(&mut self, index: usize) -> bool {
        let target = self.table.id().flip_bit(index);

        match self.table.seek(&target, false) {
            Some(candidate) => self.enqueue(Action {
                bucket: index,
                candidate,
                target,
            }),
            None => false,
        }
    }

    fn enqueue(&mut self, action: Action) -> bool {
        if !self
            .queued
            .insert((action.candidate.clone(), action.target.clone()))
        {
            return false;
        }

        self.queue.push(action);

        true
    }
}

impl Query for Updater {
    fn next(&mut self) -> Option<(Id, SeekRequest)> {
        let bits = self.table.id().bits();

        while self.queue.is_empty() {
            if self.cursor >= bits {
                debug!(
                    id = %self.table.id(),
                    added = self.added,
                    responses = self.responses,
                    known = self.table.known_count(),
                    "Sweep finished"
                );
                return None;
            }

            if let Some(depth) = self.depth {
                if self.cursor > depth {
                    self.cursor = bits - 1;
                }
            }

            self.queue_idx(self.cursor);
            self.cursor += 1;
        }

        let action = self.queue.pop()?;

        let request = SeekRequest {
            id: request_id(self.request_id_len),
            target: action.target.clone(),
            must_be_closer: true,
            from: self.table.id().clone(),
        };

        trace!(bucket = action.bucket, to = ?action.candidate, "Refresh request");

        let to = action.candidate.clone();
        self.inflight_requests.insert(request.id.clone(), action);

        Some((to, request))
    }

    fn handle(&mut self, response: SeekResponse) -> bool {
        let Some(action) = self.inflight_requests.remove(&response.id) else {
            return false;
        };

        self.responses += 1;
        self.table.add(&action.candidate, true);

        let own = self.table.id().clone();

        for node in response.nodes {
            if node == own || node.len() != own.len() {
                continue;
            }

            if self.table.add(&node, false) {
                self.added += 1;
                self.queue_idx(action.bucket);
            }

            self.enqueue(Action {
                bucket: action.bucket,
                candidate: node,
                target: action.target.clone(),
            });
        }

        true
    }

    fn handle_no_response(&mut self, request_id: &[u8]) {
        let Some(action) = self.inflight_requests.remove(request_id) else {
            return;
        };

        debug!(candidate = ?action.candidate, bucket = action.bucket, "Blacklisting unresponsive node");

        self.table.remove(&action.candidate, true);
        self.queue_idx(action.bucket);
    }
}
