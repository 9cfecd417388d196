//! Iterative lookup walking towards a target.

use std::collections::{HashMap, HashSet};
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::common::{Id, NeighborList, RoutingTable, SeekRequest, SeekResponse};

use super::{request_id, Config, Query};

/// Predicate deciding whether a response completes a lookup.
pub type Accept = Box<dyn Fn(&SeekResponse) -> bool + Send>;

/// Returns an [Accept] predicate that is satisfied once a response contains `target`.
pub fn search(target: Id) -> Accept {
    Box::new(move |response| response.nodes.contains(&target))
}

/// An iterative process of asking the closest known, not yet asked, node for
/// candidates closer to the target, until the [Accept] predicate is satisfied
/// or no such node is left.
pub struct Seeker {
    table: Arc<RoutingTable>,
    target: Id,
    /// Every candidate learned so far, closest to the target first.
    queue: NeighborList,
    visited: HashSet<Id>,
    /// Request id to the node it was sent to.
    inflight_requests: HashMap<Bytes, Id>,
    accept: Option<Accept>,
    done: bool,
    skip_update: bool,
    lookahead: usize,
    request_id_len: usize,
    responses: usize,
    successes: usize,
}

impl Seeker {
    pub fn new(table: Arc<RoutingTable>, target: Id, config: &Config) -> Self {
        trace!(?target, "New Query");

        Self {
            table,
            queue: NeighborList::unbounded(target.clone()),
            target,
            visited: HashSet::new(),
            inflight_requests: HashMap::new(),
            accept: None,
            done: false,
            skip_update: false,
            lookahead: config.lookahead,
            request_id_len: config.request_id_len,
            responses: 0,
            successes: 0,
        }
    }

    /// Set the predicate that completes this lookup.
    pub fn accept(mut self, accept: Accept) -> Self {
        self.accept = Some(accept);
        self
    }

    /// Don't add responding nodes to the routing table.
    pub fn skip_update(mut self, skip: bool) -> Self {
        self.skip_update = skip;
        self
    }

    // === Getters ===

    pub fn target(&self) -> &Id {
        &self.target
    }

    /// Candidates learned so far, closest to the target first.
    pub fn closest(&self) -> &NeighborList {
        &self.queue
    }

    /// Returns `true` once a response satisfied the [Accept] predicate.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Number of requests without a response yet.
    pub fn pending(&self) -> usize {
        self.inflight_requests.len()
    }

    /// Number of requests that were either answered or timed out.
    pub fn responses(&self) -> usize {
        self.responses
    }

    /// Number of requests that were answered.
    pub fn successes(&self) -> usize {
        self.successes
    }

    // === Public Methods ===

    /// Request that this node answers itself to seed the lookup from its own
    /// routing table.
    pub fn local_request(&mut self) -> SeekRequest {
        let own = self.table.id().clone();

        self.request(own, false)
    }

    // === Private Methods ===

    fn request(&mut self, to: Id, must_be_closer: bool) -> SeekRequest {
        let request = SeekRequest {
            id: request_id(self.request_id_len),
            target: self.target.clone(),
            must_be_closer,
            from: self.table.id().clone(),
        };

        self.inflight_requests.insert(request.id.clone(), to.clone());
        self.visited.insert(to);

        request
    }
}

impl Query for Seeker {
    fn next(&mut self) -> Option<(Id, SeekRequest)> {
        if self.done {
            return None;
        }

        let candidate = self
            .queue
            .iter()
            .take(self.lookahead)
            .find(|id| !self.visited.contains(*id))
            .cloned()?;

        let request = self.request(candidate.clone(), true);

        trace!(target = ?self.target, to = ?candidate, "Seek request");

        Some((candidate, request))
    }

    fn handle(&mut self, response: SeekResponse) -> bool {
        if self.done {
            return false;
        }

        let Some(from) = self.inflight_requests.remove(&response.id) else {
            return false;
        };

        if !self.skip_update {
            self.table.add(&from, true);
        }

        for node in &response.nodes {
            self.queue.add(node.clone());
        }

        self.responses += 1;
        self.successes += 1;

        if self.accept.as_ref().map_or(false, |accept| accept(&response)) {
            self.done = true;

            debug!(
                target = ?self.target,
                candidates = self.queue.len(),
                visited = self.visited.len(),
                responses = self.responses,
                "Done query"
            );
        }

        true
    }

    fn handle_no_response(&mut self, request_id: &[u8]) {
        if self.done {
            return;
        }

        if self.inflight_requests.remove(request_id).is_some() {
            self.responses += 1;
        }
    }
}

impl Debug for Seeker {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seeker")
            .field("target", &self.target)
            .field("queue", &self.queue.len())
            .field("visited", &self.visited.len())
            .field("pending", &self.inflight_requests.len())
            .field("done", &self.done)
            .field("responses", &self.responses)
            .field("successes", &self.successes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(bytes: &[u8]) -> Id {
        Id::from_bytes(bytes).unwrap()
    }

    fn seeker(own: &Id, known: &[Id], target: &Id) -> Seeker {
        let table = Arc::new(RoutingTable::new(own.clone()));
        for node in known {
            table.add(node, false);
        }

        Seeker::new(table, target.clone(), &Config::default())
    }

    fn seed(seeker: &mut Seeker) {
        let request = seeker.local_request();
        let response = SeekResponse {
            id: request.id.clone(),
            nodes: seeker.table.seek_n(&request.target, 5, false),
        };

        assert!(seeker.handle(response));
    }

    #[test]
    fn closer_candidates_first() {
        let own = id(&[1, 10, 15]);
        let ids = [id(&[64, 111, 222]), id(&[128, 111, 222])];

        let mut seeker = seeker(&own, &ids, &id(&[192, 111, 222]));
        seed(&mut seeker);

        assert_eq!(seeker.closest().to_vec(), vec![ids[1].clone(), ids[0].clone()]);

        let (to, request) = seeker.next().unwrap();
        assert_eq!(to, ids[1]);
        assert!(request.must_be_closer);
        assert_eq!(request.from, own);
        assert_eq!(request.id.len(), Config::default().request_id_len);

        let (to, _) = seeker.next().unwrap();
        assert_eq!(to, ids[0]);

        assert!(seeker.next().is_none());
        assert_eq!(seeker.pending(), 2);
    }

    #[test]
    fn done_on_seed_response() {
        let target = id(&[128, 111, 222]);
        let mut seeker = seeker(&id(&[1, 10, 15]), &[target.clone()], &target)
            .accept(search(target.clone()));

        seed(&mut seeker);

        assert!(seeker.is_done());
        assert_eq!(seeker.successes(), 1);
        assert!(seeker.next().is_none());
    }

    #[test]
    fn unknown_and_late_responses_are_ignored() {
        let target = id(&[128, 111, 222]);
        let mut seeker = seeker(&id(&[1, 10, 15]), &[id(&[64, 111, 222])], &target)
            .accept(search(target.clone()));

        seed(&mut seeker);
        assert!(!seeker.is_done());

        let (_, request) = seeker.next().unwrap();

        let unknown = SeekResponse {
            id: Bytes::from_static(b"nope"),
            nodes: vec![target.clone()],
        };
        assert!(!seeker.handle(unknown));
        assert!(!seeker.is_done());

        let response = SeekResponse {
            id: request.id.clone(),
            nodes: vec![target.clone()],
        };
        assert!(seeker.handle(response.clone()));
        assert!(seeker.is_done());

        // Already resolved.
        assert!(!seeker.handle(response));
        assert_eq!(seeker.successes(), 2);
    }

    #[test]
    fn no_response_clears_pending() {
        let mut seeker = seeker(&id(&[1, 10, 15]), &[id(&[64, 111, 222])], &id(&[0, 0, 0]));
        seed(&mut seeker);

        let (_, request) = seeker.next().unwrap();
        assert_eq!(seeker.pending(), 1);

        seeker.handle_no_response(&request.id);
        assert_eq!(seeker.pending(), 0);
        assert_eq!(seeker.responses(), 2);
        assert_eq!(seeker.successes(), 1);

        // Never retried.
        assert!(seeker.next().is_none());
    }

    #[test]
    fn responders_are_added_to_the_table() {
        let own = id(&[1, 10, 15]);
        let first = id(&[64, 111, 222]);
        let learned = id(&[128, 111, 222]);

        let mut seeker = seeker(&own, &[first.clone()], &id(&[192, 111, 222]));
        seed(&mut seeker);

        let (_, request) = seeker.next().unwrap();
        seeker.table.remove(&first, false);

        seeker.handle(SeekResponse {
            id: request.id,
            nodes: vec![learned.clone()],
        });

        // The responder, not the candidates it returned.
        assert!(seeker.table.contains(&first));
        assert!(!seeker.table.contains(&learned));
        assert_eq!(seeker.closest().get(0), Some(&learned));
    }
}
