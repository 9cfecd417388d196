//! Kademlia routing table over a pluggable storage backend.

use std::fmt::Debug;
use std::sync::{PoisonError, RwLock};

use dashmap::DashSet;
use tracing::trace;

use crate::common::{Id, NeighborList, PrefixTree};

/// K = the default capacity of the bucket farthest from the owner.
pub const MAX_BUCKET_SIZE_K: usize = 20;

/// Storage of known ids behind a [RoutingTable].
///
/// Implementations synchronize internally, every method takes `&self`.
pub trait RoutingBackend: Debug + Send + Sync {
    /// Returns `true` if the id was stored and wasn't before.
    fn insert(&self, id: &Id) -> bool;
    /// Returns `true` if the id was stored.
    fn remove(&self, id: &Id) -> bool;
    /// The stored id closest to `target`.
    fn search(&self, target: &Id) -> Option<Id>;
    /// Up to `n` stored ids ordered by distance to `target`, optionally only those
    /// whose distance is strictly smaller than `closer_than`.
    fn search_n(&self, target: &Id, n: usize, closer_than: Option<&Id>) -> Vec<Id>;
    /// Number of stored ids.
    fn len(&self) -> usize;
    /// Export an owned vector of stored ids.
    fn ids(&self) -> Vec<Id>;

    /// Deferred maintenance run after every insertion, returns the number of evicted ids.
    fn maintain(&self) -> usize {
        0
    }

    fn contains(&self, id: &Id) -> bool {
        self.search(id).as_ref() == Some(id)
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RoutingBackend for PrefixTree {
    fn insert(&self, id: &Id) -> bool {
        PrefixTree::insert(self, id)
    }

    fn remove(&self, id: &Id) -> bool {
        PrefixTree::remove(self, id)
    }

    fn search(&self, target: &Id) -> Option<Id> {
        PrefixTree::search(self, target)
    }

    fn search_n(&self, target: &Id, n: usize, closer_than: Option<&Id>) -> Vec<Id> {
        PrefixTree::search_n(self, target, n, closer_than)
    }

    fn len(&self) -> usize {
        PrefixTree::len(self)
    }

    fn ids(&self) -> Vec<Id> {
        PrefixTree::ids(self)
    }

    fn maintain(&self) -> usize {
        self.maybe_prune()
    }
}

#[derive(Debug)]
/// One [NeighborList] per shared prefix length with the owner.
///
/// Bucket `i` is pivoted on the owner's id with bit `i` flipped and is locked
/// on its own, so mutations of different buckets never contend.
pub struct BucketList {
    id: Id,
    buckets: Vec<RwLock<NeighborList>>,
}

impl BucketList {
    /// Create a new [BucketList] for the owner `id`, with bucket `i` holding
    /// `bucket_size / 2^i` ids, but at least one.
    pub fn new(id: Id, bucket_size: usize) -> Self {
        let mut capacity = bucket_size.max(1);

        let buckets = (0..id.bits())
            .map(|i| {
                let bucket = NeighborList::new(id.flip_bit(i), capacity);
                capacity = (capacity / 2).max(1);

                RwLock::new(bucket)
            })
            .collect();

        BucketList { id, buckets }
    }

    /// Returns a snapshot of the bucket at `index`.
    pub fn bucket(&self, index: usize) -> Option<NeighborList> {
        self.buckets
            .get(index)
            .map(|bucket| bucket.read().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn bucket_for(&self, id: &Id) -> Option<&RwLock<NeighborList>> {
        if id.len() != self.id.len() {
            return None;
        }

        // The owner itself maps past the last bucket.
        self.buckets
            .get(self.id.distance(id).leading_zeros() as usize)
    }
}

impl RoutingBackend for BucketList {
    fn insert(&self, id: &Id) -> bool {
        let Some(bucket) = self.bucket_for(id) else {
            return false;
        };

        let Some(hint) = bucket
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .probe(id)
        else {
            return false;
        };

        bucket
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert_at(id.clone(), hint)
    }

    fn remove(&self, id: &Id) -> bool {
        match self.bucket_for(id) {
            Some(bucket) => bucket
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(id),
            None => false,
        }
    }

    fn search(&self, target: &Id) -> Option<Id> {
        if target.len() != self.id.len() {
            return None;
        }

        let mut best: Option<Id> = None;

        for bucket in &self.buckets {
            let bucket = bucket.read().unwrap_or_else(PoisonError::into_inner);

            if let Some(candidate) = bucket.nearest(target) {
                match &best {
                    Some(current) if !target.is_closer(candidate, current) => {}
                    _ => best = Some(candidate.clone()),
                }
            }
        }

        best
    }

    fn search_n(&self, target: &Id, n: usize, closer_than: Option<&Id>) -> Vec<Id> {
        if target.len() != self.id.len() {
            return Vec::new();
        }

        let mut found: Vec<Id> = self
            .ids()
            .into_iter()
            .filter(|id| closer_than.map_or(true, |max| &target.distance(id) < max))
            .collect();

        found.sort_by(|a, b| target.distance_cmp(a, b));
        found.truncate(n);

        found
    }

    fn len(&self) -> usize {
        self.buckets
            .iter()
            .map(|bucket| bucket.read().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    fn ids(&self) -> Vec<Id> {
        let mut ids = Vec::new();

        for bucket in &self.buckets {
            ids.extend(
                bucket
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .iter()
                    .cloned(),
            );
        }

        ids
    }
}

#[derive(Debug)]
/// Kademlia routing table
pub struct RoutingTable {
    id: Id,
    /// Ids barred from re-insertion, unless explicitly overridden.
    blacklist: DashSet<Id>,
    backend: Box<dyn RoutingBackend>,
}

impl RoutingTable {
    /// Create a new [RoutingTable] with a given id, backed by a [PrefixTree].
    pub fn new(id: Id) -> Self {
        let tree = PrefixTree::new(id.clone(), MAX_BUCKET_SIZE_K);

        Self::with_backend(id, Box::new(tree))
    }

    /// Create a new [RoutingTable] with a given id and storage backend.
    pub fn with_backend(id: Id, backend: Box<dyn RoutingBackend>) -> Self {
        RoutingTable {
            id,
            blacklist: DashSet::new(),
            backend,
        }
    }

    // === Getters ===

    /// Returns the [Id] of this node, where the distance is measured from.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Returns the number of ids in this routing table.
    pub fn known_count(&self) -> usize {
        self.backend.len()
    }

    /// Returns `true` if this routing table is empty.
    pub fn is_empty(&self) -> bool {
        self.backend.is_empty()
    }

    pub fn contains(&self, id: &Id) -> bool {
        id.len() == self.id.len() && self.backend.contains(id)
    }

    pub fn is_blacklisted(&self, id: &Id) -> bool {
        self.blacklist.contains(id)
    }

    /// Index of the bucket `id` belongs to, which is the length of the prefix it
    /// shares with this node's id.
    ///
    /// Returns `None` for this node's own id or an id of the wrong length.
    pub fn bucket_index(&self, id: &Id) -> Option<usize> {
        if id.len() != self.id.len() || id == &self.id {
            return None;
        }

        Some(self.id.distance(id).leading_zeros() as usize)
    }

    /// Export an owned vector of ids from this routing table.
    pub fn ids(&self) -> Vec<Id> {
        self.backend.ids()
    }

    // === Public Methods ===

    /// Attempts to add an id to this routing table, and returns `true` if it did.
    ///
    /// Blacklisted ids are ignored, unless `override_blacklist` is set, in which
    /// case they are removed from the blacklist first.
    pub fn add(&self, id: &Id, override_blacklist: bool) -> bool {
        if id.is_empty() || id == &self.id {
            return false;
        }

        if id.len() != self.id.len() {
            trace!(?id, expected = self.id.len(), "Ignoring id of the wrong length");
            return false;
        }

        if self.blacklist.contains(id) {
            if !override_blacklist {
                return false;
            }
            self.blacklist.remove(id);
        }

        if !self.backend.insert(id) {
            return false;
        }

        if self.backend.maintain() > 0 {
            // The new id might have been evicted right away.
            return self.backend.contains(id);
        }

        true
    }

    /// Remove an id from this routing table, optionally blacklisting it.
    pub fn remove(&self, id: &Id, blacklist: bool) -> bool {
        if blacklist && !id.is_empty() && id != &self.id {
            self.blacklist.insert(id.clone());
        }

        self.backend.remove(id)
    }

    /// Returns the known id closest to the `target`.
    ///
    /// If `must_be_closer` is set, an id that isn't strictly closer to the target
    /// than this node is not returned.
    pub fn seek(&self, target: &Id, must_be_closer: bool) -> Option<Id> {
        if target.len() != self.id.len() {
            return None;
        }

        let best = self.backend.search(target)?;

        if must_be_closer && !target.is_closer(&best, &self.id) {
            return None;
        }

        Some(best)
    }

    /// Returns up to `count` known ids ordered by their distance to the `target`.
    pub fn seek_n(&self, target: &Id, count: usize, must_be_closer: bool) -> Vec<Id> {
        if target.len() != self.id.len() {
            return Vec::new();
        }

        let closer_than = if must_be_closer {
            Some(self.id.distance(target))
        } else {
            None
        };

        self.backend.search_n(target, count, closer_than.as_ref())
    }
}
