//! Binary prefix tree over the bits of node ids.
//!
//! Every bucket of the routing table is a subtree of the prefix tree: the subtree
//! of ids sharing exactly `i` leading bits with the owner's id is rooted at the
//! branch reached by following the owner's id with its `i`th bit flipped.
//! Those branches carry an `allowed` capacity, halving with every bit further
//! away from the owner, and any overflow is propagated lazily to the root as
//! `to_prune`, so that eviction can be batched in one [PrefixTree::prune] pass.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::common::Id;

#[derive(Debug, Default)]
struct Branch {
    branches: [Option<Box<Branch>>; 2],
    /// Number of values stored in this subtree.
    descendants: usize,
    /// Capacity of this subtree, `0` for unbounded.
    allowed: usize,
    /// The largest overflow anywhere in this subtree.
    to_prune: usize,
    /// Set only on leaves, where `descendants == 1`.
    value: Option<Id>,
}

impl Branch {
    fn child(&mut self, bit: u8) -> &mut Branch {
        self.branches[bit as usize].get_or_insert_with(Default::default)
    }

    fn overflow(&self) -> usize {
        if self.allowed > 0 {
            self.descendants.saturating_sub(self.allowed)
        } else {
            0
        }
    }

    fn update_to_prune(&mut self) {
        let children = self
            .branches
            .iter()
            .flatten()
            .map(|branch| branch.to_prune)
            .max()
            .unwrap_or(0);

        self.to_prune = self.overflow().max(children);
    }

    fn set_allowed(&mut self, path: &Id, at_depth: usize, allowed: usize, depth: usize) {
        assert_eq!(self.allowed, 0, "nested capacity in prefix tree");

        let branch = self.child(path.bit(depth));

        if depth == at_depth {
            assert_eq!(branch.allowed, 0, "capacity set twice in prefix tree");
            branch.allowed = allowed;
            return;
        }

        branch.set_allowed(path, at_depth, allowed, depth + 1);
    }

    /// Returns `true` if `id` was not already stored.
    fn insert(&mut self, id: &Id, depth: usize) -> bool {
        if self.descendants == 0 {
            self.value = Some(id.clone());
            self.descendants = 1;
            self.update_to_prune();

            return true;
        }

        if let Some(value) = self.value.take() {
            if &value == id {
                self.value = Some(value);
                return false;
            }

            let bit = value.bit(depth);
            self.child(bit).insert(&value, depth + 1);
        }

        let inserted = self.child(id.bit(depth)).insert(id, depth + 1);

        if inserted {
            self.descendants += 1;
        }
        self.update_to_prune();

        inserted
    }

    fn search(&self, target: &Id, depth: usize) -> Option<&Id> {
        if let Some(value) = &self.value {
            return Some(value);
        }
        if self.descendants == 0 || depth >= target.bits() {
            return None;
        }

        let bit = target.bit(depth) as usize;

        for index in [bit, bit ^ 1] {
            if let Some(branch) = &self.branches[index] {
                if branch.descendants > 0 {
                    return branch.search(target, depth + 1);
                }
            }
        }

        None
    }

    fn search_n(
        &self,
        target: &Id,
        n: usize,
        closer_than: Option<&Id>,
        depth: usize,
        found: &mut Vec<Id>,
    ) {
        if let Some(value) = &self.value {
            if closer_than.map_or(true, |max| &target.distance(value) < max) {
                found.push(value.clone());
            }
            return;
        }
        if self.descendants == 0 || depth >= target.bits() {
            return;
        }

        let bit = target.bit(depth) as usize;

        for index in [bit, bit ^ 1] {
            if found.len() >= n {
                return;
            }
            if let Some(branch) = &self.branches[index] {
                branch.search_n(target, n, closer_than, depth + 1, found);
            }
        }
    }

    /// Evict the `n` values of this subtree farthest from `owner`, plus whatever
    /// overflows a capacity on the way down.
    ///
    /// Returns `true` if this branch is empty and can be detached.
    fn prune(&mut self, mut n: usize, mut seen_allowed: bool, owner: &Id, depth: usize) -> bool {
        let mut can_remove = self.allowed == 0;

        if self.allowed > 0 {
            assert!(!seen_allowed, "nested capacity in prefix tree");
            seen_allowed = true;
            n = n.max(self.overflow());
        }
        self.to_prune = 0;

        if self.value.is_some() {
            assert_eq!(
                self.descendants, 1,
                "prefix tree leaf holding {} descendants",
                self.descendants
            );

            if n > 0 {
                assert!(seen_allowed, "prefix tree eviction outside of a bucket");
                self.value = None;
                self.descendants = 0;
            }

            return can_remove && self.descendants == 0;
        }

        // Farther from the owner first.
        let order = if depth < owner.bits() {
            let far = (owner.bit(depth) ^ 1) as usize;
            [far, far ^ 1]
        } else {
            [1, 0]
        };

        let mut remaining = n;
        let mut descendants = 0;

        for index in order {
            let detach = match self.branches[index].as_mut() {
                Some(branch) => {
                    let take = remaining.min(branch.descendants);
                    remaining -= take;

                    let empty = branch.prune(take, seen_allowed, owner, depth + 1);
                    if !empty {
                        descendants += branch.descendants;
                        can_remove = false;
                    }
                    empty
                }
                None => false,
            };

            if detach {
                self.branches[index] = None;
            }
        }

        debug_assert_eq!(remaining, 0, "pruned more than the subtree holds");
        self.descendants = descendants;

        can_remove && self.descendants == 0
    }

    /// Returns `true` if `id` was found and removed.
    fn remove_node(&mut self, id: &Id, depth: usize) -> bool {
        if let Some(value) = &self.value {
            if value != id {
                return false;
            }

            self.value = None;
            self.descendants = 0;
            self.update_to_prune();

            return true;
        }
        if depth >= id.bits() {
            return false;
        }

        let removed = match self.branches[id.bit(depth) as usize].as_mut() {
            Some(branch) => branch.remove_node(id, depth + 1),
            None => false,
        };

        if removed {
            self.descendants = self
                .branches
                .iter()
                .flatten()
                .map(|branch| branch.descendants)
                .sum();
            self.update_to_prune();
        }

        removed
    }

    fn collect(&self, out: &mut Vec<Id>) {
        if let Some(value) = &self.value {
            out.push(value.clone());
            return;
        }

        for branch in self.branches.iter().flatten() {
            branch.collect(out);
        }
    }
}

#[derive(Debug)]
/// Prefix tree holding the known ids of the network, as seen from `id`.
pub struct PrefixTree {
    id: Id,
    prune_threshold: usize,
    root: RwLock<Branch>,
}

impl PrefixTree {
    /// Create a new [PrefixTree] for the owner `id`.
    ///
    /// The bucket of ids sharing no prefix with `id` holds `bucket_size` ids,
    /// each following bucket holds half as many as the previous one, down to 1.
    pub fn new(id: Id, bucket_size: usize) -> Self {
        let mut root = Branch::default();

        let last = id.bits().saturating_sub(1);
        let mut allowed = bucket_size.max(1);
        let mut i = 0;

        while allowed > 1 && i < last {
            root.set_allowed(&id.flip_bit(i), i, allowed, 0);
            i += 1;
            allowed /= 2;
        }
        while i < last {
            root.set_allowed(&id.flip_bit(i), i, 1, 0);
            i += 1;
        }

        PrefixTree {
            id,
            prune_threshold: bucket_size.max(1),
            root: RwLock::new(root),
        }
    }

    // === Options ===

    /// Overflow that has to accumulate before [Self::maybe_prune] evicts anything.
    ///
    /// Defaults to the `bucket_size`.
    pub fn with_prune_threshold(mut self, threshold: usize) -> Self {
        self.prune_threshold = threshold.max(1);
        self
    }

    // === Getters ===

    /// Returns the [Id] of the owner of this tree.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Number of stored ids.
    pub fn len(&self) -> usize {
        self.read().descendants
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The largest overflow of any bucket since the last prune.
    pub fn to_prune(&self) -> usize {
        self.read().to_prune
    }

    // === Public Methods ===

    /// Insert an id, returns `true` if it wasn't already stored.
    pub fn insert(&self, id: &Id) -> bool {
        if id.len() != self.id.len() {
            return false;
        }

        self.write().insert(id, 0)
    }

    /// Remove an id, returns `true` if it was stored.
    pub fn remove(&self, id: &Id) -> bool {
        if id.len() != self.id.len() {
            return false;
        }

        self.write().remove_node(id, 0)
    }

    /// Returns the stored id closest to `target`.
    pub fn search(&self, target: &Id) -> Option<Id> {
        if target.len() != self.id.len() {
            return None;
        }

        self.read().search(target, 0).cloned()
    }

    /// Returns up to `n` stored ids ordered by their distance to the `target`.
    ///
    /// If `closer_than` is set, only ids whose distance to the target is
    /// strictly smaller are returned.
    pub fn search_n(&self, target: &Id, n: usize, closer_than: Option<&Id>) -> Vec<Id> {
        let mut found = Vec::with_capacity(n);

        if target.len() != self.id.len() || n == 0 {
            return found;
        }

        self.read().search_n(target, n, closer_than, 0, &mut found);
        found.truncate(n);

        found
    }

    /// Evict ids from every bucket holding more than its capacity.
    ///
    /// Returns how many ids were evicted.
    pub fn prune(&self) -> usize {
        let mut root = self.write();

        let before = root.descendants;
        root.prune(0, false, &self.id, 0);
        let evicted = before - root.descendants;

        debug!(evicted, remaining = root.descendants, "Pruned prefix tree");

        evicted
    }

    /// Run [Self::prune] only once the accumulated overflow reached the prune threshold.
    pub fn maybe_prune(&self) -> usize {
        if self.to_prune() >= self.prune_threshold {
            self.prune()
        } else {
            0
        }
    }

    /// Export an owned vector of all stored ids.
    pub fn ids(&self) -> Vec<Id> {
        let root = self.read();
        let mut ids = Vec::with_capacity(root.descendants);
        root.collect(&mut ids);

        ids
    }

    // === Private Methods ===

    fn read(&self) -> RwLockReadGuard<'_, Branch> {
        self.root.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Branch> {
        self.root.write().unwrap_or_else(PoisonError::into_inner)
    }
}
