//! Capacity bounded set of ids, sorted by their XOR distance to a pivot.

use tracing::trace;

use crate::common::Id;

#[derive(Debug, Clone)]
/// Ids sorted by ascending distance to a fixed pivot.
///
/// Serves as a k-bucket when the pivot is the owner's id with one bit flipped,
/// and as the unbounded candidates queue of a lookup when the pivot is its target.
pub struct NeighborList {
    pivot: Id,
    capacity: Option<usize>,
    /// `(distance to pivot, id)`, strictly increasing by distance.
    entries: Vec<(Id, Id)>,
}

impl NeighborList {
    /// Create a list holding at most `capacity` ids.
    pub fn new(pivot: Id, capacity: usize) -> Self {
        Self {
            pivot,
            capacity: Some(capacity),
            entries: Vec::new(),
        }
    }

    /// Create a list without an upper bound.
    pub fn unbounded(pivot: Id) -> Self {
        Self {
            pivot,
            capacity: None,
            entries: Vec::new(),
        }
    }

    // === Getters ===

    pub fn pivot(&self) -> &Id {
        &self.pivot
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.capacity
            .map(|capacity| self.entries.len() >= capacity)
            .unwrap_or(false)
    }

    pub fn get(&self, index: usize) -> Option<&Id> {
        self.entries.get(index).map(|(_, id)| id)
    }

    /// Iterate over ids from the closest to the farthest from the pivot.
    pub fn iter(&self) -> impl Iterator<Item = &Id> {
        self.entries.iter().map(|(_, id)| id)
    }

    pub fn to_vec(&self) -> Vec<Id> {
        self.iter().cloned().collect()
    }

    // === Public Methods ===

    /// Add an id, returns `true` if it was inserted.
    ///
    /// A full list only accepts ids strictly closer to the pivot than its
    /// farthest entry, which is then dropped.
    pub fn add(&mut self, id: Id) -> bool {
        match self.probe(&id) {
            Some(index) => self.insert_at(id, index),
            None => false,
        }
    }

    /// Remove an id, returns `true` if it was found.
    pub fn remove(&mut self, id: &Id) -> bool {
        if id.len() != self.pivot.len() {
            return false;
        }

        let index = self.search(&self.pivot.distance(id));

        if index > 0 && &self.entries[index - 1].1 == id {
            self.entries.remove(index - 1);
            return true;
        }

        false
    }

    /// Returns the id closest to `target`.
    pub fn nearest(&self, target: &Id) -> Option<&Id> {
        if target.len() != self.pivot.len() {
            return None;
        }

        // Sorted by distance to the pivot, so the first entry is the answer.
        if target == &self.pivot {
            return self.get(0);
        }

        self.iter()
            .reduce(|best, id| if target.is_closer(id, best) { id } else { best })
    }

    // === Crate Methods ===

    /// Compute the index `id` would be inserted at, or `None` if it would be rejected.
    pub(crate) fn probe(&self, id: &Id) -> Option<usize> {
        if id.len() != self.pivot.len() {
            return None;
        }

        let index = self.search(&self.pivot.distance(id));

        if index > 0 && &self.entries[index - 1].1 == id {
            return None;
        }

        if self.is_full() && index == self.entries.len() {
            return None;
        }

        Some(index)
    }

    /// Insert `id` at `hint` if the hint still sorts it between its neighbors,
    /// otherwise find its position again.
    ///
    /// The hint comes from [Self::probe], possibly against an older state of the list.
    pub(crate) fn insert_at(&mut self, id: Id, hint: usize) -> bool {
        let distance = self.pivot.distance(&id);

        let fits = hint <= self.entries.len()
            && (hint == 0 || self.entries[hint - 1].0 < distance)
            && (hint == self.entries.len() || self.entries[hint].0 > distance);

        let index = if fits && !(self.is_full() && hint == self.entries.len()) {
            hint
        } else {
            trace!(?id, hint, "Stale insertion index, retrying");

            match self.probe(&id) {
                Some(index) => index,
                None => return false,
            }
        };

        self.entries.insert(index, (distance, id));

        if let Some(capacity) = self.capacity {
            self.entries.truncate(capacity);
        }

        true
    }

    // === Private Methods ===

    /// Index of the first entry farther than `distance`.
    fn search(&self, distance: &Id) -> usize {
        self.entries.partition_point(|(d, _)| d <= distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(bytes: &[u8]) -> Id {
        Id::from_bytes(bytes).unwrap()
    }

    #[test]
    fn add_and_remove() {
        let mut list = NeighborList::new(id(&[1, 4, 16]), 3);

        let ids = [
            id(&[4, 55, 55]),
            id(&[2, 55, 55]),
            id(&[8, 55, 55]),
            id(&[16, 55, 55]),
        ];

        assert!(list.add(ids[0].clone()));
        assert!(!list.add(ids[0].clone()));

        assert!(list.add(ids[1].clone()));
        assert_eq!(list.get(0), Some(&ids[1]));
        assert_eq!(list.get(1), Some(&ids[0]));

        assert!(list.add(ids[2].clone()));
        assert_eq!(list.get(2), Some(&ids[2]));

        // Full, and farther than everything in the list.
        assert!(!list.add(ids[3].clone()));
        assert_eq!(list.len(), 3);

        assert!(list.remove(&ids[2]));
        assert_eq!(list.len(), 2);
        assert!(!list.remove(&ids[2]));
        assert!(list.remove(&ids[1]));
        assert_eq!(list.len(), 1);

        assert!(list.add(ids[3].clone()));
        assert_eq!(list.to_vec(), vec![ids[0].clone(), ids[3].clone()]);
    }

    #[test]
    fn full_list_keeps_closest() {
        let mut list = NeighborList::new(id(&[0, 0]), 2);

        list.add(id(&[0, 8]));
        list.add(id(&[0, 4]));
        assert!(list.add(id(&[0, 1])));

        assert_eq!(list.to_vec(), vec![id(&[0, 1]), id(&[0, 4])]);
    }

    #[test]
    fn wrong_length_is_rejected() {
        let mut list = NeighborList::unbounded(id(&[1, 2, 3]));

        assert!(!list.add(id(&[1, 2])));
        assert!(!list.remove(&id(&[1, 2])));
        assert_eq!(list.nearest(&id(&[1, 2])), None);
        assert!(list.is_empty());
    }

    #[test]
    fn nearest() {
        let mut list = NeighborList::new(id(&[1, 4, 16]), 3);

        let ids = [id(&[4, 55, 55]), id(&[16, 55, 55]), id(&[64, 55, 55])];
        for id in &ids {
            list.add(id.clone());
        }

        assert_eq!(list.nearest(&id(&[1, 4, 16])), Some(&ids[0]));
        assert_eq!(list.nearest(&id(&[4, 55, 54])), Some(&ids[0]));
        assert_eq!(list.nearest(&id(&[16, 55, 56])), Some(&ids[1]));
        assert_eq!(list.nearest(&id(&[67, 55, 56])), Some(&ids[2]));

        assert_eq!(NeighborList::unbounded(id(&[0])).nearest(&id(&[1])), None);
    }

    #[test]
    fn nearest_to_pivot_matches_linear_scan() {
        for _ in 0..100 {
            let pivot = Id::random(6);
            let mut list = NeighborList::new(pivot.clone(), 8);

            for _ in 0..16 {
                list.add(Id::random(6));
            }

            let linear = list
                .iter()
                .min_by(|a, b| pivot.distance_cmp(a, b))
                .cloned();

            assert_eq!(list.nearest(&pivot).cloned(), linear);
        }
    }

    #[test]
    fn add_fuzz() {
        let capacity = 8;

        for _ in 0..100 {
            let mut list = NeighborList::new(Id::random(10), capacity);

            for _ in 0..capacity * 2 {
                let id = Id::random(10);
                list.add(id.clone());
                list.add(id);

                assert!(list.len() <= capacity);

                for pair in list.entries.windows(2) {
                    assert!(pair[0].0 < pair[1].0);
                }
                for (distance, id) in &list.entries {
                    assert_eq!(distance, &list.pivot.distance(id));
                }
            }
        }
    }

    #[test]
    fn stale_hint_is_retried() {
        let mut list = NeighborList::unbounded(id(&[0]));

        let hint = list.probe(&id(&[8])).unwrap();
        assert_eq!(hint, 0);

        list.add(id(&[1]));
        list.add(id(&[2]));

        assert!(list.insert_at(id(&[8]), hint));
        assert_eq!(list.to_vec(), vec![id(&[1]), id(&[2]), id(&[8])]);

        // A stale hint can't smuggle in a duplicate.
        assert!(!list.insert_at(id(&[2]), 0));
        assert_eq!(list.len(), 3);
    }
}
