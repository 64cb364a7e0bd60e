use std::cmp::Reverse;

use bincode::{Decode, Encode};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// Common surface of everything the matcher can compare: particles and interactions,
/// reconstructed or truth.
///
/// Geometry is read-only; the only mutable state exposed here is the ranked match list
/// and the principal-match flag written by the matcher.
pub trait RecoObject {
    fn id(&self) -> i64;
    fn is_truth(&self) -> bool;
    /// Voxel indices into the global image tensor.
    fn index(&self) -> &[i64];
    /// Voxel coordinates, aligned with `index`.
    fn points(&self) -> &[[f32; 3]];
    /// Per-voxel energy depositions, aligned with `index`.
    fn depositions(&self) -> &[f32];
    fn size(&self) -> usize {
        self.index().len()
    }
    fn match_list(&self) -> &MatchList;
    fn match_list_mut(&mut self) -> &mut MatchList;
    fn is_principal_match(&self) -> bool;
    fn set_principal_match(&mut self, value: bool);
}

/// Ranked list of matched object ids with their overlap scores.
///
/// Entries are read out sorted by score, highest first. Entries with equal scores keep
/// the order in which their ids were first registered. Writing a score for an id that
/// is already present replaces the old score (last write wins) without moving the id
/// in the registry order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct MatchList {
    entries: Vec<(i64, f64)>,
}

impl MatchList {
    pub fn new() -> Self {
        MatchList { entries: Vec::new() }
    }

    /// Builds a ranked list from `(id, score)` pairs, applying last-write-wins for repeated ids.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use recocore::data::match_list::MatchList;
    /// let list = MatchList::from_pairs(vec![(3, 0.2), (5, 0.9), (3, 0.6)]);
    /// assert_eq!(list.ids(), vec![5, 3]);
    /// assert_eq!(list.scores(), vec![0.9, 0.6]);
    /// ```
    pub fn from_pairs(pairs: impl IntoIterator<Item = (i64, f64)>) -> Self {
        let mut list = MatchList::new();
        for (id, score) in pairs {
            list.insert(id, score);
        }
        list
    }

    /// Records `score` for `id`.
    pub fn insert(&mut self, id: i64, score: f64) {
        match self.entries.iter_mut().find(|(m, _)| *m == id) {
            Some(entry) => entry.1 = score,
            None => self.entries.push((id, score)),
        }
    }

    // stable, so ties keep registry order
    fn ranked(&self) -> Vec<(i64, f64)> {
        let mut ranked = self.entries.clone();
        ranked.sort_by_key(|&(_, s)| Reverse(OrderedFloat(s)));
        ranked
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> Vec<i64> {
        self.ranked().into_iter().map(|(id, _)| id).collect()
    }

    pub fn scores(&self) -> Vec<f64> {
        self.ranked().into_iter().map(|(_, s)| s).collect()
    }

    /// Entries in rank order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, f64)> {
        self.ranked().into_iter()
    }

    pub fn get(&self, id: i64) -> Option<f64> {
        self.entries.iter().find(|(m, _)| *m == id).map(|&(_, s)| s)
    }

    /// Highest ranked entry, if any.
    pub fn best(&self) -> Option<(i64, f64)> {
        self.ranked().first().copied()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_ranking() {
        let mut list = MatchList::new();
        list.insert(1, 0.3);
        list.insert(2, 0.8);
        list.insert(3, 0.5);
        assert_eq!(list.ids(), vec![2, 3, 1]);
        assert_eq!(list.best(), Some((2, 0.8)));
    }

    #[test]
    fn test_ties_keep_registry_order() {
        let list = MatchList::from_pairs(vec![(7, 0.5), (4, 0.5), (9, 0.5)]);
        assert_eq!(list.ids(), vec![7, 4, 9]);
    }

    #[test]
    fn test_last_write_wins() {
        let mut list = MatchList::new();
        list.insert(1, 0.9);
        list.insert(2, 0.4);
        list.insert(1, 0.1);
        assert_eq!(list.len(), 2);
        assert_eq!(list.get(1), Some(0.1));
        assert_eq!(list.ids(), vec![2, 1]);
    }

    #[test]
    fn test_rewrite_keeps_registry_position() {
        let mut list = MatchList::new();
        list.insert(1, 0.3);
        list.insert(2, 0.8);
        list.insert(1, 0.8);
        assert_eq!(list.ids(), vec![1, 2]);
    }

    #[test]
    fn test_clear() {
        let mut list = MatchList::from_pairs(vec![(1, 0.2)]);
        assert!(!list.is_empty());
        list.clear();
        assert!(list.is_empty());
        assert_eq!(list.best(), None);
    }
}
