use std::cmp::Reverse;

use ordered_float::OrderedFloat;
use serde::Serialize;

use crate::algorithm::matching::MatchRows;
use crate::data::match_list::{MatchList, RecoObject};

/// Explicit `(truth, pred)` match pairs with aligned scores.
///
/// `None` on either side marks an object without a match; such rows carry a score of `-1`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MatchPairs {
    pub pairs: Vec<(Option<i64>, Option<i64>)>,
    pub counts: Vec<f64>,
}

impl MatchPairs {
    pub fn new() -> Self {
        MatchPairs { pairs: Vec::new(), counts: Vec::new() }
    }

    pub fn push(&mut self, truth: Option<i64>, pred: Option<i64>, score: f64) {
        self.pairs.push((truth, pred));
        self.counts.push(score);
    }

    pub fn extend(&mut self, other: MatchPairs) {
        self.pairs.extend(other.pairs);
        self.counts.extend(other.counts);
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Orients matcher rows whose sources were truth objects.
    pub fn from_truth_rows(rows: MatchRows) -> Self {
        let (pairs, counts) = rows;
        MatchPairs {
            pairs: pairs.into_iter().map(|(t, p)| (Some(t), p)).collect(),
            counts,
        }
    }

    /// Orients matcher rows whose sources were predicted objects.
    pub fn from_pred_rows(rows: MatchRows) -> Self {
        let (pairs, counts) = rows;
        MatchPairs {
            pairs: pairs.into_iter().map(|(p, t)| (t, Some(p))).collect(),
            counts,
        }
    }
}

/// Match pairs per direction; a direction that was not run stays `None`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MatchReport {
    /// Pairs read from the truth objects' match lists (`t2r`).
    pub true_to_pred: Option<MatchPairs>,
    /// Pairs read from the predicted objects' match lists (`r2t`).
    pub pred_to_true: Option<MatchPairs>,
}

/// Flattens the ranked match lists of both collections into explicit pairs.
///
/// # Returns
///
/// `(t2r, r2t)`: pairs read from the truth objects' lists and from the predicted
/// objects' lists, both oriented `(truth, pred)`. Every object appears at least once.
pub fn generate_match_pairs<'a, T, P>(
    truth: impl IntoIterator<Item = &'a T>,
    pred: impl IntoIterator<Item = &'a P>,
) -> (MatchPairs, MatchPairs)
where
    T: RecoObject + ?Sized + 'a,
    P: RecoObject + ?Sized + 'a,
{
    let mut t2r = MatchPairs::new();
    for t in truth {
        if t.match_list().is_empty() {
            t2r.push(Some(t.id()), None, -1.0);
        }
        for (m, score) in t.match_list().iter() {
            t2r.push(Some(t.id()), Some(m), score);
        }
    }

    let mut r2t = MatchPairs::new();
    for p in pred {
        if p.match_list().is_empty() {
            r2t.push(None, Some(p.id()), -1.0);
        }
        for (m, score) in p.match_list().iter() {
            r2t.push(Some(m), Some(p.id()), score);
        }
    }
    (t2r, r2t)
}

/// Reads out an object's ranked match list as `(ids, scores)`.
pub fn reconcile<O: RecoObject + ?Sized>(object: &O) -> (Vec<i64>, Vec<f64>) {
    let list = object.match_list();
    (list.ids(), list.scores())
}

/// Merges the match candidates accumulated on several objects into one ranked registry.
///
/// # Description
///
/// A candidate seen more than once keeps the score written last. The result is sorted
/// by score, highest first, with ties in the order candidates were first registered.
/// With `clear`, every object's match state is wiped after it has been read.
///
/// # Example
///
/// ```rust
/// # use recocore::data::particle::Particle;
/// # use recocore::data::match_list::RecoObject;
/// # use recocore::algorithm::pairs::dedupe_and_clear;
/// let mut a = Particle::new(0, 0, vec![], vec![], vec![]);
/// let mut b = Particle::new(1, 0, vec![], vec![], vec![]);
/// a.match_list_mut().insert(7, 0.9);
/// b.match_list_mut().insert(7, 0.2);
/// b.match_list_mut().insert(8, 0.5);
/// let (ids, scores) = dedupe_and_clear(vec![&mut a, &mut b], true);
/// assert_eq!(ids, vec![8, 7]);
/// assert_eq!(scores, vec![0.5, 0.2]);
/// assert!(a.match_list().is_empty());
/// ```
pub fn dedupe_and_clear<'a, O, I>(objects: I, clear: bool) -> (Vec<i64>, Vec<f64>)
where
    O: RecoObject + ?Sized + 'a,
    I: IntoIterator<Item = &'a mut O>,
{
    let mut registry: Vec<(i64, f64)> = Vec::new();
    for object in objects {
        for (m, score) in object.match_list().iter() {
            match registry.iter_mut().find(|(id, _)| *id == m) {
                Some(entry) => entry.1 = score,
                None => registry.push((m, score)),
            }
        }
        if clear {
            object.match_list_mut().clear();
            object.set_principal_match(false);
        }
    }

    registry.sort_by_key(|&(_, s)| Reverse(OrderedFloat(s)));
    registry.into_iter().unzip()
}

/// Rebuilds a [`MatchList`] from reconciled `(ids, scores)`.
pub fn to_match_list(ids: &[i64], scores: &[f64]) -> MatchList {
    MatchList::from_pairs(ids.iter().copied().zip(scores.iter().copied()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::particle::Particle;

    fn particle(id: i64, truth: bool, matches: &[(i64, f64)]) -> Particle {
        let mut p = Particle::new(id, 0, vec![id], vec![[0.0; 3]], vec![1.0]);
        if truth {
            p = p.truth();
        }
        for &(m, s) in matches {
            p.match_list_mut().insert(m, s);
        }
        p
    }

    #[test]
    fn test_generate_match_pairs() {
        let truth = vec![particle(0, true, &[(10, 0.9), (11, 0.3)]), particle(1, true, &[])];
        let pred = vec![particle(10, false, &[(0, 0.9)]), particle(11, false, &[])];

        let (t2r, r2t) = generate_match_pairs(&truth, &pred);
        assert_eq!(t2r.pairs, vec![(Some(0), Some(10)), (Some(0), Some(11)), (Some(1), None)]);
        assert_eq!(t2r.counts, vec![0.9, 0.3, -1.0]);
        assert_eq!(r2t.pairs, vec![(Some(0), Some(10)), (None, Some(11))]);
        assert_eq!(r2t.counts, vec![0.9, -1.0]);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let p = particle(0, false, &[(3, 0.2), (4, 0.6), (5, 0.6)]);
        let first = reconcile(&p);
        let second = reconcile(&p);
        assert_eq!(first, second);
        assert_eq!(first.0, vec![4, 5, 3]);
    }

    #[test]
    fn test_dedupe_last_write_wins() {
        let mut a = particle(0, false, &[(1, 0.9), (2, 0.4)]);
        let mut b = particle(1, false, &[(1, 0.1), (3, 0.4)]);
        let (ids, scores) = dedupe_and_clear(vec![&mut a, &mut b], false);
        assert_eq!(ids, vec![2, 3, 1]);
        assert_eq!(scores, vec![0.4, 0.4, 0.1]);
        assert_eq!(a.match_list().len(), 2);

        let again = dedupe_and_clear(vec![&mut a, &mut b], true);
        assert_eq!(again, (ids, scores));
        assert!(a.match_list().is_empty());
        assert!(b.match_list().is_empty());
        assert_eq!(dedupe_and_clear(vec![&mut a, &mut b], false), (vec![], vec![]));
    }

    #[test]
    fn test_row_orientation() {
        let rows = (vec![(5, Some(6)), (7, None)], vec![0.5, -1.0]);
        let t2r = MatchPairs::from_truth_rows(rows.clone());
        assert_eq!(t2r.pairs, vec![(Some(5), Some(6)), (Some(7), None)]);
        let r2t = MatchPairs::from_pred_rows(rows);
        assert_eq!(r2t.pairs, vec![(Some(6), Some(5)), (None, Some(7))]);
    }

    #[test]
    fn test_to_match_list() {
        let list = to_match_list(&[4, 2], &[0.3, 0.8]);
        assert_eq!(list.ids(), vec![2, 4]);
    }
}
