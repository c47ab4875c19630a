//! Class balancing: pads the labeled set with pool embeddings so the unknown
//! class is never missing or token-sized.

use crate::pool::UnknownPool;
use crate::types::{Embedding, Label, Observation};
use std::collections::BTreeSet;

/// Label distribution of a set of observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelCounts {
    pub num_unknown: usize,
    pub num_identified: usize,
    /// Distinct non-unknown labels.
    pub num_identities: usize,
}

impl LabelCounts {
    pub fn of(labels: impl IntoIterator<Item = Label>) -> Self {
        let mut num_unknown = 0;
        let mut num_identified = 0;
        let mut identities = BTreeSet::new();
        for label in labels {
            if label.is_unknown() {
                num_unknown += 1;
            } else {
                num_identified += 1;
                identities.insert(label);
            }
        }
        Self {
            num_unknown,
            num_identified,
            num_identities: identities.len(),
        }
    }

    /// Number of pool samples to add: `floor(identified / identities) - unknown`.
    ///
    /// `None` when there are no identities, in which case balancing is undefined.
    pub fn augmentation_target(&self) -> Option<i64> {
        if self.num_identities == 0 {
            return None;
        }
        let per_identity = (self.num_identified / self.num_identities) as i64;
        Some(per_identity - self.num_unknown as i64)
    }
}

/// Rows and labels ready for fitting. Pool rows are borrowed, never copied
/// into the cache.
#[derive(Debug, Clone)]
pub struct TrainingSet<'a> {
    pub rows: Vec<&'a Embedding>,
    pub labels: Vec<Label>,
    pub counts: LabelCounts,
    /// How many pool embeddings were appended.
    pub augmented: usize,
}

impl TrainingSet<'_> {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct labels in ascending order (unknown first).
    pub fn classes(&self) -> Vec<Label> {
        let set: BTreeSet<Label> = self.labels.iter().copied().collect();
        set.into_iter().collect()
    }
}

/// Build a balanced training set, or `None` if no observation carries an identity.
///
/// Pool samples are taken from the front of the pool on every call.
pub fn balance<'a, I>(observations: I, pool: &'a UnknownPool) -> Option<TrainingSet<'a>>
where
    I: IntoIterator<Item = &'a Observation>,
{
    let (mut rows, mut labels): (Vec<&Embedding>, Vec<Label>) = observations
        .into_iter()
        .map(|obs| (&obs.embedding, obs.label))
        .unzip();

    let counts = LabelCounts::of(labels.iter().copied());
    let target = counts.augmentation_target()?;

    let mut augmented = 0;
    if target > 0 {
        let extra = pool.prefix(target as usize);
        augmented = extra.len();
        if augmented < target as usize {
            tracing::warn!(
                target,
                available = pool.len(),
                "unknown pool smaller than augmentation target"
            );
        }
        rows.extend(extra.iter());
        labels.extend(std::iter::repeat(Label::UNKNOWN).take(augmented));
        tracing::debug!(augmented, "augmenting with unknown pool samples");
    }

    Some(TrainingSet {
        rows,
        labels,
        counts,
        augmented,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(label: Label) -> Observation {
        Observation {
            embedding: Embedding::from_values(vec![0.0, 0.0]),
            label,
        }
    }

    fn pool(n: usize) -> UnknownPool {
        UnknownPool::new(2, (0..n).map(|i| vec![i as f32, 1.0]).collect()).unwrap()
    }

    #[test]
    fn test_counts() {
        let labels = [Label::UNKNOWN, Label::person(0), Label::person(0), Label::person(3)];
        let c = LabelCounts::of(labels);
        assert_eq!(c.num_unknown, 1);
        assert_eq!(c.num_identified, 3);
        assert_eq!(c.num_identities, 2);
    }

    #[test]
    fn test_balancer_arithmetic() {
        // 10 identified over 2 identities, 2 unknown → floor(10/2) - 2 = 3
        let mut set = Vec::new();
        set.extend((0..6).map(|_| obs(Label::person(0))));
        set.extend((0..4).map(|_| obs(Label::person(1))));
        set.extend((0..2).map(|_| obs(Label::UNKNOWN)));
        let pool = pool(8);

        let ts = balance(&set, &pool).unwrap();
        assert_eq!(ts.counts.augmentation_target(), Some(3));
        assert_eq!(ts.augmented, 3);
        assert_eq!(ts.len(), 15);
        assert_eq!(ts.labels.iter().filter(|l| l.is_unknown()).count(), 5);
        // Prefix-take: pool rows 0, 1, 2 in order
        let tail: Vec<f32> = ts.rows[12..].iter().map(|e| e.values()[0]).collect();
        assert_eq!(tail, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_each_run_restarts_from_pool_front() {
        let set = vec![obs(Label::person(0)), obs(Label::person(0))];
        let pool = pool(5);
        let first = balance(&set, &pool).unwrap();
        let second = balance(&set, &pool).unwrap();
        assert_eq!(first.augmented, 2);
        assert_eq!(first.rows[2].values(), second.rows[2].values());
        assert_eq!(first.rows[2].values()[0], 0.0);
    }

    #[test]
    fn test_no_augmentation_when_target_not_positive() {
        let set = vec![
            obs(Label::person(0)),
            obs(Label::person(0)),
            obs(Label::UNKNOWN),
            obs(Label::UNKNOWN),
            obs(Label::UNKNOWN),
        ];
        let pool = pool(5);
        let ts = balance(&set, &pool).unwrap();
        assert_eq!(ts.augmented, 0);
        assert_eq!(ts.len(), 5);
    }

    #[test]
    fn test_zero_identities_is_undefined() {
        let set = vec![obs(Label::UNKNOWN), obs(Label::UNKNOWN)];
        assert!(balance(&set, &pool(5)).is_none());
        let empty: Vec<Observation> = Vec::new();
        assert!(balance(&empty, &pool(5)).is_none());
    }

    #[test]
    fn test_short_pool_uses_what_it_has() {
        let set: Vec<Observation> = (0..4).map(|_| obs(Label::person(0))).collect();
        let pool = pool(1);
        let ts = balance(&set, &pool).unwrap();
        assert_eq!(ts.augmented, 1);
        assert_eq!(ts.classes(), vec![Label::UNKNOWN, Label::person(0)]);
    }
}
