//! Threshold-gated similarity vote over an embeddings store.

use crate::store::EmbeddingsStore;
use crate::types::{Classification, Embedding};
use rayon::prelude::*;

/// Largest cosine distance that still counts as a vote.
pub const DEFAULT_DISTANCE_THRESHOLD: f64 = 0.5;

/// Strategy for naming the identity behind a query embedding.
pub trait Matcher: Send + Sync {
    /// `None` when no label in the store is close enough.
    fn classify(&self, query: &Embedding, store: &EmbeddingsStore) -> Option<Classification>;
}

/// Votes one label collected for a query.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LabelVotes {
    pub votes: usize,
    /// Sum of the distances that qualified as votes.
    pub accumulated: f64,
}

impl LabelVotes {
    /// Mean qualifying distance; `None` without votes.
    pub fn ratio(&self) -> Option<f64> {
        (self.votes > 0).then(|| self.accumulated / self.votes as f64)
    }
}

/// Per-label vote matcher.
///
/// Every reference embedding within `threshold` (inclusive) of the query is a
/// vote for its label. The label with the lowest mean voting distance wins
/// with confidence `1 - mean`. Labels without votes, or with a mean of 1 or
/// more, are never candidates. Equal means resolve to the label that sorts
/// first. A query whose dimension differs from the store's matches nothing.
#[derive(Debug, Clone)]
pub struct VotingMatcher {
    threshold: f64,
}

impl VotingMatcher {
    /// The threshold is clamped to `[0, 1]`.
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Count the votes a set of reference embeddings gives a query.
    pub fn tally(&self, query: &Embedding, references: &[Embedding]) -> LabelVotes {
        references
            .iter()
            .map(|reference| reference.distance(query))
            .filter(|&distance| distance <= self.threshold)
            .fold(LabelVotes::default(), |acc, distance| LabelVotes {
                votes: acc.votes + 1,
                accumulated: acc.accumulated + distance,
            })
    }
}

impl Default for VotingMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_DISTANCE_THRESHOLD)
    }
}

impl Matcher for VotingMatcher {
    fn classify(&self, query: &Embedding, store: &EmbeddingsStore) -> Option<Classification> {
        if let Some(dimension) = store.dimension().filter(|&d| d != query.dimension()) {
            tracing::warn!(dimension, query = query.dimension(), "query dimension does not match store");
            return None;
        }

        let labels: Vec<(&str, &[Embedding])> = store.iter().collect();

        // Order is preserved by collect, so the scan below sees sorted labels.
        let ratios: Vec<Option<f64>> = labels
            .par_iter()
            .map(|(_, references)| self.tally(query, references).ratio())
            .collect();

        let mut best: Option<(&str, f64)> = None;
        for (&(label, _), ratio) in labels.iter().zip(ratios) {
            let Some(ratio) = ratio.filter(|&r| r < 1.0) else {
                continue;
            };
            match best {
                Some((_, best_ratio)) if ratio >= best_ratio => {}
                _ => best = Some((label, ratio)),
            }
        }

        let (label, ratio) = best?;
        tracing::debug!(label, ratio, "query classified");
        Some(Classification {
            label: label.to_string(),
            confidence: 1.0 - ratio,
        })
    }
}
