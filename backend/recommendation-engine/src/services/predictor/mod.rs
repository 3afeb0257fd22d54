// ============================================
// Rating Predictor (k-NN 評分預測)
// ============================================
//
// User-based collaborative filtering estimate for an unseen (user, item):
// 1. Candidates = every other user with a nonzero weight on the item
// 2. Keep the k most similar (bounded min-heap, O(n log k))
// 3. Similarity-weighted average over neighbours with similarity > 0
//
// Neighbours with non-positive similarity still occupy a top-k slot but do
// not contribute. No candidates, or no positive neighbour, yields 0.0.

use crate::error::{RecommendError, Result};
use crate::services::matrix::InteractionMatrix;
use crate::services::similarity::SimilarityMatrix;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use tracing::debug;

pub const DEFAULT_NEIGHBORS_K: usize = 10;

/// A candidate neighbour. Ordered so that "greater" means "kept first":
/// higher similarity, then lower user index.
#[derive(Debug, Clone, Copy)]
pub struct Neighbor {
    pub user_idx: usize,
    pub similarity: f64,
    pub rating: f64,
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.similarity
            .total_cmp(&other.similarity)
            .then_with(|| other.user_idx.cmp(&self.user_idx))
    }
}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Neighbor {}

/// k-nearest-neighbour rating predictor
#[derive(Debug, Clone, Copy)]
pub struct RatingPredictor {
    k: usize,
}

impl Default for RatingPredictor {
    fn default() -> Self {
        Self {
            k: DEFAULT_NEIGHBORS_K,
        }
    }
}

impl RatingPredictor {
    pub fn new(k: usize) -> Self {
        Self { k }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// The k best neighbours of `user_idx` among users who interacted with
    /// `item_idx`, best first
    pub fn neighbors(
        &self,
        matrix: &InteractionMatrix,
        similarity: &SimilarityMatrix,
        user_idx: usize,
        item_idx: usize,
    ) -> Result<Vec<Neighbor>> {
        check_dimensions(matrix, similarity)?;
        matrix.check_user(user_idx)?;
        matrix.check_item(item_idx)?;

        if self.k == 0 {
            return Ok(Vec::new());
        }

        let similarities = similarity.row(user_idx);
        let mut heap: BinaryHeap<Reverse<Neighbor>> = BinaryHeap::with_capacity(self.k + 1);

        for (other, &rating) in matrix.item_column(item_idx).iter().enumerate() {
            if other == user_idx || rating == 0.0 {
                continue;
            }

            heap.push(Reverse(Neighbor {
                user_idx: other,
                similarity: similarities[other],
                rating,
            }));
            if heap.len() > self.k {
                heap.pop();
            }
        }

        // into_sorted_vec on Reverse yields best neighbour first
        Ok(heap.into_sorted_vec().into_iter().map(|Reverse(n)| n).collect())
    }

    /// Predicted affinity of `user_idx` for `item_idx`
    pub fn predict(
        &self,
        matrix: &InteractionMatrix,
        similarity: &SimilarityMatrix,
        user_idx: usize,
        item_idx: usize,
    ) -> Result<f64> {
        let neighbors = self.neighbors(matrix, similarity, user_idx, item_idx)?;
        if neighbors.is_empty() {
            return Ok(0.0);
        }

        let (weighted_sum, similarity_sum) = neighbors
            .iter()
            .filter(|n| n.similarity > 0.0)
            .fold((0.0, 0.0), |(ws, ss), n| {
                (ws + n.similarity * n.rating, ss + n.similarity.abs())
            });

        if similarity_sum > 0.0 {
            Ok(weighted_sum / similarity_sum)
        } else {
            debug!(
                user_idx,
                item_idx,
                neighbors = neighbors.len(),
                "No positive-similarity neighbour"
            );
            Ok(0.0)
        }
    }
}

/// Predict with an explicit neighbourhood size
pub fn predict(
    matrix: &InteractionMatrix,
    similarity: &SimilarityMatrix,
    user_idx: usize,
    item_idx: usize,
    k: usize,
) -> Result<f64> {
    RatingPredictor::new(k).predict(matrix, similarity, user_idx, item_idx)
}

fn check_dimensions(matrix: &InteractionMatrix, similarity: &SimilarityMatrix) -> Result<()> {
    if similarity.len() != matrix.n_users() {
        return Err(RecommendError::DimensionMismatch {
            context: "user similarity vs interaction rows",
            expected: matrix.n_users(),
            actual: similarity.len(),
        });
    }
    Ok(())
}
