// ============================================
// Recommendation Aggregator (混合推薦排序)
// ============================================
//
// Blends collaborative and content-based scores for every item the user has
// not interacted with (cell == 0):
//
//   score = cf_weight * knn_prediction + content_weight * content_score
//
// content_score is the seed-weighted mean content similarity between the
// candidate and the items the user liked or purchased. Purchases weigh more.
// Blended scores are clamped at zero; anything <= 0 is dropped. Results are
// ordered by score descending, then item index ascending.

use crate::error::{RecommendError, Result};
use crate::models::{InteractionType, RecommendationCandidate, RecommendationReason};
use crate::services::matrix::InteractionMatrix;
use crate::services::predictor::RatingPredictor;
use crate::services::similarity::SimilarityMatrix;
use crate::utils::rank_order;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Mixing weights for the hybrid blend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HybridWeights {
    pub collaborative: f64,
    pub content: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self::balanced()
    }
}

impl HybridWeights {
    pub fn new(collaborative: f64, content: f64) -> Self {
        Self {
            collaborative,
            content,
        }
    }

    /// Equal weight for both signals
    pub fn balanced() -> Self {
        Self::new(0.5, 0.5)
    }

    /// Blended score, never below zero
    pub fn blend(&self, collaborative_score: f64, content_score: f64) -> f64 {
        (self.collaborative * collaborative_score + self.content * content_score).max(0.0)
    }
}

/// Weight of each positive seed in the content score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeedWeights {
    pub like: f64,
    pub purchase: f64,
}

impl Default for SeedWeights {
    fn default() -> Self {
        Self {
            like: 3.0,
            purchase: 5.0,
        }
    }
}

impl SeedWeights {
    fn weight_for(&self, interaction_type: InteractionType) -> f64 {
        match interaction_type {
            InteractionType::Purchase => self.purchase,
            _ => self.like,
        }
    }
}

pub struct RecommendationAggregator<'a> {
    matrix: &'a InteractionMatrix,
    user_similarity: &'a SimilarityMatrix,
    content_similarity: Option<&'a SimilarityMatrix>,
    predictor: RatingPredictor,
    weights: HybridWeights,
    seed_weights: SeedWeights,
}

impl<'a> RecommendationAggregator<'a> {
    pub fn new(
        matrix: &'a InteractionMatrix,
        user_similarity: &'a SimilarityMatrix,
        predictor: RatingPredictor,
        weights: HybridWeights,
    ) -> Self {
        Self {
            matrix,
            user_similarity,
            content_similarity: None,
            predictor,
            weights,
            seed_weights: SeedWeights::default(),
        }
    }

    /// Enable the content-based half of the blend
    pub fn with_content(
        mut self,
        content_similarity: &'a SimilarityMatrix,
        seed_weights: SeedWeights,
    ) -> Self {
        self.content_similarity = Some(content_similarity);
        self.seed_weights = seed_weights;
        self
    }

    /// Seed-weighted mean content similarity; 0.0 without seeds or content data
    pub fn content_score(&self, user_idx: usize, item_idx: usize) -> f64 {
        let Some(content) = self.content_similarity else {
            return 0.0;
        };

        let (weighted, total) = self
            .matrix
            .positive_seeds(user_idx)
            .iter()
            .fold((0.0, 0.0), |(weighted, total), seed| {
                let w = self.seed_weights.weight_for(seed.strongest);
                let sim = content.get(item_idx, seed.item_idx).unwrap_or(0.0);
                (weighted + w * sim, total + w)
            });

        if total > 0.0 {
            weighted / total
        } else {
            0.0
        }
    }

    /// Blended score for one (user, item) pair
    pub fn score(&self, user_idx: usize, item_idx: usize) -> Result<f64> {
        let collaborative = self
            .predictor
            .predict(self.matrix, self.user_similarity, user_idx, item_idx)?;
        let content = self.content_score(user_idx, item_idx);
        Ok(self.weights.blend(collaborative, content))
    }

    /// Top-n unseen items for `user_idx`
    pub fn recommend(&self, user_idx: usize, n: usize) -> Result<Vec<RecommendationCandidate>> {
        self.matrix.check_user(user_idx)?;
        if let Some(content) = self.content_similarity {
            if content.len() != self.matrix.n_items() {
                return Err(RecommendError::DimensionMismatch {
                    context: "content similarity vs interaction columns",
                    expected: self.matrix.n_items(),
                    actual: content.len(),
                });
            }
        }
        if n == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f64)> = (0..self.matrix.n_items())
            .into_par_iter()
            .filter(|&item_idx| !self.matrix.has_interacted(user_idx, item_idx))
            .map(|item_idx| self.score(user_idx, item_idx).map(|score| (item_idx, score)))
            .collect::<Result<Vec<_>>>()?;

        scored.retain(|&(_, score)| score > 0.0);
        scored.sort_by(|a, b| rank_order(*a, *b));
        scored.truncate(n);

        debug!(user_idx, requested = n, returned = scored.len(), "Hybrid recommendations ranked");

        Ok(scored
            .into_iter()
            .map(|(item_idx, score)| RecommendationCandidate {
                item_idx,
                item_id: self
                    .matrix
                    .items()
                    .id(item_idx)
                    .unwrap_or_default()
                    .to_string(),
                predicted_score: score,
                reason: RecommendationReason::Hybrid,
            })
            .collect())
    }
}
