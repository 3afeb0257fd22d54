// ============================================
// Trained Model (訓練結果快照)
// ============================================
//
// One training run's output, owned explicitly and shared read-only:
//   events → interaction matrix → user / item similarity → content similarity
//
// Retraining builds a fresh TrainedModel; an existing one is never mutated.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::models::{RecommendationCandidate, RecommendationReason, TrainingInput};
use crate::services::aggregator::{HybridWeights, RecommendationAggregator, SeedWeights};
use crate::services::content::ContentScorer;
use crate::services::matrix::{InteractionMatrix, MatrixBuilder};
use crate::services::predictor::RatingPredictor;
use crate::services::similarity::{SimilarityEngine, SimilarityMatrix};
use crate::utils::{rank_order, CancelFlag};
use chrono::{DateTime, Utc};
use std::time::Instant;
use tracing::info;

/// Immutable snapshot of a completed training run
#[derive(Debug, Clone)]
pub struct TrainedModel {
    interaction_matrix: InteractionMatrix,
    user_similarity: SimilarityMatrix,
    item_similarity: SimilarityMatrix,
    content_similarity: Option<SimilarityMatrix>,
    item_categories: Vec<Option<String>>,
    predictor: RatingPredictor,
    weights: HybridWeights,
    seed_weights: SeedWeights,
    trained_at: DateTime<Utc>,
}

impl TrainedModel {
    pub fn interaction_matrix(&self) -> &InteractionMatrix {
        &self.interaction_matrix
    }

    pub fn user_similarity(&self) -> &SimilarityMatrix {
        &self.user_similarity
    }

    pub fn item_similarity(&self) -> &SimilarityMatrix {
        &self.item_similarity
    }

    pub fn content_similarity(&self) -> Option<&SimilarityMatrix> {
        self.content_similarity.as_ref()
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    pub fn user_index(&self, user_id: &str) -> Option<usize> {
        self.interaction_matrix.users().get(user_id)
    }

    pub fn item_index(&self, item_id: &str) -> Option<usize> {
        self.interaction_matrix.items().get(item_id)
    }

    fn aggregator(&self) -> RecommendationAggregator<'_> {
        let aggregator = RecommendationAggregator::new(
            &self.interaction_matrix,
            &self.user_similarity,
            self.predictor,
            self.weights,
        );
        match &self.content_similarity {
            Some(content) => aggregator.with_content(content, self.seed_weights),
            None => aggregator,
        }
    }

    /// k-NN collaborative prediction for one (user, item) pair
    pub fn predict(&self, user_idx: usize, item_idx: usize) -> Result<f64> {
        self.predictor.predict(
            &self.interaction_matrix,
            &self.user_similarity,
            user_idx,
            item_idx,
        )
    }

    /// Hybrid top-n recommendations for a user index
    pub fn recommend(&self, user_idx: usize, n: usize) -> Result<Vec<RecommendationCandidate>> {
        self.aggregator().recommend(user_idx, n)
    }

    /// Items most similar to `item_idx` by co-interaction, self excluded,
    /// similarity > 0 only
    pub fn similar_items(&self, item_idx: usize, n: usize) -> Result<Vec<RecommendationCandidate>> {
        self.interaction_matrix.check_item(item_idx)?;

        let mut scored: Vec<(usize, f64)> = self
            .item_similarity
            .row(item_idx)
            .iter()
            .enumerate()
            .filter(|&(other, &sim)| other != item_idx && sim > 0.0)
            .map(|(other, &sim)| (other, sim))
            .collect();
        scored.sort_by(|a, b| rank_order(*a, *b));
        scored.truncate(n);

        Ok(self.to_candidates(scored, RecommendationReason::ItemSimilarity))
    }

    /// Catalog items ranked by recorded events, for cold-start users.
    /// Items without events still rank, after every item with some.
    pub fn popular_items(&self, n: usize) -> Vec<RecommendationCandidate> {
        let matrix = &self.interaction_matrix;
        let mut scored: Vec<(usize, f64)> = (0..matrix.n_items())
            .map(|idx| (idx, matrix.item_event_count(idx) as f64))
            .collect();
        scored.sort_by(|a, b| rank_order(*a, *b));
        scored.truncate(n);

        self.to_candidates(scored, RecommendationReason::Popularity)
    }

    /// Other items in the same catalog category, in index order
    pub fn same_category_items(
        &self,
        item_idx: usize,
        n: usize,
    ) -> Result<Vec<RecommendationCandidate>> {
        self.interaction_matrix.check_item(item_idx)?;
        let Some(category) = self.item_categories[item_idx].as_deref() else {
            return Ok(Vec::new());
        };

        let scored: Vec<(usize, f64)> = self
            .item_categories
            .iter()
            .enumerate()
            .filter(|(other, c)| *other != item_idx && c.as_deref() == Some(category))
            .map(|(other, _)| (other, 1.0))
            .take(n)
            .collect();

        Ok(self.to_candidates(scored, RecommendationReason::SameCategory))
    }

    fn to_candidates(
        &self,
        scored: Vec<(usize, f64)>,
        reason: RecommendationReason,
    ) -> Vec<RecommendationCandidate> {
        let items = self.interaction_matrix.items();
        scored
            .into_iter()
            .map(|(item_idx, score)| RecommendationCandidate {
                item_idx,
                item_id: items.id(item_idx).unwrap_or_default().to_string(),
                predicted_score: score,
                reason,
            })
            .collect()
    }
}

/// Runs the full training pipeline
#[derive(Debug, Clone)]
pub struct Trainer {
    config: EngineConfig,
}

impl Trainer {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn train(&self, input: &TrainingInput, cancel: &CancelFlag) -> Result<TrainedModel> {
        let start = Instant::now();
        info!(
            users = input.users.len(),
            items = input.items.len(),
            events = input.events.len(),
            documents = input.documents.len(),
            "Training recommendation model"
        );

        cancel.check()?;
        let interaction_matrix = MatrixBuilder::new().build(&input.events, &input.users, &input.items)?;

        let engine = SimilarityEngine::with_cancel(cancel.clone());
        let user_similarity = engine.compute_user_similarity(&interaction_matrix)?;
        let item_similarity = engine.compute_item_similarity(&interaction_matrix)?;

        let content_similarity = if input.documents.is_empty() {
            None
        } else {
            let scorer = ContentScorer::new(
                self.config.tfidf_max_features,
                self.config.include_price_feature,
            )
            .with_cancel(cancel.clone());
            Some(scorer.score(interaction_matrix.items(), &input.documents)?)
        };
        cancel.check()?;

        let mut item_categories = vec![None; interaction_matrix.n_items()];
        for doc in &input.documents {
            if let Some(idx) = interaction_matrix.items().get(&doc.item_id) {
                if !doc.category.trim().is_empty() {
                    item_categories[idx] = Some(doc.category.trim().to_string());
                }
            }
        }

        info!(
            users = interaction_matrix.n_users(),
            items = interaction_matrix.n_items(),
            content = content_similarity.is_some(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Model training completed"
        );

        Ok(TrainedModel {
            interaction_matrix,
            user_similarity,
            item_similarity,
            content_similarity,
            item_categories,
            predictor: RatingPredictor::new(self.config.neighbors_k),
            weights: HybridWeights::new(
                self.config.collaborative_weight,
                self.config.content_weight,
            ),
            seed_weights: SeedWeights {
                like: self.config.like_weight,
                purchase: self.config.purchase_weight,
            },
            trained_at: Utc::now(),
        })
    }
}

/// Train with the given config and no external cancellation
pub fn train(input: &TrainingInput, config: &EngineConfig) -> Result<TrainedModel> {
    Trainer::new(config.clone()).train(input, &CancelFlag::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecommendError;
    use crate::models::{InteractionEvent, InteractionType, ItemDocument};

    fn input() -> TrainingInput {
        let config = EngineConfig::default();
        let ev = |u: &str, i: &str, t: InteractionType| {
            InteractionEvent::new(u, i, t, config.weight_for(t), Utc::now())
        };

        TrainingInput {
            users: vec!["alice".into(), "bob".into(), "carol".into()],
            items: vec!["p0".into(), "p1".into(), "p2".into(), "p3".into()],
            events: vec![
                ev("alice", "p0", InteractionType::Purchase),
                ev("bob", "p0", InteractionType::Purchase),
                ev("bob", "p1", InteractionType::Like),
                ev("carol", "p2", InteractionType::View),
                ev("carol", "p1", InteractionType::View),
            ],
            documents: vec![
                ItemDocument {
                    item_id: "p0".into(),
                    name: "Running shoe".into(),
                    description: "Light trail runner".into(),
                    category: "Footwear".into(),
                    price: Some(95.0),
                },
                ItemDocument {
                    item_id: "p3".into(),
                    name: "Trail running shoe".into(),
                    description: "Waterproof runner".into(),
                    category: "Footwear".into(),
                    price: Some(95.0),
                },
            ],
        }
    }

    #[test]
    fn test_train_and_recommend() {
        let model = train(&input(), &EngineConfig::default()).unwrap();

        assert_eq!(model.interaction_matrix().n_users(), 3);
        assert_eq!(model.item_similarity().len(), 4);
        assert!(model.content_similarity().is_some());

        let alice = model.user_index("alice").unwrap();
        let recs = model.recommend(alice, 5).unwrap();
        assert!(!recs.is_empty());
        // bob's like on p1 is the strongest collaborative signal for alice
        assert_eq!(recs[0].item_id, "p1");
        assert!(recs.iter().all(|r| r.item_id != "p0"));
        // p3 is only reachable through content similarity with p0
        assert!(recs.iter().any(|r| r.item_id == "p3"));
    }

    #[test]
    fn test_similar_items() {
        let model = train(&input(), &EngineConfig::default()).unwrap();
        let p1 = model.item_index("p1").unwrap();

        let similar = model.similar_items(p1, 5).unwrap();
        assert!(similar.iter().all(|c| c.item_idx != p1 && c.predicted_score > 0.0));
        assert!(similar
            .iter()
            .all(|c| c.reason == RecommendationReason::ItemSimilarity));
        // p3 has no interactions at all
        assert!(similar.iter().all(|c| c.item_id != "p3"));
    }

    #[test]
    fn test_popular_items() {
        let model = train(&input(), &EngineConfig::default()).unwrap();
        let popular = model.popular_items(10);

        let ids: Vec<&str> = popular.iter().map(|c| c.item_id.as_str()).collect();
        // p0 and p1 have two events each, p2 one, p3 none
        assert_eq!(ids, vec!["p0", "p1", "p2", "p3"]);
        assert_eq!(popular[0].predicted_score, 2.0);
        assert_eq!(popular[3].predicted_score, 0.0);
        assert_eq!(model.popular_items(2).len(), 2);
    }

    #[test]
    fn test_same_category_items() {
        let model = train(&input(), &EngineConfig::default()).unwrap();
        let p0 = model.item_index("p0").unwrap();

        let same = model.same_category_items(p0, 5).unwrap();
        assert_eq!(same.len(), 1);
        assert_eq!(same[0].item_id, "p3");
        assert_eq!(same[0].reason, RecommendationReason::SameCategory);

        // p1 has no document, so no category
        let p1 = model.item_index("p1").unwrap();
        assert!(model.same_category_items(p1, 5).unwrap().is_empty());
    }

    #[test]
    fn test_train_without_documents() {
        let mut input = input();
        input.documents.clear();
        let model = train(&input, &EngineConfig::default()).unwrap();
        assert!(model.content_similarity().is_none());
    }

    #[test]
    fn test_cancelled_training() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = Trainer::new(EngineConfig::default())
            .train(&input(), &cancel)
            .unwrap_err();
        assert!(matches!(err, RecommendError::Cancelled));
    }
}
