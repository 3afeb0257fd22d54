// ============================================
// Recommendation Service (推薦服務)
// ============================================
//
// Async front door over the trained model:
//   store → spawn_blocking(train) → Arc<TrainedModel> snapshot
//
// Readers clone the current Arc and never wait on training. A retrain swaps
// the snapshot only on success; a failed run leaves the old one in place.

use crate::config::EngineConfig;
use crate::error::{RecommendError, Result};
use crate::models::{InteractionEvent, InteractionType, RecommendationCandidate};
use crate::services::model::{TrainedModel, Trainer};
use crate::services::store::{load_training_input, InteractionStore};
use crate::utils::CancelFlag;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct RecommendationService {
    store: Arc<dyn InteractionStore>,
    config: EngineConfig,
    model: RwLock<Option<Arc<TrainedModel>>>,
    cancel: Mutex<CancelFlag>,
    // one training run at a time
    training: tokio::sync::Mutex<()>,
}

impl RecommendationService {
    pub fn new(store: Arc<dyn InteractionStore>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            model: RwLock::new(None),
            cancel: Mutex::new(CancelFlag::new()),
            training: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current snapshot, if any training run has completed
    pub fn model(&self) -> Option<Arc<TrainedModel>> {
        self.model.read().clone()
    }

    pub fn is_trained(&self) -> bool {
        self.model.read().is_some()
    }

    /// Reload from the store and train a fresh snapshot
    pub async fn retrain(&self) -> Result<Arc<TrainedModel>> {
        let _guard = self.training.lock().await;
        self.retrain_locked().await
    }

    // caller holds `training`
    async fn retrain_locked(&self) -> Result<Arc<TrainedModel>> {
        let start = Instant::now();

        let cancel = CancelFlag::new();
        *self.cancel.lock() = cancel.clone();

        let outcome = self.run_training(cancel).await;
        match outcome {
            Ok(model) => {
                let model = Arc::new(model);
                *self.model.write() = Some(Arc::clone(&model));
                info!(
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Recommendation model swapped in"
                );
                Ok(model)
            }
            Err(e) => {
                warn!(
                    error = %e,
                    kept_previous = self.is_trained(),
                    "Retrain failed, keeping previous model"
                );
                Err(e)
            }
        }
    }

    async fn run_training(&self, cancel: CancelFlag) -> Result<TrainedModel> {
        let input = load_training_input(self.store.as_ref()).await?;
        let trainer = Trainer::new(self.config.clone());

        tokio::task::spawn_blocking(move || trainer.train(&input, &cancel)).await?
    }

    /// Trip the cancel flag of the in-flight training run
    pub fn cancel_training(&self) {
        self.cancel.lock().cancel();
        info!("Training cancellation requested");
    }

    /// Current snapshot, training one first if none exists yet. Concurrent
    /// first queries share a single training run.
    async fn ensure_model(&self) -> Result<Arc<TrainedModel>> {
        if let Some(model) = self.model() {
            return Ok(model);
        }

        let _guard = self.training.lock().await;
        // another caller may have finished training while we waited
        if let Some(model) = self.model() {
            return Ok(model);
        }
        self.retrain_locked().await
    }

    /// Top-n recommendations for a user; `None` uses the configured default
    ///
    /// Users the model has never seen get the most popular items.
    pub async fn recommendations_for(
        &self,
        user_id: &str,
        n: Option<usize>,
    ) -> Result<Vec<RecommendationCandidate>> {
        let n = n.unwrap_or(self.config.default_recommendations);
        let model = self.ensure_model().await?;

        match model.user_index(user_id) {
            Some(user_idx) => {
                // full pass over items and neighbours, kept off the async workers
                let recs =
                    tokio::task::spawn_blocking(move || model.recommend(user_idx, n)).await??;
                debug!(user_id, returned = recs.len(), "Hybrid recommendations served");
                Ok(recs)
            }
            None => {
                debug!(user_id, "Unknown user, serving popular items");
                Ok(model.popular_items(n))
            }
        }
    }

    /// Items similar to `item_id`; falls back to the same catalog category
    /// when the item has no co-interaction neighbours
    pub async fn similar_items_for(
        &self,
        item_id: &str,
        n: Option<usize>,
    ) -> Result<Vec<RecommendationCandidate>> {
        let n = n.unwrap_or(self.config.default_recommendations);
        let model = self.ensure_model().await?;
        let item_idx = model
            .item_index(item_id)
            .ok_or_else(|| RecommendError::invalid_item(item_id))?;

        let similar = model.similar_items(item_idx, n)?;
        if !similar.is_empty() || n == 0 {
            return Ok(similar);
        }

        debug!(item_id, "No co-interaction neighbours, using category fallback");
        model.same_category_items(item_idx, n)
    }

    /// Record one interaction; returns true when it triggered a retrain
    ///
    /// A failed periodic retrain is logged, not returned: the event itself
    /// was stored.
    pub async fn record_interaction(
        &self,
        user_id: &str,
        item_id: &str,
        interaction_type: InteractionType,
    ) -> Result<bool> {
        let event = InteractionEvent::new(
            user_id,
            item_id,
            interaction_type,
            self.config.weight_for(interaction_type),
            Utc::now(),
        );
        let total = self.store.record(event).await?;
        debug!(
            user_id,
            item_id,
            interaction = interaction_type.as_str(),
            total,
            "Interaction recorded"
        );

        if self.config.retrain_every == 0 || total % self.config.retrain_every != 0 {
            return Ok(false);
        }

        info!(total, "Retrain threshold reached");
        if let Err(e) = self.retrain().await {
            warn!(error = %e, "Periodic retrain failed");
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemDocument, RecommendationReason};
    use crate::services::store::{InMemoryInteractionStore, MockInteractionStore};
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Weak;

    fn catalog() -> Arc<InMemoryInteractionStore> {
        let store = Arc::new(InMemoryInteractionStore::new());
        store.add_items(["p0", "p1", "p2"]);
        store.add_document(ItemDocument {
            item_id: "p3".into(),
            name: "Desk lamp".into(),
            description: "LED".into(),
            category: "Lighting".into(),
            price: None,
        });
        store.add_document(ItemDocument {
            item_id: "p4".into(),
            name: "Floor lamp".into(),
            description: "LED".into(),
            category: "Lighting".into(),
            price: None,
        });
        store
    }

    async fn seed(service: &RecommendationService) {
        for (user, item, kind) in [
            ("alice", "p0", InteractionType::Purchase),
            ("bob", "p0", InteractionType::Purchase),
            ("bob", "p1", InteractionType::Like),
            ("carol", "p2", InteractionType::View),
        ] {
            service.record_interaction(user, item, kind).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_lazy_training_on_first_query() {
        let service = RecommendationService::new(catalog(), EngineConfig::default());
        seed(&service).await;
        assert!(!service.is_trained());

        let recs = service.recommendations_for("alice", None).await.unwrap();
        assert!(service.is_trained());
        assert_eq!(recs[0].item_id, "p1");
        assert!(recs.iter().all(|r| r.item_id != "p0"));
    }

    #[tokio::test]
    async fn test_unknown_user_gets_popular_items() {
        let service = RecommendationService::new(catalog(), EngineConfig::default());
        seed(&service).await;

        let recs = service.recommendations_for("dave", Some(2)).await.unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].item_id, "p0");
        assert!(recs.iter().all(|r| r.reason == RecommendationReason::Popularity));
    }

    #[tokio::test]
    async fn test_cold_start_without_events_serves_catalog() {
        let store = Arc::new(InMemoryInteractionStore::new());
        store.add_items(["p0", "p1", "p2"]);
        let service = RecommendationService::new(store, EngineConfig::default());

        let recs = service.recommendations_for("newcomer", Some(3)).await.unwrap();
        let ids: Vec<&str> = recs.iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(ids, vec!["p0", "p1", "p2"]);
        assert!(recs.iter().all(|r| r.reason == RecommendationReason::Popularity));
        assert!(recs.iter().all(|r| r.predicted_score == 0.0));
    }

    #[tokio::test]
    async fn test_popular_items_fill_with_untouched_catalog() {
        let service = RecommendationService::new(catalog(), EngineConfig::default());
        seed(&service).await;

        // three items have events, p3 and p4 fill the remaining slots
        let recs = service.recommendations_for("dave", Some(5)).await.unwrap();
        let ids: Vec<&str> = recs.iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(ids, vec!["p0", "p1", "p2", "p3", "p4"]);
    }

    #[tokio::test]
    async fn test_similar_items_category_fallback() {
        let service = RecommendationService::new(catalog(), EngineConfig::default());
        seed(&service).await;

        let similar = service.similar_items_for("p3", Some(5)).await.unwrap();
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].item_id, "p4");
        assert_eq!(similar[0].reason, RecommendationReason::SameCategory);

        let err = service.similar_items_for("missing", None).await.unwrap_err();
        assert!(matches!(err, RecommendError::InvalidIdentifier { .. }));
    }

    #[tokio::test]
    async fn test_periodic_retrain() {
        let config = EngineConfig {
            retrain_every: 2,
            ..EngineConfig::default()
        };
        let service = RecommendationService::new(catalog(), config);

        let first = service
            .record_interaction("alice", "p0", InteractionType::View)
            .await
            .unwrap();
        assert!(!first);
        assert!(!service.is_trained());

        let second = service
            .record_interaction("bob", "p0", InteractionType::Like)
            .await
            .unwrap();
        assert!(second);
        assert!(service.is_trained());
    }

    #[tokio::test]
    async fn test_record_unknown_item_fails() {
        let service = RecommendationService::new(catalog(), EngineConfig::default());
        let err = service
            .record_interaction("alice", "nope", InteractionType::View)
            .await
            .unwrap_err();
        assert!(matches!(err, RecommendError::Store(_)));
    }

    #[tokio::test]
    async fn test_failed_retrain_keeps_previous_model() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut store = MockInteractionStore::new();

        let counter = Arc::clone(&calls);
        store.expect_known_users().returning(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(vec!["u0".to_string(), "u1".to_string()])
            } else {
                Err(anyhow!("store unavailable"))
            }
        });
        store
            .expect_known_items()
            .returning(|| Ok(vec!["p0".to_string(), "p1".to_string()]));
        store.expect_events().returning(|| {
            Ok(vec![
                InteractionEvent::new("u0", "p0", InteractionType::Like, 3.0, Utc::now()),
                InteractionEvent::new("u1", "p0", InteractionType::Like, 3.0, Utc::now()),
                InteractionEvent::new("u1", "p1", InteractionType::Purchase, 5.0, Utc::now()),
            ])
        });
        store.expect_item_documents().returning(|| Ok(Vec::new()));

        let service = RecommendationService::new(Arc::new(store), EngineConfig::default());
        let first = service.retrain().await.unwrap();

        let err = service.retrain().await.unwrap_err();
        assert!(matches!(err, RecommendError::Store(_)));

        let current = service.model().unwrap();
        assert!(Arc::ptr_eq(&first, &current));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    fn two_user_events() -> Vec<InteractionEvent> {
        vec![
            InteractionEvent::new("u0", "p0", InteractionType::Like, 3.0, Utc::now()),
            InteractionEvent::new("u1", "p0", InteractionType::Like, 3.0, Utc::now()),
            InteractionEvent::new("u1", "p1", InteractionType::Purchase, 5.0, Utc::now()),
        ]
    }

    #[tokio::test]
    async fn test_cancel_training_keeps_previous_model() {
        let service_slot: Arc<Mutex<Option<Weak<RecommendationService>>>> = Arc::default();
        let loads = Arc::new(AtomicUsize::new(0));
        let mut store = MockInteractionStore::new();

        store
            .expect_known_users()
            .returning(|| Ok(vec!["u0".to_string(), "u1".to_string()]));
        store
            .expect_known_items()
            .returning(|| Ok(vec!["p0".to_string(), "p1".to_string()]));
        let slot = Arc::clone(&service_slot);
        let counter = Arc::clone(&loads);
        store.expect_events().returning(move || {
            // second run: cancelled while its input is still loading
            if counter.fetch_add(1, Ordering::SeqCst) == 1 {
                if let Some(service) = slot.lock().as_ref().and_then(Weak::upgrade) {
                    service.cancel_training();
                }
            }
            Ok(two_user_events())
        });
        store.expect_item_documents().returning(|| Ok(Vec::new()));

        let service = Arc::new(RecommendationService::new(
            Arc::new(store),
            EngineConfig::default(),
        ));
        *service_slot.lock() = Some(Arc::downgrade(&service));

        let first = service.retrain().await.unwrap();

        let err = service.retrain().await.unwrap_err();
        assert!(matches!(err, RecommendError::Cancelled));
        assert!(Arc::ptr_eq(&first, &service.model().unwrap()));

        // the next run gets a fresh flag
        let third = service.retrain().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(loads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_concurrent_first_queries_train_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let mut store = MockInteractionStore::new();

        let counter = Arc::clone(&loads);
        store.expect_known_users().returning(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(vec!["u0".to_string(), "u1".to_string()])
        });
        store
            .expect_known_items()
            .returning(|| Ok(vec!["p0".to_string(), "p1".to_string()]));
        store.expect_events().returning(|| Ok(two_user_events()));
        store.expect_item_documents().returning(|| Ok(Vec::new()));

        let service = RecommendationService::new(Arc::new(store), EngineConfig::default());
        let (a, b, c) = tokio::join!(
            service.recommendations_for("u0", Some(3)),
            service.recommendations_for("u1", Some(3)),
            service.similar_items_for("p0", Some(3)),
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        // u0 has not seen p1; u1 liked p0 and bought p1
        let recs = a.unwrap();
        assert_eq!(recs[0].item_id, "p1");
    }

    #[tokio::test]
    async fn test_training_error_without_previous_model() {
        let mut store = MockInteractionStore::new();
        store
            .expect_known_users()
            .returning(|| Ok(vec!["u0".to_string(), "u0".to_string()]));
        store.expect_known_items().returning(|| Ok(vec!["p0".to_string()]));
        store.expect_events().returning(|| Ok(Vec::new()));
        store.expect_item_documents().returning(|| Ok(Vec::new()));

        let service = RecommendationService::new(Arc::new(store), EngineConfig::default());
        // duplicate user ids are rejected by the matrix builder
        let err = service.recommendations_for("u0", None).await.unwrap_err();
        assert!(matches!(err, RecommendError::InvalidIdentifier { .. }));
        assert!(service.model().is_none());
    }
}
