use crate::error::{RecommendError, Result};
use crate::models::InteractionType;
use serde::Deserialize;

/// Recommendation engine configuration
///
/// Loaded from the environment (and an optional `.env` file) with the
/// `RECOMMENDER_` prefix, e.g. `RECOMMENDER_NEIGHBORS_K=20`.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Neighbours kept by the k-NN rating predictor
    pub neighbors_k: usize,

    // Hybrid blend weights
    pub collaborative_weight: f64,
    pub content_weight: f64,

    // Implicit weights per interaction type
    pub view_weight: f64,
    pub like_weight: f64,
    pub dislike_weight: f64,
    pub purchase_weight: f64,

    // Content features
    pub tfidf_max_features: usize,
    pub include_price_feature: bool,

    /// Recorded interactions between automatic retrains
    pub retrain_every: u64,
    /// Result size used when callers don't ask for one
    pub default_recommendations: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            neighbors_k: 10,
            collaborative_weight: 0.5,
            content_weight: 0.5,
            view_weight: 1.0,
            like_weight: 3.0,
            dislike_weight: 2.0,
            purchase_weight: 5.0,
            tfidf_max_features: 100,
            include_price_feature: true,
            retrain_every: 50,
            default_recommendations: 5,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_environment(Self::environment())
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix("RECOMMENDER")
            .prefix_separator("_")
            .try_parsing(true)
    }

    /// Defaults overlaid with the given environment source
    fn from_environment(environment: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .set_default("neighbors_k", 10)?
            .set_default("collaborative_weight", 0.5)?
            .set_default("content_weight", 0.5)?
            .set_default("view_weight", 1.0)?
            .set_default("like_weight", 3.0)?
            .set_default("dislike_weight", 2.0)?
            .set_default("purchase_weight", 5.0)?
            .set_default("tfidf_max_features", 100)?
            .set_default("include_price_feature", true)?
            .set_default("retrain_every", 50)?
            .set_default("default_recommendations", 5)?
            .add_source(environment)
            .build()?;

        let config: EngineConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.neighbors_k == 0 {
            return Err(RecommendError::Configuration(
                "neighbors_k must be at least 1".to_string(),
            ));
        }

        let blend = [self.collaborative_weight, self.content_weight];
        if blend.iter().any(|w| !(0.0..=1.0).contains(w)) {
            return Err(RecommendError::Configuration(format!(
                "Blend weights must be in [0, 1], got collaborative={} content={}",
                self.collaborative_weight, self.content_weight
            )));
        }
        if self.collaborative_weight + self.content_weight <= 0.0 {
            return Err(RecommendError::Configuration(
                "At least one blend weight must be positive".to_string(),
            ));
        }

        let interaction = [
            self.view_weight,
            self.like_weight,
            self.dislike_weight,
            self.purchase_weight,
        ];
        if interaction.iter().any(|w| !w.is_finite()) {
            return Err(RecommendError::Configuration(format!(
                "Interaction weights must be finite, got view={} like={} dislike={} purchase={}",
                self.view_weight, self.like_weight, self.dislike_weight, self.purchase_weight
            )));
        }

        if !(self.purchase_weight > self.like_weight
            && self.like_weight > self.view_weight
            && self.view_weight > 0.0)
        {
            return Err(RecommendError::Configuration(format!(
                "Interaction weights must satisfy purchase > like > view > 0, got {} / {} / {}",
                self.purchase_weight, self.like_weight, self.view_weight
            )));
        }
        if self.dislike_weight < 0.0 {
            return Err(RecommendError::Configuration(
                "dislike_weight must be non-negative".to_string(),
            ));
        }

        if self.tfidf_max_features == 0 {
            return Err(RecommendError::Configuration(
                "tfidf_max_features must be at least 1".to_string(),
            ));
        }
        if self.retrain_every == 0 {
            return Err(RecommendError::Configuration(
                "retrain_every must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Implicit weight recorded for an interaction of the given type
    pub fn weight_for(&self, interaction_type: InteractionType) -> f64 {
        match interaction_type {
            InteractionType::View => self.view_weight,
            InteractionType::Like => self.like_weight,
            InteractionType::Dislike => self.dislike_weight,
            InteractionType::Purchase => self.purchase_weight,
        }
    }
}
