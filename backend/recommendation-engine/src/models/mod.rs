use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    View,
    Like,
    Dislike,
    Purchase,
}

impl InteractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::View => "view",
            InteractionType::Like => "like",
            InteractionType::Dislike => "dislike",
            InteractionType::Purchase => "purchase",
        }
    }

    /// Like and purchase mark an item as a positive seed for content scoring
    pub fn is_positive(&self) -> bool {
        matches!(self, InteractionType::Like | InteractionType::Purchase)
    }
}

/// A recorded user-item interaction. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractionEvent {
    pub user_id: String,
    pub item_id: String,
    pub interaction_type: InteractionType,
    /// Implicit weight assigned from the interaction type (non-negative magnitude)
    pub weight: f64,
    pub timestamp: DateTime<Utc>,
}

impl InteractionEvent {
    pub fn new(
        user_id: impl Into<String>,
        item_id: impl Into<String>,
        interaction_type: InteractionType,
        weight: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            item_id: item_id.into(),
            interaction_type,
            weight: weight.abs(),
            timestamp,
        }
    }

    /// Contribution to the interaction matrix cell; dislike subtracts
    pub fn signed_weight(&self) -> f64 {
        match self.interaction_type {
            InteractionType::Dislike => -self.weight,
            _ => self.weight,
        }
    }
}

/// Per-item text attributes fed to the content scorer
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ItemDocument {
    pub item_id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub price: Option<f64>,
}

impl ItemDocument {
    /// Text vectorized by TF-IDF: name, description, category
    pub fn text(&self) -> String {
        format!("{} {} {}", self.name, self.description, self.category)
    }
}

/// Similarity axis over the interaction matrix
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Axis {
    User,
    Item,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationReason {
    Hybrid,
    ItemSimilarity,
    Popularity,
    SameCategory,
}

impl RecommendationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationReason::Hybrid => "hybrid",
            RecommendationReason::ItemSimilarity => "item_similarity",
            RecommendationReason::Popularity => "popularity",
            RecommendationReason::SameCategory => "same_category",
        }
    }
}

/// A ranked item produced per request, never persisted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationCandidate {
    pub item_idx: usize,
    pub item_id: String,
    pub predicted_score: f64,
    pub reason: RecommendationReason,
}

/// Everything one training run consumes
#[derive(Debug, Clone, Default)]
pub struct TrainingInput {
    pub users: Vec<String>,
    pub items: Vec<String>,
    pub events: Vec<InteractionEvent>,
    pub documents: Vec<ItemDocument>,
}
