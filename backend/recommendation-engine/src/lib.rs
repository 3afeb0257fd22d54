//! Hybrid recommendation engine
//!
//! Collaborative filtering (user-based k-NN over a dense interaction matrix)
//! blended with content-based similarity (TF-IDF over item text plus a
//! standardized price column).

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use config::EngineConfig;
pub use error::{IdentifierKind, RecommendError, Result};
pub use models::{
    Axis, InteractionEvent, InteractionType, ItemDocument, RecommendationCandidate,
    RecommendationReason, TrainingInput,
};
pub use services::{
    build_matrix, compute_content_similarity, compute_similarity, predict, train,
    InMemoryInteractionStore, InteractionMatrix, InteractionStore, RecommendationService,
    SimilarityMatrix, TrainedModel, Trainer,
};
pub use utils::CancelFlag;

/// Top-n hybrid recommendations for one user of a trained model
pub fn recommend(model: &TrainedModel, user_idx: usize, n: usize) -> Result<Vec<RecommendationCandidate>> {
    model.recommend(user_idx, n)
}
