pub mod aggregator;
pub mod content;
pub mod matrix;
pub mod model;
pub mod predictor;
pub mod recommendation;
pub mod similarity;
pub mod store;

pub use aggregator::{HybridWeights, RecommendationAggregator, SeedWeights};
pub use content::{compute_content_similarity, ContentScorer, TfIdfVectorizer};
pub use matrix::{build_matrix, IdIndex, InteractionMatrix, MatrixBuilder, PositiveSeed};
pub use model::{train, TrainedModel, Trainer};
pub use predictor::{predict, Neighbor, RatingPredictor};
pub use recommendation::RecommendationService;
pub use similarity::{compute_similarity, pairwise_cosine, SimilarityEngine, SimilarityMatrix};
pub use store::{load_training_input, InMemoryInteractionStore, InteractionStore};
