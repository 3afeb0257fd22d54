// ============================================
// Content Scorer (內容相似度)
// ============================================
//
// Item-item similarity from item attributes, independent of interactions:
// 1. TF-IDF over "name description category"
// 2. Optional standardized price column appended to the text features
// 3. Cosine similarity over feature rows (same kernel as item-item CF)

pub mod tfidf;

pub use tfidf::{TfIdfFeatures, TfIdfVectorizer};

use crate::error::{RecommendError, Result};
use crate::models::ItemDocument;
use crate::services::matrix::IdIndex;
use crate::services::similarity::{pairwise_cosine, SimilarityMatrix};
use crate::utils::CancelFlag;
use ndarray::{s, Array2};
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ContentScorer {
    vectorizer: TfIdfVectorizer,
    include_price: bool,
    cancel: CancelFlag,
}

impl Default for ContentScorer {
    fn default() -> Self {
        Self::new(tfidf::DEFAULT_MAX_FEATURES, true)
    }
}

impl ContentScorer {
    pub fn new(max_features: usize, include_price: bool) -> Self {
        Self {
            vectorizer: TfIdfVectorizer::new(max_features),
            include_price,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Feature matrix with one row per known item, in item index order
    ///
    /// Items without a document get an all-zero row. A document for an item
    /// outside `items` is rejected.
    pub fn build_features(&self, items: &IdIndex, documents: &[ItemDocument]) -> Result<Array2<f64>> {
        let mut texts = vec![String::new(); items.len()];
        let mut prices: Vec<Option<f64>> = vec![None; items.len()];

        for doc in documents {
            let idx = items
                .get(&doc.item_id)
                .ok_or_else(|| RecommendError::invalid_item(&doc.item_id))?;
            texts[idx] = doc.text();
            prices[idx] = doc.price.filter(|p| p.is_finite());
        }

        let text_features = self.vectorizer.fit_transform(&texts);
        debug!(
            items = items.len(),
            vocabulary = text_features.vocabulary.len(),
            "TF-IDF features fitted"
        );

        if !self.include_price {
            return Ok(text_features.matrix);
        }

        let n_text = text_features.matrix.ncols();
        let mut features = Array2::<f64>::zeros((items.len(), n_text + 1));
        features
            .slice_mut(s![.., ..n_text])
            .assign(&text_features.matrix);
        for (idx, value) in standardize(&prices).into_iter().enumerate() {
            features[(idx, n_text)] = value;
        }

        Ok(features)
    }

    /// Item-item cosine similarity over feature rows
    pub fn compute_content_similarity(&self, features: &Array2<f64>) -> Result<SimilarityMatrix> {
        let start = Instant::now();
        let similarity = pairwise_cosine(features.view(), &self.cancel)?;

        info!(
            items = similarity.len(),
            features = features.ncols(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Content similarity computed"
        );

        Ok(similarity)
    }

    /// Vectorize documents and compute their similarity in one step
    pub fn score(&self, items: &IdIndex, documents: &[ItemDocument]) -> Result<SimilarityMatrix> {
        let features = self.build_features(items, documents)?;
        self.compute_content_similarity(&features)
    }
}

/// Z-score over the present values (population std). Missing values and a
/// zero-variance column map to 0.0.
fn standardize(values: &[Option<f64>]) -> Vec<f64> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return vec![0.0; values.len()];
    }

    let n = present.len() as f64;
    let mean = present.iter().sum::<f64>() / n;
    let variance = present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();

    values
        .iter()
        .map(|v| match v {
            Some(v) if std > 0.0 => (v - mean) / std,
            _ => 0.0,
        })
        .collect()
}

/// Content similarity over a ready feature matrix
pub fn compute_content_similarity(features: &Array2<f64>) -> Result<SimilarityMatrix> {
    ContentScorer::default().compute_content_similarity(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn doc(id: &str, name: &str, description: &str, category: &str, price: Option<f64>) -> ItemDocument {
        ItemDocument {
            item_id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            category: category.to_string(),
            price,
        }
    }

    fn items(n: usize) -> IdIndex {
        let ids: Vec<String> = (0..n).map(|i| format!("p{}", i)).collect();
        IdIndex::new(&ids, crate::error::IdentifierKind::Item).unwrap()
    }

    #[test]
    fn test_similar_text_scores_higher() {
        let scorer = ContentScorer::new(100, false);
        let docs = vec![
            doc("p0", "Trail running shoe", "Grippy outsole", "Footwear", None),
            doc("p1", "Road running shoe", "Cushioned outsole", "Footwear", None),
            doc("p2", "Espresso machine", "Steam wand", "Kitchen", None),
        ];
        let sim = scorer.score(&items(3), &docs).unwrap();

        assert!(sim.is_symmetric());
        assert!(sim.get(0, 1).unwrap() > 0.0);
        assert_eq!(sim.get(0, 2), Some(0.0));
        assert!(sim.get(0, 1).unwrap() > sim.get(0, 2).unwrap());
    }

    #[test]
    fn test_missing_documents_are_zero_rows() {
        let scorer = ContentScorer::new(100, false);
        let docs = vec![doc("p0", "Desk lamp", "", "Lighting", None)];
        let features = scorer.build_features(&items(2), &docs).unwrap();
        assert!(features.row(1).iter().all(|&v| v == 0.0));

        let sim = scorer.compute_content_similarity(&features).unwrap();
        assert_eq!(sim.get(0, 1), Some(0.0));
        assert_eq!(sim.get(1, 1), Some(1.0));
    }

    #[test]
    fn test_unknown_document_item() {
        let scorer = ContentScorer::default();
        let docs = vec![doc("p9", "Ghost", "", "", None)];
        assert!(matches!(
            scorer.build_features(&items(2), &docs),
            Err(RecommendError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn test_price_column_standardized() {
        let scorer = ContentScorer::new(100, true);
        let docs = vec![
            doc("p0", "mug", "", "kitchen", Some(10.0)),
            doc("p1", "mug", "", "kitchen", Some(30.0)),
            doc("p2", "kettle", "", "kitchen", None),
        ];
        let features = scorer.build_features(&items(3), &docs).unwrap();
        let price_col = features.ncols() - 1;

        assert_eq!(features[(0, price_col)], -1.0);
        assert_eq!(features[(1, price_col)], 1.0);
        assert_eq!(features[(2, price_col)], 0.0);
    }

    #[test]
    fn test_standardize_constant_column() {
        assert_eq!(standardize(&[Some(5.0), Some(5.0), None]), vec![0.0, 0.0, 0.0]);
        assert_eq!(standardize(&[None, None]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_content_similarity_over_features() {
        let features = array![[1.0, 0.0], [0.0, 0.0], [2.0, 0.0]];
        let sim = compute_content_similarity(&features).unwrap();
        assert_eq!(sim.get(1, 0), Some(0.0));
        assert!((sim.get(0, 2).unwrap() - 1.0).abs() < 1e-12);
    }
}
