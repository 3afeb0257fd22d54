// ============================================
// Similarity Engine (相似度計算)
// ============================================
//
// Cosine similarity over the rows of a dense matrix:
//   sim(i, j) = dot(v_i, v_j) / (||v_i|| * ||v_j||)
//
// - Each vector is scaled by its max-abs entry first, so huge finite weights
//   cannot overflow the dot products; cosine is scale-invariant
// - L2 norms are computed once, before the pairwise pass
// - Diagonal is 1.0 unconditionally
// - A zero-norm vector has similarity 0.0 with everything else
// - Each unordered pair is computed once and mirrored
//
// The upper triangle is computed row-parallel with rayon; every output cell
// is written exactly once.

use crate::error::Result;
use crate::models::Axis;
use crate::services::matrix::InteractionMatrix;
use crate::utils::CancelFlag;
use ndarray::{Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info};

/// Square, symmetric similarity matrix with a unit diagonal
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    values: Array2<f64>,
}

impl SimilarityMatrix {
    pub fn len(&self) -> usize {
        self.values.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        self.values.get((i, j)).copied()
    }

    pub fn row(&self, i: usize) -> ArrayView1<'_, f64> {
        self.values.row(i)
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn is_symmetric(&self) -> bool {
        let n = self.len();
        (0..n).all(|i| (i + 1..n).all(|j| self.values[(i, j)] == self.values[(j, i)]))
    }
}

/// Pairwise cosine similarity between the rows of `vectors`
pub fn pairwise_cosine(vectors: ArrayView2<'_, f64>, cancel: &CancelFlag) -> Result<SimilarityMatrix> {
    let n = vectors.nrows();

    let mut scaled = vectors.to_owned();
    for mut row in scaled.outer_iter_mut() {
        let max_abs = row.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        if max_abs > 0.0 && max_abs.is_finite() {
            row.mapv_inplace(|v| v / max_abs);
        } else {
            // all-zero or non-finite rows compare as zero vectors
            row.fill(0.0);
        }
    }
    let vectors = scaled.view();

    let norms: Vec<f64> = vectors.outer_iter().map(|v| v.dot(&v).sqrt()).collect();

    let upper: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| -> Result<Vec<f64>> {
            cancel.check()?;
            let vi = vectors.row(i);
            let row: Vec<f64> = (i + 1..n)
                .map(|j| {
                    if norms[i] == 0.0 || norms[j] == 0.0 {
                        0.0
                    } else {
                        let sim = vi.dot(&vectors.row(j)) / (norms[i] * norms[j]);
                        sim.clamp(-1.0, 1.0)
                    }
                })
                .collect();
            Ok(row)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut values = Array2::<f64>::zeros((n, n));
    for (i, row) in upper.into_iter().enumerate() {
        values[(i, i)] = 1.0;
        for (offset, sim) in row.into_iter().enumerate() {
            let j = i + 1 + offset;
            values[(i, j)] = sim;
            values[(j, i)] = sim;
        }
    }

    Ok(SimilarityMatrix { values })
}

/// Computes user-user and item-item similarity from an interaction matrix
#[derive(Debug, Clone, Default)]
pub struct SimilarityEngine {
    cancel: CancelFlag,
}

impl SimilarityEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine whose passes abort with `Cancelled` once `cancel` is tripped
    pub fn with_cancel(cancel: CancelFlag) -> Self {
        Self { cancel }
    }

    /// n_users × n_users similarity over matrix rows
    pub fn compute_user_similarity(&self, matrix: &InteractionMatrix) -> Result<SimilarityMatrix> {
        self.compute_similarity(matrix, Axis::User)
    }

    /// n_items × n_items similarity over matrix columns
    pub fn compute_item_similarity(&self, matrix: &InteractionMatrix) -> Result<SimilarityMatrix> {
        self.compute_similarity(matrix, Axis::Item)
    }

    pub fn compute_similarity(
        &self,
        matrix: &InteractionMatrix,
        axis: Axis,
    ) -> Result<SimilarityMatrix> {
        let start = Instant::now();
        let weights = matrix.weights();

        let vectors = match axis {
            Axis::User => weights.view(),
            Axis::Item => weights.t(),
        };
        debug!(
            ?axis,
            vectors = vectors.nrows(),
            dims = vectors.ncols(),
            "Computing cosine similarity"
        );

        let similarity = pairwise_cosine(vectors, &self.cancel)?;

        info!(
            ?axis,
            size = similarity.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Similarity matrix computed"
        );

        Ok(similarity)
    }
}

/// Similarity along `axis` without cancellation support
pub fn compute_similarity(matrix: &InteractionMatrix, axis: Axis) -> Result<SimilarityMatrix> {
    SimilarityEngine::new().compute_similarity(matrix, axis)
}
