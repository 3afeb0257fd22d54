// ============================================
// Matrix Builder (交互矩陣構建)
// ============================================
//
// Converts the raw interaction log into a dense user-item matrix:
// 1. Assign stable indices to every known user and item (0..n-1, no gaps)
// 2. Sum signed event weights per (user, item) cell
// 3. Clamp every cell at zero (dislike never drives a cell negative)
// 4. Record positive seeds (like / purchase) and raw per-item event counts

use crate::error::{IdentifierKind, RecommendError, Result};
use crate::models::{InteractionEvent, InteractionType};
use ndarray::{Array2, ArrayView1};
use std::collections::HashMap;
use tracing::{debug, info};

/// Stable id <-> index assignment for one identifier space
#[derive(Debug, Clone, Default)]
pub struct IdIndex {
    ids: Vec<String>,
    positions: HashMap<String, usize>,
}

impl IdIndex {
    /// Index ids in enumeration order. Duplicates are rejected.
    pub fn new(ids: &[String], kind: IdentifierKind) -> Result<Self> {
        let mut positions = HashMap::with_capacity(ids.len());
        for (idx, id) in ids.iter().enumerate() {
            if positions.insert(id.clone(), idx).is_some() {
                return Err(RecommendError::InvalidIdentifier {
                    kind,
                    id: id.clone(),
                });
            }
        }

        Ok(Self {
            ids: ids.to_vec(),
            positions,
        })
    }

    /// Ids "0".."n-1" for matrices built directly from weights
    pub fn sequential(len: usize) -> Self {
        let ids: Vec<String> = (0..len).map(|i| i.to_string()).collect();
        let positions = ids.iter().cloned().zip(0..len).collect();
        Self { ids, positions }
    }

    pub fn get(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn id(&self, idx: usize) -> Option<&str> {
        self.ids.get(idx).map(String::as_str)
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Item a user liked or purchased, with the strongest positive signal seen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositiveSeed {
    pub item_idx: usize,
    pub strongest: InteractionType,
}

/// Dense user-item interaction matrix
///
/// Rows are users, columns are items. A zero cell means "no recorded
/// interaction". Immutable once built.
#[derive(Debug, Clone)]
pub struct InteractionMatrix {
    weights: Array2<f64>,
    users: IdIndex,
    items: IdIndex,
    positive_seeds: Vec<Vec<PositiveSeed>>,
    item_event_counts: Vec<u64>,
}

impl InteractionMatrix {
    /// Wrap an existing weight array. Negative or NaN cells are clamped to zero.
    pub fn from_weights(mut weights: Array2<f64>) -> Self {
        weights.mapv_inplace(|w| if w > 0.0 { w } else { 0.0 });
        let (n_users, n_items) = weights.dim();

        let item_event_counts = (0..n_items)
            .map(|i| weights.column(i).iter().filter(|&&w| w != 0.0).count() as u64)
            .collect();

        Self {
            weights,
            users: IdIndex::sequential(n_users),
            items: IdIndex::sequential(n_items),
            positive_seeds: vec![Vec::new(); n_users],
            item_event_counts,
        }
    }

    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    pub fn n_users(&self) -> usize {
        self.weights.nrows()
    }

    pub fn n_items(&self) -> usize {
        self.weights.ncols()
    }

    pub fn users(&self) -> &IdIndex {
        &self.users
    }

    pub fn items(&self) -> &IdIndex {
        &self.items
    }

    pub fn get(&self, user_idx: usize, item_idx: usize) -> Option<f64> {
        self.weights.get((user_idx, item_idx)).copied()
    }

    pub fn user_row(&self, user_idx: usize) -> ArrayView1<'_, f64> {
        self.weights.row(user_idx)
    }

    pub fn item_column(&self, item_idx: usize) -> ArrayView1<'_, f64> {
        self.weights.column(item_idx)
    }

    /// Nonzero cell; a recorded net-zero interaction reads as "not interacted"
    pub fn has_interacted(&self, user_idx: usize, item_idx: usize) -> bool {
        self.get(user_idx, item_idx).map_or(false, |w| w != 0.0)
    }

    pub fn positive_seeds(&self, user_idx: usize) -> &[PositiveSeed] {
        self.positive_seeds
            .get(user_idx)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Raw number of events recorded against an item
    pub fn item_event_count(&self, item_idx: usize) -> u64 {
        self.item_event_counts.get(item_idx).copied().unwrap_or(0)
    }

    pub fn check_user(&self, user_idx: usize) -> Result<()> {
        if user_idx < self.n_users() {
            Ok(())
        } else {
            Err(RecommendError::invalid_user(user_idx))
        }
    }

    pub fn check_item(&self, item_idx: usize) -> Result<()> {
        if item_idx < self.n_items() {
            Ok(())
        } else {
            Err(RecommendError::invalid_item(item_idx))
        }
    }

    pub fn nonzero_cells(&self) -> usize {
        self.weights.iter().filter(|&&w| w != 0.0).count()
    }
}

/// Builds interaction matrices from raw event logs
#[derive(Debug, Clone, Copy, Default)]
pub struct MatrixBuilder;

impl MatrixBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build the matrix covering every known user and item
    ///
    /// Event order is irrelevant: weights are summed per cell and the sum is
    /// clamped at zero afterwards.
    pub fn build(
        &self,
        events: &[InteractionEvent],
        users: &[String],
        items: &[String],
    ) -> Result<InteractionMatrix> {
        let users = IdIndex::new(users, IdentifierKind::User)?;
        let items = IdIndex::new(items, IdentifierKind::Item)?;

        let mut weights = Array2::<f64>::zeros((users.len(), items.len()));
        let mut item_event_counts = vec![0u64; items.len()];
        let mut strongest: HashMap<(usize, usize), InteractionType> = HashMap::new();

        for event in events {
            let user_idx = users
                .get(&event.user_id)
                .ok_or_else(|| RecommendError::invalid_user(&event.user_id))?;
            let item_idx = items
                .get(&event.item_id)
                .ok_or_else(|| RecommendError::invalid_item(&event.item_id))?;

            weights[(user_idx, item_idx)] += event.signed_weight();
            item_event_counts[item_idx] += 1;

            if event.interaction_type.is_positive() {
                strongest
                    .entry((user_idx, item_idx))
                    .and_modify(|existing| {
                        if event.interaction_type == InteractionType::Purchase {
                            *existing = InteractionType::Purchase;
                        }
                    })
                    .or_insert(event.interaction_type);
            }
        }

        weights.mapv_inplace(|w| w.max(0.0));

        let mut positive_seeds = vec![Vec::new(); users.len()];
        for ((user_idx, item_idx), kind) in strongest {
            if weights[(user_idx, item_idx)] > 0.0 {
                positive_seeds[user_idx].push(PositiveSeed {
                    item_idx,
                    strongest: kind,
                });
            }
        }
        for seeds in &mut positive_seeds {
            seeds.sort_by_key(|s| s.item_idx);
        }

        let matrix = InteractionMatrix {
            weights,
            users,
            items,
            positive_seeds,
            item_event_counts,
        };

        info!(
            users = matrix.n_users(),
            items = matrix.n_items(),
            events = events.len(),
            nonzero_cells = matrix.nonzero_cells(),
            "Interaction matrix built"
        );

        Ok(matrix)
    }
}

/// Convenience wrapper around [`MatrixBuilder::build`]
pub fn build_matrix(
    events: &[InteractionEvent],
    users: &[String],
    items: &[String],
) -> Result<InteractionMatrix> {
    debug!(events = events.len(), "Building interaction matrix");
    MatrixBuilder::new().build(events, users, items)
}
