// ============================================
// Interaction Store (互動資料來源)
// ============================================
//
// Where the service reads its training input and appends new events.
// Persistence is a collaborator: the engine only sees this trait.

use crate::models::{InteractionEvent, ItemDocument, TrainingInput};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InteractionStore: Send + Sync {
    /// Every user identifier, in matrix row order
    async fn known_users(&self) -> Result<Vec<String>>;

    /// Every catalog item identifier, in matrix column order
    async fn known_items(&self) -> Result<Vec<String>>;

    async fn events(&self) -> Result<Vec<InteractionEvent>>;

    async fn item_documents(&self) -> Result<Vec<ItemDocument>>;

    /// Append one event; returns the total number of stored events
    async fn record(&self, event: InteractionEvent) -> Result<u64>;
}

/// Read a full training snapshot from a store
pub async fn load_training_input(store: &dyn InteractionStore) -> Result<TrainingInput> {
    Ok(TrainingInput {
        users: store.known_users().await?,
        items: store.known_items().await?,
        events: store.events().await?,
        documents: store.item_documents().await?,
    })
}

#[derive(Debug, Default)]
struct StoreState {
    users: Vec<String>,
    user_set: HashSet<String>,
    items: Vec<String>,
    item_set: HashSet<String>,
    events: Vec<InteractionEvent>,
    documents: Vec<ItemDocument>,
}

impl StoreState {
    fn ensure_user(&mut self, user_id: &str) {
        if self.user_set.insert(user_id.to_string()) {
            self.users.push(user_id.to_string());
        }
    }
}

/// Process-local store. Users are registered on their first event; items
/// must be in the catalog before events can reference them.
#[derive(Debug, Default)]
pub struct InMemoryInteractionStore {
    state: RwLock<StoreState>,
}

impl InMemoryInteractionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register catalog items; duplicates are ignored
    pub fn add_items<I, S>(&self, item_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.state.write();
        for id in item_ids {
            let id = id.into();
            if state.item_set.insert(id.clone()) {
                state.items.push(id);
            }
        }
    }

    /// Register an item together with its descriptive document
    pub fn add_document(&self, document: ItemDocument) {
        let mut state = self.state.write();
        if state.item_set.insert(document.item_id.clone()) {
            state.items.push(document.item_id.clone());
        }
        state.documents.retain(|d| d.item_id != document.item_id);
        state.documents.push(document);
    }

    pub fn add_users<I, S>(&self, user_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.state.write();
        for id in user_ids {
            state.ensure_user(&id.into());
        }
    }

    pub fn event_count(&self) -> usize {
        self.state.read().events.len()
    }
}

#[async_trait]
impl InteractionStore for InMemoryInteractionStore {
    async fn known_users(&self) -> Result<Vec<String>> {
        Ok(self.state.read().users.clone())
    }

    async fn known_items(&self) -> Result<Vec<String>> {
        Ok(self.state.read().items.clone())
    }

    async fn events(&self) -> Result<Vec<InteractionEvent>> {
        Ok(self.state.read().events.clone())
    }

    async fn item_documents(&self) -> Result<Vec<ItemDocument>> {
        Ok(self.state.read().documents.clone())
    }

    async fn record(&self, event: InteractionEvent) -> Result<u64> {
        let mut state = self.state.write();
        if !state.item_set.contains(&event.item_id) {
            return Err(anyhow!("unknown item: {}", event.item_id));
        }
        state.ensure_user(&event.user_id);
        state.events.push(event);
        Ok(state.events.len() as u64)
    }
}
