use std::collections::BTreeMap;

use chrono::Utc;
use tokio::sync::RwLock;

use itemdesk_core::domain::item::{Item, ItemChanges, ItemId, NewItem, SYSTEM_USER};

use super::{ItemRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryItemRepository {
    state: RwLock<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    items: BTreeMap<i64, Item>,
}

impl InMemoryItemRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ItemRepository for InMemoryItemRepository {
    async fn create(&self, item: NewItem) -> Result<Item, RepositoryError> {
        let mut state = self.state.write().await;
        let code = item.code.trim().to_string();
        if state.items.values().any(|existing| existing.code == code) {
            return Err(RepositoryError::Conflict(format!("item code `{code}` already exists")));
        }

        state.next_id += 1;
        let now = Utc::now();
        let created = Item {
            id: ItemId(state.next_id),
            code,
            description: item.description.trim().to_string(),
            unit_id: item.unit_id,
            cost_price: item.cost_price,
            selling_price: item.selling_price,
            user_created: SYSTEM_USER.to_string(),
            user_modified: SYSTEM_USER.to_string(),
            created_at: now,
            updated_at: now,
        };
        state.items.insert(created.id.0, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: ItemId) -> Result<Option<Item>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.items.get(&id.0).cloned())
    }

    async fn list(&self) -> Result<Vec<Item>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.items.values().cloned().collect())
    }

    async fn update(
        &self,
        id: ItemId,
        changes: ItemChanges,
    ) -> Result<Option<Item>, RepositoryError> {
        let mut state = self.state.write().await;
        if let Some(code) = changes.code.as_deref().map(str::trim) {
            let taken = state.items.values().any(|existing| existing.code == code && existing.id != id);
            if taken {
                return Err(RepositoryError::Conflict(format!("item code `{code}` already exists")));
            }
        }

        let Some(item) = state.items.get_mut(&id.0) else {
            return Ok(None);
        };
        changes.apply_to(item, Utc::now());
        Ok(Some(item.clone()))
    }
}
