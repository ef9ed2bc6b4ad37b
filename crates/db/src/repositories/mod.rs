use async_trait::async_trait;
use thiserror::Error;

use itemdesk_core::domain::item::{Item, ItemChanges, ItemId, NewItem};

pub mod item;
pub mod memory;

pub use item::SqlItemRepository;
pub use memory::InMemoryItemRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Storage backend for the item master catalog.
#[async_trait]
pub trait ItemRepository: Send + Sync {
    async fn create(&self, item: NewItem) -> Result<Item, RepositoryError>;
    async fn find_by_id(&self, id: ItemId) -> Result<Option<Item>, RepositoryError>;
    async fn list(&self) -> Result<Vec<Item>, RepositoryError>;
    /// Returns `None` when no item has the given id.
    async fn update(
        &self,
        id: ItemId,
        changes: ItemChanges,
    ) -> Result<Option<Item>, RepositoryError>;
}
