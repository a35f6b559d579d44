//! Generic repository trait for the external record store.

use async_trait::async_trait;

use crate::result::AppResult;

/// Generic CRUD repository trait.
///
/// The engine only needs create / read / update; retention and listing
/// belong to the owning service.
#[async_trait]
pub trait Repository<Entity, Id>: Send + Sync + 'static
where
    Entity: Send + Sync + 'static + serde::Serialize,
    Id: Send + Sync + 'static,
{
    /// Find an entity by its primary key.
    async fn find_by_id(&self, id: &Id) -> AppResult<Option<Entity>>;

    /// Create a new entity and return the stored version.
    async fn create(&self, entity: &Entity) -> AppResult<Entity>;

    /// Update an existing entity and return the stored version.
    async fn update(&self, entity: &Entity) -> AppResult<Entity>;

    /// Delete an entity by its primary key. Returns `true` if deleted.
    async fn delete(&self, id: &Id) -> AppResult<bool>;

    /// Count stored entities.
    async fn count(&self) -> AppResult<u64>;
}
