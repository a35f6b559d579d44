//! Notification repository backed by a concurrent map.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use notifyhub_core::error::AppError;
use notifyhub_core::result::AppResult;
use notifyhub_core::traits::Repository;
use notifyhub_core::types::{NotificationId, UserId};
use notifyhub_entity::notification::{Notification, NotificationStatus};

/// In-memory notification store with optimistic versioning.
///
/// `update` only succeeds when the caller holds the latest version; the
/// stored version is bumped on every successful write.
#[derive(Debug, Clone, Default)]
pub struct MemoryNotificationStore {
    records: Arc<DashMap<NotificationId, Notification>>,
}

impl MemoryNotificationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// List a user's notifications, newest first.
    pub async fn find_by_user(&self, user_id: UserId) -> AppResult<Vec<Notification>> {
        let mut out: Vec<Notification> = self
            .records
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    /// Count a user's unread notifications.
    pub async fn count_unread(&self, user_id: UserId) -> AppResult<u64> {
        Ok(self
            .records
            .iter()
            .filter(|entry| entry.user_id == user_id && entry.status == NotificationStatus::Unread)
            .count() as u64)
    }
}

#[async_trait]
impl Repository<Notification, NotificationId> for MemoryNotificationStore {
    async fn find_by_id(&self, id: &NotificationId) -> AppResult<Option<Notification>> {
        Ok(self.records.get(id).map(|entry| entry.value().clone()))
    }

    async fn create(&self, entity: &Notification) -> AppResult<Notification> {
        match self.records.entry(entity.id) {
            Entry::Occupied(_) => Err(AppError::database(format!(
                "Notification {} already exists",
                entity.id
            ))),
            Entry::Vacant(slot) => {
                let mut stored = entity.clone();
                stored.version = 1;
                slot.insert(stored.clone());
                debug!(notification_id = %stored.id, user_id = %stored.user_id, "Notification stored");
                Ok(stored)
            }
        }
    }

    async fn update(&self, entity: &Notification) -> AppResult<Notification> {
        let mut current = self
            .records
            .get_mut(&entity.id)
            .ok_or_else(|| AppError::not_found(format!("Notification {} not found", entity.id)))?;

        if current.version != entity.version {
            return Err(AppError::database(format!(
                "Version conflict on notification {}: stored {}, given {}",
                entity.id, current.version, entity.version
            )));
        }

        let mut stored = entity.clone();
        stored.version = current.version + 1;
        stored.updated_at = Utc::now();
        *current = stored.clone();
        Ok(stored)
    }

    async fn delete(&self, id: &NotificationId) -> AppResult<bool> {
        Ok(self.records.remove(id).is_some())
    }

    async fn count(&self) -> AppResult<u64> {
        Ok(self.records.len() as u64)
    }
}
