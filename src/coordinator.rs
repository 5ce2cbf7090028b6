//! Snapshot cache shared by all toggles.
//!
//! Toggles only see the narrow [`EntityCache`] trait: lookup by id and
//! "please refresh". The [`Coordinator`] owns the map and replaces it
//! wholesale from a [`SnapshotSource`] on every refresh.

use crate::api::SnapshotSource;
use crate::error::ApiError;
use crate::model::{Entity, Feeder, Pet};
use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Read-only view of the entity cache.
#[async_trait]
pub trait EntityCache: Send + Sync {
    fn entity(&self, id: u64) -> Option<Entity>;

    fn entities(&self) -> Vec<Entity>;

    /// Ask the owner to refresh. Outcome is observed through later lookups.
    async fn request_refresh(&self);

    fn pet(&self, id: u64) -> Option<Pet> {
        match self.entity(id)? {
            Entity::Pet(pet) => Some(pet),
            _ => None,
        }
    }

    fn feeder(&self, id: u64) -> Option<Feeder> {
        match self.entity(id)? {
            Entity::Feeder(feeder) => Some(feeder),
            _ => None,
        }
    }
}

pub struct Coordinator {
    source: Arc<dyn SnapshotSource>,
    data: RwLock<HashMap<u64, Entity>>,
}

impl Coordinator {
    pub fn new(source: Arc<dyn SnapshotSource>) -> Self {
        Self {
            source,
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch a fresh snapshot and replace the cache.
    ///
    /// On failure the previous snapshot is kept.
    pub async fn refresh(&self) -> Result<usize, ApiError> {
        let entities = self.source.fetch().await?;
        let count = entities.len();
        let map = entities.into_iter().map(|e| (e.id(), e)).collect();
        *self.data.write() = map;
        debug!("[Coordinator] Snapshot refreshed ({} entities)", count);
        Ok(count)
    }

    /// Number of cached entities.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Refresh on a fixed interval until `cancel` fires.
    pub fn spawn_periodic(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            info!("[Coordinator] Periodic refresh every {:?}", interval);
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; callers refresh up front.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => coordinator.request_refresh().await,
                }
            }
            info!("[Coordinator] Periodic refresh stopped");
        })
    }
}

#[async_trait]
impl EntityCache for Coordinator {
    fn entity(&self, id: u64) -> Option<Entity> {
        self.data.read().get(&id).cloned()
    }

    fn entities(&self) -> Vec<Entity> {
        let mut all: Vec<Entity> = self.data.read().values().cloned().collect();
        all.sort_by_key(Entity::id);
        all
    }

    async fn request_refresh(&self) {
        if let Err(e) = self.refresh().await {
            warn!("[Coordinator] Refresh failed, keeping previous snapshot: {}", e);
        }
    }
}
