//! Pet/feeder access toggle.
//!
//! "On" means the pet's tag is authorised on the feeder. Changing the state
//! writes to the cloud and then polls the coordinator until the cached
//! snapshot agrees, bounded by [`ConfirmPolicy`] and cancellable.

use super::{DeviceInfo, ToggleEntity};
use crate::api::TagApi;
use crate::config::AccessConfig;
use crate::coordinator::EntityCache;
use crate::error::{AccessError, Result};
use crate::model::{Describe, EntityType};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How long and how often to poll for a tag write to show up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmPolicy {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Default for ConfirmPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_wait: Duration::from_secs(60),
        }
    }
}

impl From<&AccessConfig> for ConfirmPolicy {
    fn from(config: &AccessConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            max_wait: config.confirm_timeout(),
        }
    }
}

/// Switch granting one pet access to one feeder.
pub struct PetFeederAccess {
    cache: Arc<dyn EntityCache>,
    api: Arc<dyn TagApi>,
    pet_id: u64,
    feeder_id: u64,
    household_id: u64,
    name: String,
    unique_id: String,
    policy: ConfirmPolicy,
    cancel: CancellationToken,
}

impl PetFeederAccess {
    /// Create a toggle for a pet and a feeder of the same household.
    ///
    /// Both must currently be cached.
    pub fn new(
        cache: Arc<dyn EntityCache>,
        api: Arc<dyn TagApi>,
        pet_id: u64,
        feeder_id: u64,
    ) -> Result<Self> {
        let pet = cache.pet(pet_id).ok_or(AccessError::EntityMissing(pet_id))?;
        let feeder = cache
            .feeder(feeder_id)
            .ok_or(AccessError::EntityMissing(feeder_id))?;

        if pet.household_id != feeder.household_id {
            return Err(AccessError::HouseholdMismatch { pet_id, feeder_id });
        }

        let type_name = EntityType::Pet.display_name();
        let pet_name = name_or_placeholder(pet.name.as_deref(), EntityType::Pet);
        let feeder_name = name_or_placeholder(feeder.name.as_deref(), feeder.entity_type);

        Ok(Self {
            cache,
            api,
            pet_id,
            feeder_id,
            household_id: pet.household_id,
            name: format!("{} {} {} Access", type_name, pet_name, feeder_name),
            unique_id: format!(
                "{}-{}-{}-feeder-access",
                pet.household_id, pet_id, feeder_id
            ),
            policy: ConfirmPolicy::default(),
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_policy(mut self, policy: ConfirmPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Tie in-flight confirmations to an external token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn pet_id(&self) -> u64 {
        self.pet_id
    }

    pub fn feeder_id(&self) -> u64 {
        self.feeder_id
    }

    pub fn household_id(&self) -> u64 {
        self.household_id
    }

    /// Current access state from the cached snapshots.
    ///
    /// `None` while either snapshot is missing.
    fn query(&self) -> Option<bool> {
        let pet = self.cache.pet(self.pet_id)?;
        let feeder = self.cache.feeder(self.feeder_id)?;
        Some(pet.tag_id.is_some_and(|tag| feeder.has_tag(tag)))
    }

    async fn set_access(&self, on: bool) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(AccessError::Cancelled);
        }

        let pet = self
            .cache
            .pet(self.pet_id)
            .ok_or(AccessError::EntityMissing(self.pet_id))?;
        let Some(tag_id) = pet.tag_id else {
            if on {
                return Err(AccessError::MissingTag(self.pet_id));
            }
            // An untagged pet is never authorised; nothing to detach.
            debug!("[Access] {}: pet has no tag, nothing to detach", self.name);
            return self.confirm(false).await;
        };

        info!(
            "[Access] {}: {} tag {} on feeder {}",
            self.name,
            if on { "attaching" } else { "detaching" },
            tag_id,
            self.feeder_id
        );

        let written = if on {
            self.api.attach_tag(self.feeder_id, tag_id).await
        } else {
            self.api.detach_tag(self.feeder_id, tag_id).await
        };
        let response = written.map_err(|source| AccessError::RemoteWrite {
            tag_id,
            device_id: self.feeder_id,
            source,
        })?;
        if let Some(body) = response {
            debug!("[Access] {}: write response {}", self.name, body);
        }

        self.confirm(on).await
    }

    /// Poll until the cache reports `expected`.
    async fn confirm(&self, expected: bool) -> Result<()> {
        let started = Instant::now();
        let deadline = started + self.policy.max_wait;
        let mut polls = 0u32;

        while self.query() != Some(expected) {
            if Instant::now() >= deadline {
                warn!(
                    "[Access] {}: not confirmed after {} polls",
                    self.name, polls
                );
                return Err(AccessError::ConfirmTimeout {
                    expected,
                    waited: started.elapsed(),
                });
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(AccessError::Cancelled),
                _ = tokio::time::sleep(self.policy.interval) => {}
            }
            let refreshed = tokio::time::timeout_at(deadline, async {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => Err(AccessError::Cancelled),
                    _ = self.cache.request_refresh() => Ok(()),
                }
            })
            .await;
            match refreshed {
                Ok(result) => result?,
                Err(_) => debug!("[Access] {}: refresh still running at deadline", self.name),
            }
            polls += 1;
        }

        info!(
            "[Access] {}: confirmed {} after {} polls",
            self.name,
            if expected { "on" } else { "off" },
            polls
        );
        Ok(())
    }
}

fn name_or_placeholder(name: Option<&str>, kind: EntityType) -> String {
    match name {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("Unnamed {}", kind.display_name()),
    }
}

#[async_trait]
impl ToggleEntity for PetFeederAccess {
    fn name(&self) -> &str {
        &self.name
    }

    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn available(&self) -> bool {
        self.cache
            .pet(self.pet_id)
            .and_then(|pet| pet.status)
            .is_some_and(|status| !status.is_empty())
    }

    fn is_on(&self) -> Option<bool> {
        self.query()
    }

    fn device_info(&self) -> DeviceInfo {
        match self.cache.pet(self.pet_id) {
            Some(pet) => DeviceInfo::for_entity(&pet as &dyn Describe),
            None => DeviceInfo::default(),
        }
    }

    fn extra_state_attributes(&self) -> Option<Map<String, Value>> {
        let pet = self.cache.pet(self.pet_id)?;
        if pet.status.as_ref().is_none_or(|status| status.is_empty()) {
            return None;
        }
        Some(pet.raw_data())
    }

    async fn turn_on(&self) -> Result<()> {
        self.set_access(true).await
    }

    async fn turn_off(&self) -> Result<()> {
        self.set_access(false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::model::{Entity, Feeder, Pet, Status};
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// In-memory cloud: writes land in `remote`, refreshes copy it into
    /// `cached` unless propagation is stalled.
    struct FakeCloud {
        remote: Mutex<HashMap<u64, Entity>>,
        cached: Mutex<HashMap<u64, Entity>>,
        propagate: AtomicBool,
        fail_writes: AtomicBool,
        hang_refresh: AtomicBool,
        writes: Mutex<Vec<(&'static str, u64, u64)>>,
        refreshes: AtomicUsize,
    }

    impl FakeCloud {
        fn new(entities: Vec<Entity>) -> Arc<Self> {
            let map: HashMap<u64, Entity> = entities.into_iter().map(|e| (e.id(), e)).collect();
            Arc::new(Self {
                remote: Mutex::new(map.clone()),
                cached: Mutex::new(map),
                propagate: AtomicBool::new(true),
                fail_writes: AtomicBool::new(false),
                hang_refresh: AtomicBool::new(false),
                writes: Mutex::new(Vec::new()),
                refreshes: AtomicUsize::new(0),
            })
        }

        fn edit_feeder(&self, id: u64, f: impl FnOnce(&mut Feeder)) -> std::result::Result<(), ApiError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(ApiError::Server {
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            match self.remote.lock().get_mut(&id) {
                Some(Entity::Feeder(feeder)) => {
                    f(feeder);
                    Ok(())
                }
                _ => Err(ApiError::Server {
                    status: 404,
                    message: "no such device".to_string(),
                }),
            }
        }

        fn cached_tags(&self, id: u64) -> Vec<u64> {
            match self.cached.lock().get(&id) {
                Some(Entity::Feeder(f)) => {
                    let mut tags: Vec<u64> = f.tags.iter().map(|t| t.id).collect();
                    tags.sort_unstable();
                    tags
                }
                _ => Vec::new(),
            }
        }
    }

    #[async_trait]
    impl EntityCache for FakeCloud {
        fn entity(&self, id: u64) -> Option<Entity> {
            self.cached.lock().get(&id).cloned()
        }

        fn entities(&self) -> Vec<Entity> {
            self.cached.lock().values().cloned().collect()
        }

        async fn request_refresh(&self) {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            if self.hang_refresh.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.propagate.load(Ordering::SeqCst) {
                let remote = self.remote.lock().clone();
                *self.cached.lock() = remote;
            }
        }
    }

    #[async_trait]
    impl TagApi for FakeCloud {
        async fn attach_tag(&self, device_id: u64, tag_id: u64) -> std::result::Result<Option<Value>, ApiError> {
            self.writes.lock().push(("PUT", device_id, tag_id));
            self.edit_feeder(device_id, |f| {
                if !f.has_tag(tag_id) {
                    f.tags.push(crate::model::Tag { id: tag_id });
                }
            })?;
            Ok(Some(json!({"data": {"id": tag_id}})))
        }

        async fn detach_tag(&self, device_id: u64, tag_id: u64) -> std::result::Result<Option<Value>, ApiError> {
            self.writes.lock().push(("DELETE", device_id, tag_id));
            self.edit_feeder(device_id, |f| f.tags.retain(|t| t.id != tag_id))?;
            Ok(None)
        }
    }

    fn household(pet_tag: Option<u64>, feeder_tags: &[u64]) -> Arc<FakeCloud> {
        FakeCloud::new(vec![
            Pet::new(1, 100, pet_tag).with_name("Tom").into(),
            Feeder::new(10, 100, "Kitchen")
                .with_tags(feeder_tags.iter().copied())
                .into(),
            Feeder::new(20, 200, "Garage").into(),
        ])
    }

    fn toggle(cloud: &Arc<FakeCloud>) -> PetFeederAccess {
        PetFeederAccess::new(cloud.clone(), cloud.clone(), 1, 10).unwrap()
    }

    #[test]
    fn test_query_states() {
        let cloud = household(Some(7), &[3, 7, 9]);
        let access = toggle(&cloud);
        assert_eq!(access.is_on(), Some(true));

        let cloud = household(Some(7), &[3, 9]);
        let access = toggle(&cloud);
        assert_eq!(access.is_on(), Some(false));

        // Snapshot vanished from the cache
        cloud.cached.lock().remove(&10);
        assert_eq!(access.is_on(), None);
    }

    #[test]
    fn test_untagged_pet_is_off() {
        let cloud = household(None, &[3]);
        assert_eq!(toggle(&cloud).is_on(), Some(false));
    }

    #[test]
    fn test_construction_checks_household() {
        let cloud = household(Some(7), &[]);
        assert!(matches!(
            PetFeederAccess::new(cloud.clone(), cloud.clone(), 1, 20),
            Err(AccessError::HouseholdMismatch { pet_id: 1, feeder_id: 20 })
        ));
        assert!(matches!(
            PetFeederAccess::new(cloud.clone(), cloud.clone(), 1, 99),
            Err(AccessError::EntityMissing(99))
        ));
        // A feeder id is not a pet
        assert!(matches!(
            PetFeederAccess::new(cloud.clone(), cloud.clone(), 10, 10),
            Err(AccessError::EntityMissing(10))
        ));
    }

    #[test]
    fn test_display_metadata() {
        let cloud = FakeCloud::new(vec![
            Pet::new(1, 100, Some(7)).with_name("").into(),
            Feeder::new(10, 100, "Kitchen").into(),
        ]);
        let access = toggle(&cloud);
        assert_eq!(access.name(), "Pet Unnamed Pet Kitchen Access");
        assert_eq!(access.unique_id(), "100-1-10-feeder-access");

        let cloud = household(Some(7), &[]);
        assert_eq!(toggle(&cloud).name(), "Pet Tom Kitchen Access");
    }

    #[test]
    fn test_unnamed_feeder_gets_placeholder() {
        let mut nameless = Feeder::new(10, 100, "");
        let cloud = FakeCloud::new(vec![
            Pet::new(1, 100, Some(7)).with_name("Tom").into(),
            nameless.clone().into(),
        ]);
        assert_eq!(toggle(&cloud).name(), "Pet Tom Unnamed Feeder Access");

        nameless.name = None;
        let cloud = FakeCloud::new(vec![
            Pet::new(1, 100, Some(7)).with_name("Tom").into(),
            nameless.into(),
        ]);
        assert_eq!(toggle(&cloud).name(), "Pet Tom Unnamed Feeder Access");
    }

    #[test]
    fn test_extra_attributes_need_status() {
        let cloud = household(Some(7), &[]);
        let access = toggle(&cloud);
        assert_eq!(access.extra_state_attributes(), None);

        let pet: Pet = serde_json::from_value(json!({
            "id": 1,
            "household_id": 100,
            "name": "Tom",
            "tag_id": 7,
            "gender": 1,
            "status": {"activity": {"where": 1}}
        }))
        .unwrap();
        cloud.cached.lock().insert(1, pet.into());

        let attrs = access.extra_state_attributes().unwrap();
        assert_eq!(attrs.get("gender"), Some(&json!(1)));
        assert_eq!(attrs.get("tag_id"), Some(&json!(7)));
        assert_eq!(attrs.get("status"), Some(&json!({"activity": {"where": 1}})));

        // An empty status counts as no status
        let empty: Status = serde_json::from_value(json!({})).unwrap();
        cloud.cached.lock().insert(
            1,
            Pet::new(1, 100, Some(7)).with_name("Tom").with_status(empty).into(),
        );
        assert_eq!(access.extra_state_attributes(), None);
    }

    #[test]
    fn test_availability_follows_pet_status() {
        let cloud = household(Some(7), &[]);
        let access = toggle(&cloud);
        assert!(!access.available());

        let status: Status = serde_json::from_value(json!({"activity": {"where": 1}})).unwrap();
        cloud.cached.lock().insert(
            1,
            Pet::new(1, 100, Some(7)).with_name("Tom").with_status(status).into(),
        );
        assert!(access.available());
    }

    #[test]
    fn test_device_info_from_pet() {
        let cloud = household(Some(7), &[]);
        let info = toggle(&cloud).device_info();
        assert_eq!(info.model.as_deref(), Some("Pet (7)"));
        assert_eq!(info.name.as_deref(), Some("Tom"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_enable_attaches_and_confirms() {
        let cloud = household(Some(7), &[3, 9]);
        let access = toggle(&cloud);
        let started = Instant::now();

        access.turn_on().await.unwrap();

        assert_eq!(*cloud.writes.lock(), vec![("PUT", 10, 7)]);
        assert_eq!(cloud.cached_tags(10), vec![3, 7, 9]);
        assert_eq!(access.is_on(), Some(true));
        assert_eq!(cloud.refreshes.load(Ordering::SeqCst), 1);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_detaches_and_confirms() {
        let cloud = household(Some(7), &[3, 7]);
        let access = toggle(&cloud);

        access.turn_off().await.unwrap();

        assert_eq!(*cloud.writes.lock(), vec![("DELETE", 10, 7)]);
        assert_eq!(cloud.cached_tags(10), vec![3]);
        assert_eq!(access.is_on(), Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_enable_is_idempotent() {
        let cloud = household(Some(7), &[7]);
        let access = toggle(&cloud);

        access.turn_on().await.unwrap();
        access.turn_on().await.unwrap();

        assert_eq!(access.is_on(), Some(true));
        assert_eq!(cloud.cached_tags(10), vec![7]);
        // Already confirmed, so no polling was needed
        assert_eq!(cloud.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_is_idempotent() {
        let cloud = household(Some(7), &[3]);
        let access = toggle(&cloud);

        access.turn_off().await.unwrap();

        assert_eq!(access.is_on(), Some(false));
        assert_eq!(cloud.writes.lock().len(), 1);
        assert_eq!(cloud.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_propagation_keeps_polling() {
        let cloud = household(Some(7), &[3, 9]);
        cloud.propagate.store(false, Ordering::SeqCst);
        let access = toggle(&cloud);

        let outcome = tokio::time::timeout(Duration::from_secs(30), access.turn_on()).await;

        assert!(outcome.is_err(), "confirm loop must not finish without convergence");
        assert_eq!(access.is_on(), Some(false));
        assert_eq!(cloud.writes.lock().len(), 1);
        // One poll per 2s interval
        let polls = cloud.refreshes.load(Ordering::SeqCst);
        assert!((14..=15).contains(&polls), "unexpected poll count {}", polls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_propagation_times_out() {
        let cloud = household(Some(7), &[3, 9]);
        cloud.propagate.store(false, Ordering::SeqCst);
        let access = toggle(&cloud).with_policy(ConfirmPolicy {
            interval: Duration::from_secs(2),
            max_wait: Duration::from_secs(10),
        });

        let err = access.turn_on().await.unwrap_err();

        match err {
            AccessError::ConfirmTimeout { expected, waited } => {
                assert!(expected);
                assert!(waited >= Duration::from_secs(10) && waited < Duration::from_secs(12));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(cloud.refreshes.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_refresh_is_bounded_by_deadline() {
        let cloud = household(Some(7), &[3, 9]);
        cloud.hang_refresh.store(true, Ordering::SeqCst);
        let access = toggle(&cloud).with_policy(ConfirmPolicy {
            interval: Duration::from_secs(2),
            max_wait: Duration::from_secs(10),
        });

        let err = access.turn_on().await.unwrap_err();

        match err {
            AccessError::ConfirmTimeout { expected, waited } => {
                assert!(expected);
                assert!(waited >= Duration::from_secs(10) && waited < Duration::from_secs(12));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(cloud.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_confirmation() {
        let cloud = household(Some(7), &[3, 9]);
        cloud.propagate.store(false, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        let access = toggle(&cloud).with_cancellation(cancel.clone());

        let (result, _) = tokio::join!(access.turn_on(), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            cancel.cancel();
        });

        assert!(matches!(result, Err(AccessError::Cancelled)));
        assert_eq!(cloud.refreshes.load(Ordering::SeqCst), 2);

        // A cancelled toggle refuses new writes
        assert!(matches!(access.turn_off().await, Err(AccessError::Cancelled)));
        assert_eq!(cloud.writes.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_write_failure_surfaces_immediately() {
        let cloud = household(Some(7), &[3, 9]);
        cloud.fail_writes.store(true, Ordering::SeqCst);
        let access = toggle(&cloud);

        let err = access.turn_on().await.unwrap_err();

        assert!(matches!(
            err,
            AccessError::RemoteWrite {
                tag_id: 7,
                device_id: 10,
                source: ApiError::Server { status: 500, .. }
            }
        ));
        assert_eq!(cloud.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_untagged_pet_cannot_be_enabled() {
        let cloud = household(None, &[3]);
        let access = toggle(&cloud);

        assert!(matches!(
            access.turn_on().await,
            Err(AccessError::MissingTag(1))
        ));
        assert!(cloud.writes.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_untagged_pet_is_noop() {
        let cloud = household(None, &[3]);
        let access = toggle(&cloud);
        assert_eq!(access.is_on(), Some(false));

        tokio_test::assert_ok!(access.turn_off().await);

        assert_eq!(access.is_on(), Some(false));
        assert!(cloud.writes.lock().is_empty());
        assert_eq!(cloud.refreshes.load(Ordering::SeqCst), 0);
    }
}
