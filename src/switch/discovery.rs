//! Enumerate pet/feeder pairs from a cache snapshot.

use super::{ConfirmPolicy, PetFeederAccess};
use crate::api::TagApi;
use crate::coordinator::EntityCache;
use crate::model::{Entity, Feeder, Pet};
use log::{info, warn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Every (pet, feeder) pair sharing a household, ordered by pet id then
/// feeder id.
pub fn discover_pairs(entities: &[Entity]) -> Vec<(u64, u64)> {
    let mut pets: Vec<&Pet> = entities
        .iter()
        .filter_map(|e| match e {
            Entity::Pet(p) => Some(p),
            _ => None,
        })
        .collect();
    let mut feeders: Vec<&Feeder> = entities
        .iter()
        .filter_map(|e| match e {
            Entity::Feeder(f) => Some(f),
            _ => None,
        })
        .collect();
    pets.sort_by_key(|p| p.id);
    feeders.sort_by_key(|f| f.id);

    pets.iter()
        .flat_map(|pet| {
            feeders
                .iter()
                .filter(move |feeder| feeder.household_id == pet.household_id)
                .map(move |feeder| (pet.id, feeder.id))
        })
        .collect()
}

/// Build one access toggle per discovered pair.
///
/// All toggles share `cancel`, so one signal stops every in-flight
/// confirmation.
pub fn discover_toggles(
    cache: Arc<dyn EntityCache>,
    api: Arc<dyn TagApi>,
    policy: ConfirmPolicy,
    cancel: &CancellationToken,
) -> Vec<PetFeederAccess> {
    let pairs = discover_pairs(&cache.entities());

    let toggles: Vec<PetFeederAccess> = pairs
        .into_iter()
        .filter_map(|(pet_id, feeder_id)| {
            match PetFeederAccess::new(cache.clone(), api.clone(), pet_id, feeder_id) {
                Ok(toggle) => Some(
                    toggle
                        .with_policy(policy)
                        .with_cancellation(cancel.child_token()),
                ),
                Err(e) => {
                    // Snapshot changed between enumeration and construction
                    warn!("[Access] Skipping pet {} / feeder {}: {}", pet_id, feeder_id, e);
                    None
                }
            }
        })
        .collect();

    info!("[Access] Discovered {} access toggle(s)", toggles.len());
    toggles
}
