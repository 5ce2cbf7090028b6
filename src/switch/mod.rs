//! Switch entities exposed to the host automation framework.

mod access;
mod device_info;
mod discovery;

pub use access::{ConfirmPolicy, PetFeederAccess};
pub use device_info::{DOMAIN, DeviceInfo, MANUFACTURER};
pub use discovery::{discover_pairs, discover_toggles};

use crate::error::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Contract of an on/off entity as seen by the host.
#[async_trait]
pub trait ToggleEntity: Send + Sync {
    fn name(&self) -> &str;

    fn unique_id(&self) -> &str;

    fn available(&self) -> bool;

    /// `None` when the state cannot currently be determined.
    fn is_on(&self) -> Option<bool>;

    fn device_info(&self) -> DeviceInfo;

    /// Raw attributes of the backing entity, if it reports a status.
    fn extra_state_attributes(&self) -> Option<Map<String, Value>> {
        None
    }

    async fn turn_on(&self) -> Result<()>;

    async fn turn_off(&self) -> Result<()>;
}
