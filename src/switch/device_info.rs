//! Device registry metadata for a cloud entity.

use crate::model::{Describe, capitalize};
use serde::Serialize;

/// Integration domain used in device identifiers.
pub const DOMAIN: &str = "sure_petcare";
pub const MANUFACTURER: &str = "Sure Petcare";

/// Device-info block handed to the host.
///
/// An all-`None` value (the `Default`) means "no device info".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub identifiers: Vec<(String, u64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<String>,
}

impl DeviceInfo {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Build the device info for `entity`.
    ///
    /// Without a name there is nothing to register, so the result is empty.
    pub fn for_entity(entity: &dyn Describe) -> Self {
        let Some(name) = entity.name() else {
            return Self::default();
        };

        Self {
            identifiers: vec![(DOMAIN.to_string(), entity.entity_id())],
            name: Some(capitalize(name)),
            manufacturer: Some(MANUFACTURER.to_string()),
            model: Some(model(entity)),
            sw_version: entity.status().and_then(|s| s.firmware_summary()),
        }
    }
}

/// Type name plus the first identifying attribute available.
fn model(entity: &dyn Describe) -> String {
    let type_name = entity.entity_type().display_name();

    let ident = non_empty(entity.serial_number())
        .map(str::to_string)
        .or_else(|| non_empty(entity.mac_address()).map(str::to_string))
        .or_else(|| entity.tag_id().map(|id| id.to_string()));

    match ident {
        Some(ident) => format!("{} ({})", type_name, ident),
        None => type_name,
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}
