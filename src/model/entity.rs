//! Pet, feeder and device snapshots as cached from the vendor cloud.

use super::Status;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Vendor product numbering, as reported in `product_id`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::FromRepr,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum EntityType {
    Pet = 0,
    Hub = 1,
    Repeater = 2,
    PetFlap = 3,
    Feeder = 4,
    Programmer = 5,
    CatFlap = 6,
    FeederLite = 7,
    Felaqua = 8,
}

impl EntityType {
    /// Human-readable type name, e.g. `PET_FLAP` -> `Pet Flap`.
    pub fn display_name(self) -> String {
        let raw: &'static str = self.into();
        raw.split('_').map(capitalize).collect::<Vec<String>>().join(" ")
    }

    pub fn is_feeder(self) -> bool {
        matches!(self, Self::Feeder | Self::FeederLite)
    }
}

/// First character upper-cased, the rest lower-cased.
pub(crate) fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// RFID/microchip tag authorised on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pet {
    pub id: u64,
    pub household_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    /// Remaining cloud attributes, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Pet {
    pub fn new(id: u64, household_id: u64, tag_id: Option<u64>) -> Self {
        Self {
            id,
            household_id,
            name: None,
            tag_id,
            status: None,
            extra: Map::new(),
        }
    }

    /// The pet as the cloud reported it, typed fields included.
    pub fn raw_data(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feeder {
    pub id: u64,
    pub household_id: u64,
    pub entity_type: EntityType,
    pub name: Option<String>,
    pub serial_number: Option<String>,
    pub mac_address: Option<String>,
    pub tags: Vec<Tag>,
    pub status: Option<Status>,
}

impl Feeder {
    pub fn new(id: u64, household_id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            household_id,
            entity_type: EntityType::Feeder,
            name: Some(name.into()),
            serial_number: None,
            mac_address: None,
            tags: Vec::new(),
            status: None,
        }
    }

    pub fn with_tags(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.tags = ids.into_iter().map(|id| Tag { id }).collect();
        self
    }

    pub fn has_tag(&self, tag_id: u64) -> bool {
        self.tags.iter().any(|t| t.id == tag_id)
    }
}

/// Any product that is neither a pet nor a feeder (hubs, flaps, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: u64,
    pub household_id: u64,
    pub entity_type: Option<EntityType>,
    pub name: Option<String>,
}

/// Device object as delivered by the cloud before it is classified.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDevice {
    pub id: u64,
    pub household_id: u64,
    pub product_id: u8,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub status: Option<Status>,
}

/// One cached snapshot, keyed by its id in the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Pet(Pet),
    Feeder(Feeder),
    Device(Device),
}

impl Entity {
    pub fn id(&self) -> u64 {
        match self {
            Self::Pet(p) => p.id,
            Self::Feeder(f) => f.id,
            Self::Device(d) => d.id,
        }
    }

    pub fn household_id(&self) -> u64 {
        match self {
            Self::Pet(p) => p.household_id,
            Self::Feeder(f) => f.household_id,
            Self::Device(d) => d.household_id,
        }
    }

    pub fn entity_type(&self) -> Option<EntityType> {
        match self {
            Self::Pet(_) => Some(EntityType::Pet),
            Self::Feeder(f) => Some(f.entity_type),
            Self::Device(d) => d.entity_type,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Pet(p) => p.name.as_deref(),
            Self::Feeder(f) => f.name.as_deref(),
            Self::Device(d) => d.name.as_deref(),
        }
    }
}

impl From<RawDevice> for Entity {
    fn from(raw: RawDevice) -> Self {
        match EntityType::from_repr(raw.product_id) {
            Some(kind) if kind.is_feeder() => Self::Feeder(Feeder {
                id: raw.id,
                household_id: raw.household_id,
                entity_type: kind,
                name: raw.name,
                serial_number: raw.serial_number,
                mac_address: raw.mac_address,
                tags: raw.tags,
                status: raw.status,
            }),
            kind => Self::Device(Device {
                id: raw.id,
                household_id: raw.household_id,
                entity_type: kind,
                name: raw.name,
            }),
        }
    }
}

impl From<Pet> for Entity {
    fn from(pet: Pet) -> Self {
        Self::Pet(pet)
    }
}

impl From<Feeder> for Entity {
    fn from(feeder: Feeder) -> Self {
        Self::Feeder(feeder)
    }
}

/// Identifying attributes used to describe an entity to the host.
///
/// Every lookup is optional; callers compose fallbacks from them.
pub trait Describe {
    fn entity_id(&self) -> u64;
    fn entity_type(&self) -> EntityType;
    fn name(&self) -> Option<&str>;
    fn status(&self) -> Option<&Status>;

    fn serial_number(&self) -> Option<&str> {
        None
    }

    fn mac_address(&self) -> Option<&str> {
        None
    }

    fn tag_id(&self) -> Option<u64> {
        None
    }
}

impl Describe for Pet {
    fn entity_id(&self) -> u64 {
        self.id
    }

    fn entity_type(&self) -> EntityType {
        EntityType::Pet
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    fn tag_id(&self) -> Option<u64> {
        self.tag_id
    }
}

impl Describe for Feeder {
    fn entity_id(&self) -> u64 {
        self.id
    }

    fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    fn serial_number(&self) -> Option<&str> {
        self.serial_number.as_deref()
    }

    fn mac_address(&self) -> Option<&str> {
        self.mac_address.as_deref()
    }
}
