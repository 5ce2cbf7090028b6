//! Status records attached to pets and devices.
//!
//! Only the firmware version block is typed. Everything else in the
//! vendor's status object is kept as raw JSON so that availability
//! ("has any status at all") can still be judged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Status block of a cloud entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Status {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Versions>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Status {
    pub fn is_empty(&self) -> bool {
        self.version.is_none() && self.other.is_empty()
    }

    /// Firmware string for display.
    ///
    /// Devices with separate LCD and RF modules report both as
    /// `"lcd: X | fw: Y"`. Otherwise the plain device firmware is used.
    pub fn firmware_summary(&self) -> Option<String> {
        let versions = self.version.as_ref()?;

        let lcd = versions.lcd.as_ref().filter(|v| !v.is_empty());
        let rf = versions.rf.as_ref().filter(|v| !v.is_empty());
        if let (Some(lcd), Some(rf)) = (lcd, rf)
            && let (Some(lcd_fw), Some(rf_fw)) = (lcd.firmware(), rf.firmware())
        {
            return Some(format!("lcd: {lcd_fw} | fw: {rf_fw}"));
        }

        versions.device.as_ref().and_then(VersionRecord::firmware)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Versions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<VersionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lcd: Option<VersionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rf: Option<VersionRecord>,
}

/// A firmware record. Some products nest the firmware one level deeper
/// under `version`, e.g. `{"version": {"firmware": 1.22}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Box<VersionRecord>>,
}

impl VersionRecord {
    pub fn is_empty(&self) -> bool {
        self.firmware.is_none() && self.version.is_none()
    }

    pub fn firmware(&self) -> Option<String> {
        match &self.version {
            Some(nested) => nested.firmware(),
            None => self.firmware.as_ref().map(render_firmware),
        }
    }
}

fn render_firmware(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
