use std::time::Duration;
use thiserror::Error as ThisError;

/// Failure talking to the vendor cloud API.
#[derive(ThisError, Debug)]
pub enum ApiError {
    #[error("HTTP {status}: {message}")]
    Server { status: u16, message: String },

    #[error("network: {0}")]
    Network(#[from] reqwest::Error),

    #[error("decode: {0}")]
    Decode(String),
}

#[derive(ThisError, Debug)]
pub enum AccessError {
    #[error("Failed to write tag {tag_id} on device {device_id}: {source}")]
    RemoteWrite {
        tag_id: u64,
        device_id: u64,
        #[source]
        source: ApiError,
    },

    #[error("Access change not confirmed within {waited:?} (expected on: {expected})")]
    ConfirmTimeout { expected: bool, waited: Duration },

    #[error("Access change cancelled before confirmation")]
    Cancelled,

    #[error("Entity not found in cache: {0}")]
    EntityMissing(u64),

    #[error("Pet {pet_id} and feeder {feeder_id} belong to different households")]
    HouseholdMismatch { pet_id: u64, feeder_id: u64 },

    #[error("Pet {0} has no tag")]
    MissingTag(u64),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AccessError>;
