//! Vendor cloud API surface.
//!
//! The toggle only needs two writes (attach/detach a tag) and the
//! coordinator only needs one read (full snapshot). Both are expressed as
//! traits so they can be swapped for in-memory fakes in tests.

mod client;

pub use client::{SureApiClient, device_tag_resource};

use crate::error::ApiError;
use crate::model::Entity;
use async_trait::async_trait;
use serde_json::Value;

/// Tag writes against a device.
///
/// Both calls are idempotent on the vendor side. They return the decoded
/// response body, or `None` when the response carried no payload.
#[async_trait]
pub trait TagApi: Send + Sync {
    async fn attach_tag(&self, device_id: u64, tag_id: u64) -> Result<Option<Value>, ApiError>;

    async fn detach_tag(&self, device_id: u64, tag_id: u64) -> Result<Option<Value>, ApiError>;
}

/// Source of complete entity snapshots for the coordinator.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Entity>, ApiError>;
}
