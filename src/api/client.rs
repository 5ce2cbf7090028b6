//! reqwest-backed client for the Sure Petcare cloud.

use super::{SnapshotSource, TagApi};
use crate::config::ApiConfig;
use crate::error::{AccessError, ApiError, Result};
use crate::model::{Entity, Pet, RawDevice};
use async_trait::async_trait;
use log::{debug, info};
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;

/// Resource path for a single tag on a single device.
pub fn device_tag_resource(base: &str, device_id: u64, tag_id: u64) -> String {
    format!("{}/device/{}/tag/{}", base.trim_end_matches('/'), device_id, tag_id)
}

/// Client for the vendor REST API.
///
/// Authentication is a pre-issued bearer token; obtaining one is left to
/// the caller.
pub struct SureApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct StartResponse {
    data: StartData,
}

#[derive(Deserialize)]
struct StartData {
    #[serde(default)]
    devices: Vec<RawDevice>,
    #[serde(default)]
    pets: Vec<Pet>,
}

impl SureApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AccessError::Config(format!("http client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue a request and decode the JSON body, if any.
    ///
    /// Non-2xx responses become [`ApiError::Server`]. An empty body yields
    /// `Ok(None)`.
    pub async fn call(
        &self,
        method: Method,
        resource: &str,
        body: Option<&Value>,
    ) -> std::result::Result<Option<Value>, ApiError> {
        debug!("[API] {} {}", method, resource);

        let mut req = self.http.request(method, resource);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ApiError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = resp.bytes().await?;
        decode_body(&bytes)
    }
}

fn decode_body(bytes: &[u8]) -> std::result::Result<Option<Value>, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| ApiError::Decode(format!("response body: {}", e)))?;
    Ok(match value {
        Value::Null => None,
        Value::Object(ref map) if map.is_empty() => None,
        other => Some(other),
    })
}

#[async_trait]
impl TagApi for SureApiClient {
    async fn attach_tag(
        &self,
        device_id: u64,
        tag_id: u64,
    ) -> std::result::Result<Option<Value>, ApiError> {
        let resource = device_tag_resource(&self.base_url, device_id, tag_id);
        info!("[API] Attaching tag {} to device {}", tag_id, device_id);
        self.call(Method::PUT, &resource, Some(&Value::Object(Default::default())))
            .await
    }

    async fn detach_tag(
        &self,
        device_id: u64,
        tag_id: u64,
    ) -> std::result::Result<Option<Value>, ApiError> {
        let resource = device_tag_resource(&self.base_url, device_id, tag_id);
        info!("[API] Detaching tag {} from device {}", tag_id, device_id);
        self.call(Method::DELETE, &resource, None).await
    }
}

#[async_trait]
impl SnapshotSource for SureApiClient {
    async fn fetch(&self) -> std::result::Result<Vec<Entity>, ApiError> {
        let resource = format!("{}/me/start", self.base_url);
        let body = self
            .call(Method::GET, &resource, None)
            .await?
            .ok_or_else(|| ApiError::Decode("empty snapshot response".to_string()))?;
        parse_snapshot(body)
    }
}

fn parse_snapshot(body: Value) -> std::result::Result<Vec<Entity>, ApiError> {
    let start: StartResponse = serde_json::from_value(body)
        .map_err(|e| ApiError::Decode(format!("snapshot: {}", e)))?;

    let pets = start.data.pets.into_iter().map(Entity::Pet);
    let devices = start.data.devices.into_iter().map(Entity::from);
    Ok(pets.chain(devices).collect())
}
