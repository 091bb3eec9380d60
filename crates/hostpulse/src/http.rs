//! [`DataSource`] over the monitoring service's REST API.
//!
//! Endpoints (relative to the API base URL):
//! - `GET /systems/{id}`: machine record
//! - `GET /metrics/{id}?limit=N`: latest snapshots, newest first
//! - `GET /tickets?system_id={id}`: tickets of one machine
//! - `GET /systems`: all machines
//! - `GET /alerts?is_resolved=false`: unresolved alerts

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use hostpulse_core::model::{Alert, EntityId, EntityRecord, RawSnapshot, Ticket};
use hostpulse_core::source::{DataSource, FetchError};

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";

#[derive(Clone)]
pub struct HttpSource {
    client: Client,
    base_url: String,
}

impl HttpSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn entity_url(&self, id: EntityId) -> String {
        format!("{}/systems/{}", self.base_url, id)
    }

    fn snapshots_url(&self, id: EntityId, limit: usize) -> String {
        format!("{}/metrics/{}?limit={}", self.base_url, id, limit)
    }

    fn tickets_url(&self, id: EntityId) -> String {
        format!("{}/tickets?system_id={}", self.base_url, id)
    }

    fn entities_url(&self) -> String {
        format!("{}/systems", self.base_url)
    }

    fn alerts_url(&self) -> String {
        format!("{}/alerts?is_resolved=false", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, FetchError> {
        trace!(%url, "GET");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        decode(status, &body)
    }
}

/// Error body of the service: `{"detail": "..."}`.
#[derive(Deserialize)]
struct ErrorBody {
    detail: String,
}

fn decode<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, FetchError> {
    if !(200..300).contains(&status) {
        let message = serde_json::from_str::<ErrorBody>(body)
            .map(|b| b.detail)
            .unwrap_or_else(|_| body.trim().to_string());
        return Err(FetchError::Status { status, message });
    }
    serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))
}

#[async_trait]
impl DataSource for HttpSource {
    async fn fetch_entity(&self, id: EntityId) -> Result<EntityRecord, FetchError> {
        self.get_json(self.entity_url(id)).await
    }

    async fn fetch_snapshots(
        &self,
        id: EntityId,
        limit: usize,
    ) -> Result<Vec<RawSnapshot>, FetchError> {
        self.get_json(self.snapshots_url(id, limit)).await
    }

    async fn fetch_auxiliary(&self, id: EntityId) -> Result<Vec<Ticket>, FetchError> {
        self.get_json(self.tickets_url(id)).await
    }

    async fn fetch_entities(&self) -> Result<Vec<EntityRecord>, FetchError> {
        self.get_json(self.entities_url()).await
    }

    async fn fetch_alerts(&self) -> Result<Vec<Alert>, FetchError> {
        self.get_json(self.alerts_url()).await
    }
}
