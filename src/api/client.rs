//! Factory backend REST client
//!
//! HTTP client for the machine, OEE and production endpoints.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::error::{ApiError, ApiResult};
use super::FactoryApi;
use crate::telemetry::{Machine, MachineId, OeeReport, ProductionRecord, TelemetryRecord};

/// Configuration for the factory API client
#[derive(Debug, Clone)]
pub struct FactoryApiConfig {
    /// Base URL of the backend (e.g., "http://localhost:8000")
    pub base_url: String,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Bearer token of an already authenticated caller
    pub token: Option<String>,
}

impl Default for FactoryApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout_ms: 5000,
            token: None,
        }
    }
}

/// [`FactoryApi`] over HTTP
pub struct HttpFactoryApi {
    client: Client,
    config: FactoryApiConfig,
}

impl HttpFactoryApi {
    pub fn new(config: FactoryApiConfig) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| ApiError::Config(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FactoryApiConfig {
        &self.config
    }

    /// Whether requests carry credentials
    pub fn is_authorized(&self) -> bool {
        self.config.token.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn execute(&self, request: RequestBuilder) -> ApiResult<reqwest::Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(ApiError::from_request)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
            StatusCode::NOT_FOUND => ApiError::NotFound(body),
            StatusCode::SERVICE_UNAVAILABLE => ApiError::Unavailable,
            _ => ApiError::Status {
                status: status.as_u16(),
                body,
            },
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let response = self.execute(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

fn rfc3339(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[async_trait]
impl FactoryApi for HttpFactoryApi {
    async fn get_oee(
        &self,
        machine_id: MachineId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ApiResult<OeeReport> {
        let url = self.url(&format!("/api/machines/{}/oee", machine_id));
        let request = self
            .client
            .get(&url)
            .query(&[("start_time", rfc3339(&start)), ("end_time", rfc3339(&end))]);

        tracing::debug!(machine_id, start = %start, end = %end, "Querying OEE");
        self.get_json(request).await
    }

    async fn list_machines(&self) -> ApiResult<Vec<Machine>> {
        let url = self.url("/api/machines/");
        self.get_json(self.client.get(&url)).await
    }

    async fn get_machine(&self, machine_id: MachineId) -> ApiResult<Machine> {
        let url = self.url(&format!("/api/machines/{}", machine_id));
        self.get_json(self.client.get(&url)).await
    }

    async fn record_production(&self, record: ProductionRecord) -> ApiResult<()> {
        let url = self.url("/api/production/");
        self.execute(self.client.post(&url).json(&record)).await?;
        tracing::debug!(
            machine_id = record.machine_id,
            good = record.good_parts,
            defective = record.defective_parts,
            "Production recorded"
        );
        Ok(())
    }

    async fn send_machine_data(&self, machine_id: MachineId, data: &TelemetryRecord) -> ApiResult<()> {
        let url = self.url(&format!("/api/machines/{}/data", machine_id));
        self.execute(self.client.post(&url).json(data)).await?;
        Ok(())
    }
}
