//! HTTP client for the local logs API

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::ClientError;
use crate::server::{ApiMessage, CommandRequest, HealthCheckResponse};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A log entry as the UI receives it: any JSON id, any JSON details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteLogEntry {
    pub id: Value,
    #[serde(default)]
    pub details: Value,
    #[serde(rename = "logTime", default)]
    pub log_time: String,
}

pub struct LogsClient {
    client: Client,
    base_url: String,
}

impl LogsClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// `GET /v1/logs?limit=<limit>`
    pub async fn fetch_logs(&self, limit: u32) -> Result<Vec<RemoteLogEntry>, ClientError> {
        let url = format!("{}/v1/logs", self.base_url);
        tracing::debug!("Fetching logs from {} (limit {})", url, limit);

        let response = self
            .client
            .get(&url)
            .query(&[("limit", limit)])
            .send()
            .await
            .map_err(ClientError::Request)?;

        decode(response).await
    }

    /// `GET /v1/health`
    pub async fn health(&self) -> Result<HealthCheckResponse, ClientError> {
        let url = format!("{}/v1/health", self.base_url);
        let response = self.client.get(&url).send().await.map_err(ClientError::Request)?;
        decode(response).await
    }

    /// `POST /v1/commands`
    pub async fn submit_commands(&self, commands: Vec<String>) -> Result<String, ClientError> {
        let url = format!("{}/v1/commands", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&CommandRequest { commands })
            .send()
            .await
            .map_err(ClientError::Request)?;

        let message: ApiMessage = decode(response).await?;
        Ok(message.message)
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    let body = response.text().await.map_err(ClientError::Request)?;

    if !status.is_success() {
        let message = serde_json::from_str::<ApiMessage>(&body)
            .map(|m| m.message)
            .unwrap_or_else(|_| status_text(status));
        return Err(ClientError::Status {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))
}

fn status_text(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}
