use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{StatusCode, Uri};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::response::{ApiError, ApiMessage};
use super::ApiState;
use crate::store::{LogEntry, DEFAULT_PAGE_SIZE};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    #[serde(rename = "worker_thread_alive")]
    pub worker_thread: bool,
    #[serde(rename = "timer_thread_alive")]
    pub timer_thread: bool,
}

/// Raw paging parameters; parsed by hand so bad values get a precise message
#[derive(Debug, Default)]
pub struct LogsQuery {
    limit: Option<String>,
    offset: Option<String>,
}

impl LogsQuery {
    /// First occurrence of each parameter wins
    fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let first = |name: &str| {
            pairs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone())
        };
        Self {
            limit: first("limit"),
            offset: first("offset"),
        }
    }
}

pub async fn submit_commands(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<Json<ApiMessage>, ApiError> {
    let request: CommandRequest =
        serde_json::from_slice(&body).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

    if request.commands.is_empty() {
        return Err(ApiError::InvalidRequest("no commands submitted".to_string()));
    }

    state.executor.add_commands(request.commands).await.map_err(|e| {
        tracing::error!("Failed to queue commands: {}", e);
        ApiError::Internal
    })?;

    Ok(Json(ApiMessage::new("commands added to queue")))
}

pub async fn health_check(State(state): State<ApiState>) -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        worker_thread: state.executor.is_worker_thread_alive(),
        timer_thread: state.tracker.is_timer_thread_alive(),
    })
}

pub async fn get_logs(
    State(state): State<ApiState>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<Json<Vec<LogEntry>>, ApiError> {
    let Query(pairs) = query.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;
    let query = LogsQuery::from_pairs(pairs);

    let offset = match non_empty(query.offset) {
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| ApiError::InvalidRequest("offset field is not an integer".to_string()))?,
        None => 0,
    };
    let limit = match non_empty(query.limit) {
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| ApiError::InvalidRequest("limit field is not an integer".to_string()))?,
        None => DEFAULT_PAGE_SIZE,
    };

    if limit < 1 {
        return Err(ApiError::InvalidRequest("limit field cannot be less than 1".to_string()));
    }
    if offset < 0 {
        return Err(ApiError::InvalidRequest("offset field cannot be less than 0".to_string()));
    }

    let logs = state
        .tracker
        .get_logs(limit, offset as u64)
        .await
        .map_err(|_| ApiError::Internal)?;

    Ok(Json(logs))
}

pub async fn not_found(uri: Uri) -> (StatusCode, Json<ApiMessage>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiMessage::new(format!(
            "resource: ({}) could not be found",
            uri.path()
        ))),
    )
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
