//! HTTP transport for the CRM record gateway.

use std::time::Duration;

use async_trait::async_trait;
use crm_sync::gateway::{
    DeleteRequest, DeleteResponse, FetchResponse, QueryRequest, QueryResponse, RecordRequest,
    RecordResponse,
};
use crm_sync::{EntityKind, GatewayError, RecordGateway, RecordId};
use reqwest::{RequestBuilder, StatusCode};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

mod config;

pub use config::{
    ConfigError, ConfigOverrides, DEFAULT_TIMEOUT_MS, ENV_BASE_URL, ENV_PROJECT_ID,
    ENV_PUBLIC_KEY, ENV_TIMEOUT_MS, GatewayConfig, MIN_TIMEOUT_MS, normalize_base_url,
};

pub const HEADER_PROJECT_ID: &str = "x-project-id";
pub const HEADER_PUBLIC_KEY: &str = "x-public-key";
pub const HEADER_REQUEST_ID: &str = "x-request-id";

/// [`RecordGateway`] over the remote record service. One attempt per call;
/// failures surface to the coordinator unchanged.
#[derive(Debug, Clone)]
pub struct HttpRecordGateway {
    base_url: String,
    project_id: String,
    public_key: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl HttpRecordGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, ConfigError> {
        let base_url = normalize_base_url(&config.base_url)?;
        Ok(Self {
            base_url,
            project_id: config.project_id,
            public_key: config.public_key,
            timeout: Duration::from_millis(config.timeout_ms.max(MIN_TIMEOUT_MS)),
            http: reqwest::Client::new(),
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(GatewayConfig::from_env()?)
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> Option<String> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.starts_with('/') {
            Some(format!("{}{}", self.base_url, trimmed))
        } else {
            Some(format!("{}/{}", self.base_url, trimmed))
        }
    }

    #[must_use]
    pub fn records_path(kind: EntityKind) -> String {
        format!("/collections/{}/records", kind.collection())
    }

    #[must_use]
    pub fn query_path(kind: EntityKind) -> String {
        format!("{}/query", Self::records_path(kind))
    }

    #[must_use]
    pub fn delete_path(kind: EntityKind) -> String {
        format!("{}/delete", Self::records_path(kind))
    }

    /// `None` when the id would escape its path segment.
    #[must_use]
    pub fn record_path(kind: EntityKind, id: &RecordId) -> Option<String> {
        let id = id.as_str();
        if id.is_empty()
            || id.chars().all(|c| c == '.')
            || id.contains(['/', '?', '#', '%'])
            || id.chars().any(char::is_whitespace)
        {
            return None;
        }
        Some(format!("{}/{id}", Self::records_path(kind)))
    }

    fn url(&self, path: &str) -> Result<String, GatewayError> {
        self.endpoint(path).ok_or_else(|| GatewayError::InvalidRequest {
            message: format!("invalid gateway path: {path}"),
        })
    }

    fn prepare(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(HEADER_PROJECT_ID, self.project_id.as_str())
            .header(HEADER_PUBLIC_KEY, self.public_key.as_str())
            .header(HEADER_REQUEST_ID, format!("req_{}", Uuid::new_v4().simple()))
            .timeout(self.timeout)
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, GatewayError> {
        self.prepare(request)
            .send()
            .await
            .map_err(|error| GatewayError::Transport {
                message: error.to_string(),
            })
    }

    async fn post_json<Req, Res>(&self, path: &str, payload: &Req) -> Result<Res, GatewayError>
    where
        Req: Serialize + ?Sized,
        Res: for<'de> serde::Deserialize<'de>,
    {
        let url = self.url(path)?;
        debug!(%url, "gateway post");
        let response = self.send(self.http.post(url.as_str()).json(payload)).await?;
        decode_json_response(response).await
    }

    async fn put_json<Req, Res>(&self, path: &str, payload: &Req) -> Result<Res, GatewayError>
    where
        Req: Serialize + ?Sized,
        Res: for<'de> serde::Deserialize<'de>,
    {
        let url = self.url(path)?;
        debug!(%url, "gateway put");
        let response = self.send(self.http.put(url.as_str()).json(payload)).await?;
        decode_json_response(response).await
    }

    async fn get_optional_json<T>(&self, path: &str) -> Result<Option<T>, GatewayError>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let url = self.url(path)?;
        debug!(%url, "gateway get");
        let response = self.send(self.http.get(url.as_str())).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode_json_response(response).await.map(Some)
    }
}

#[async_trait]
impl RecordGateway for HttpRecordGateway {
    async fn query(
        &self,
        kind: EntityKind,
        request: &QueryRequest,
    ) -> Result<QueryResponse, GatewayError> {
        self.post_json(&Self::query_path(kind), request).await
    }

    async fn get_by_id(
        &self,
        kind: EntityKind,
        id: &RecordId,
    ) -> Result<Option<FetchResponse>, GatewayError> {
        let path = Self::record_path(kind, id).ok_or_else(|| GatewayError::InvalidRequest {
            message: format!("record id cannot be used in a path: {id}"),
        })?;
        self.get_optional_json(&path).await
    }

    async fn create(
        &self,
        kind: EntityKind,
        request: &RecordRequest,
    ) -> Result<RecordResponse, GatewayError> {
        self.post_json(&Self::records_path(kind), request).await
    }

    async fn update(
        &self,
        kind: EntityKind,
        request: &RecordRequest,
    ) -> Result<RecordResponse, GatewayError> {
        self.put_json(&Self::records_path(kind), request).await
    }

    async fn delete(
        &self,
        kind: EntityKind,
        request: &DeleteRequest,
    ) -> Result<DeleteResponse, GatewayError> {
        self.post_json(&Self::delete_path(kind), request).await
    }
}

#[must_use]
pub fn format_http_error(status: StatusCode, body: &[u8]) -> GatewayError {
    let body = non_empty_string(String::from_utf8_lossy(body).to_string())
        .unwrap_or_else(|| "<empty>".to_string());
    GatewayError::Http {
        status: status.as_u16(),
        body,
    }
}

async fn decode_json_response<T>(response: reqwest::Response) -> Result<T, GatewayError>
where
    T: for<'de> serde::Deserialize<'de>,
{
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|error| GatewayError::Transport {
            message: error.to_string(),
        })?;

    if !status.is_success() {
        return Err(format_http_error(status, &bytes));
    }

    serde_json::from_slice::<T>(&bytes).map_err(|error| GatewayError::Decode {
        message: error.to_string(),
    })
}

fn non_empty_string(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
