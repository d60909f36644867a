//! Contract with the remote record service.
//!
//! `RecordGateway` is the raw transport seam; `GatewayClient` wraps one and
//! enforces the envelope rules (`success` flags, required `data`, required
//! `Id` on updates) so coordinators only ever see validated results.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::entity::EntityKind;
use crate::record::{FIELD_IS_DELETED, RawRecord, RecordId};
use crate::settings::SyncSettings;

mod memory;

pub use memory::{MemoryRecordGateway, memory};

pub const OPERATOR_EXACT_MATCH: &str = "ExactMatch";
pub const UNKNOWN_GATEWAY_ERROR: &str = "Unknown error";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway request failed: {message}")]
    Transport { message: String },
    #[error("gateway http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("gateway response decode failed: {message}")]
    Decode { message: String },
    #[error("{message}")]
    Rejected { message: String },
    #[error("gateway acknowledged the request without record data")]
    MissingData,
    #[error("record id is required for updates")]
    MissingId,
    #[error("invalid gateway request: {message}")]
    InvalidRequest { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldName {
    #[serde(rename = "Name")]
    pub name: String,
}

/// One requested field. Collections differ in how they spell the list:
/// contacts, clients and deals nest `{"Field": {"Name": ..}}`, tasks send
/// bare names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldSelector {
    Nested {
        #[serde(rename = "Field")]
        field: FieldName,
    },
    Plain(String),
}

impl FieldSelector {
    #[must_use]
    pub fn nested(name: &str) -> Self {
        Self::Nested {
            field: FieldName {
                name: name.to_string(),
            },
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Nested { field } => &field.name,
            Self::Plain(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhereClause {
    #[serde(rename = "fieldName")]
    pub field_name: String,
    #[serde(rename = "Operator")]
    pub operator: String,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagingInfo {
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(rename = "Fields", default)]
    pub fields: Vec<FieldSelector>,
    #[serde(rename = "where", default)]
    pub filters: Vec<WhereClause>,
    #[serde(rename = "orderBy", default)]
    pub order_by: Vec<OrderBy>,
    #[serde(rename = "pagingInfo")]
    pub paging: PagingInfo,
}

impl QueryRequest {
    #[must_use]
    pub fn new(fields: &[&str], settings: &SyncSettings) -> Self {
        Self {
            fields: fields.iter().map(|name| FieldSelector::nested(name)).collect(),
            filters: Vec::new(),
            order_by: Vec::new(),
            paging: PagingInfo {
                limit: settings.page_limit,
                offset: settings.page_offset,
            },
        }
    }

    /// Bulk-load query of a collection: its field list, live records only,
    /// in the collection's display order.
    #[must_use]
    pub fn for_kind(kind: EntityKind, settings: &SyncSettings) -> Self {
        let (field, direction) = kind.default_order();
        let request = Self::new(kind.fields(), settings)
            .exact_match(FIELD_IS_DELETED, Value::Bool(false))
            .order_by(field, direction);
        match kind {
            EntityKind::Task => request.plain_fields(),
            EntityKind::Contact | EntityKind::Client | EntityKind::Deal => request,
        }
    }

    /// Rewrites the field list as bare names.
    #[must_use]
    pub fn plain_fields(mut self) -> Self {
        self.fields = self
            .fields
            .iter()
            .map(|selector| FieldSelector::Plain(selector.name().to_string()))
            .collect();
        self
    }

    #[must_use]
    pub fn exact_match(mut self, field: &str, value: Value) -> Self {
        self.filters.push(WhereClause {
            field_name: field.to_string(),
            operator: OPERATOR_EXACT_MATCH.to_string(),
            values: vec![value],
        });
        self
    }

    #[must_use]
    pub fn order_by(mut self, field: &str, direction: SortDirection) -> Self {
        self.order_by.push(OrderBy {
            field: field.to_string(),
            direction,
        });
        self
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(FieldSelector::name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordRequest {
    pub record: RawRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteRequest {
    #[serde(rename = "RecordIds")]
    pub record_ids: Vec<Value>,
}

impl DeleteRequest {
    #[must_use]
    pub fn for_ids(ids: &[RecordId]) -> Self {
        Self {
            record_ids: ids.iter().map(RecordId::to_wire).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub data: Option<Vec<RawRecord>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchResponse {
    #[serde(default)]
    pub data: Option<RawRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<RawRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[async_trait]
pub trait RecordGateway: Send + Sync {
    async fn query(
        &self,
        kind: EntityKind,
        request: &QueryRequest,
    ) -> Result<QueryResponse, GatewayError>;

    async fn get_by_id(
        &self,
        kind: EntityKind,
        id: &RecordId,
    ) -> Result<Option<FetchResponse>, GatewayError>;

    async fn create(
        &self,
        kind: EntityKind,
        request: &RecordRequest,
    ) -> Result<RecordResponse, GatewayError>;

    async fn update(
        &self,
        kind: EntityKind,
        request: &RecordRequest,
    ) -> Result<RecordResponse, GatewayError>;

    async fn delete(
        &self,
        kind: EntityKind,
        request: &DeleteRequest,
    ) -> Result<DeleteResponse, GatewayError>;
}

/// Validating front for an injected [`RecordGateway`].
#[derive(Clone)]
pub struct GatewayClient {
    inner: Arc<dyn RecordGateway>,
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient").finish_non_exhaustive()
    }
}

impl GatewayClient {
    #[must_use]
    pub fn new(inner: Arc<dyn RecordGateway>) -> Self {
        Self { inner }
    }

    /// An empty or absent `data` page reads as no records.
    pub async fn query(
        &self,
        kind: EntityKind,
        request: &QueryRequest,
    ) -> Result<Vec<RawRecord>, GatewayError> {
        let response = self.inner.query(kind, request).await.inspect_err(|error| {
            warn!(collection = kind.collection(), %error, "gateway query failed");
        })?;
        let records = response.data.unwrap_or_default();
        debug!(
            collection = kind.collection(),
            count = records.len(),
            "gateway query returned"
        );
        Ok(records)
    }

    pub async fn get_by_id(
        &self,
        kind: EntityKind,
        id: &RecordId,
    ) -> Result<Option<RawRecord>, GatewayError> {
        let response = self.inner.get_by_id(kind, id).await.inspect_err(|error| {
            warn!(collection = kind.collection(), id = %id, %error, "gateway get failed");
        })?;
        Ok(response.and_then(|response| response.data))
    }

    /// A create only counts when the gateway says `success` and returns the record.
    pub async fn create(
        &self,
        kind: EntityKind,
        record: RawRecord,
    ) -> Result<RawRecord, GatewayError> {
        let request = RecordRequest { record };
        let response = self.inner.create(kind, &request).await.inspect_err(|error| {
            warn!(collection = kind.collection(), %error, "gateway create failed");
        })?;
        if !response.success {
            return Err(rejected(kind, "create", response.message));
        }
        response.data.ok_or(GatewayError::MissingData)
    }

    /// Returns the gateway's echo of the updated record when it sends one.
    pub async fn update(
        &self,
        kind: EntityKind,
        record: RawRecord,
    ) -> Result<Option<RawRecord>, GatewayError> {
        if record.id().is_none() {
            return Err(GatewayError::MissingId);
        }
        let request = RecordRequest { record };
        let response = self.inner.update(kind, &request).await.inspect_err(|error| {
            warn!(collection = kind.collection(), %error, "gateway update failed");
        })?;
        if !response.success {
            return Err(rejected(kind, "update", response.message));
        }
        Ok(response.data)
    }

    pub async fn delete(&self, kind: EntityKind, ids: &[RecordId]) -> Result<(), GatewayError> {
        if ids.is_empty() {
            return Err(GatewayError::InvalidRequest {
                message: "delete needs at least one record id".to_string(),
            });
        }
        let request = DeleteRequest::for_ids(ids);
        let response = self.inner.delete(kind, &request).await.inspect_err(|error| {
            warn!(collection = kind.collection(), %error, "gateway delete failed");
        })?;
        if !response.success {
            return Err(rejected(kind, "delete", response.message));
        }
        Ok(())
    }
}

fn rejected(kind: EntityKind, operation: &str, message: Option<String>) -> GatewayError {
    let message = message
        .map(|message| message.trim().to_string())
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| UNKNOWN_GATEWAY_ERROR.to_string());
    warn!(collection = kind.collection(), operation, %message, "gateway rejected request");
    GatewayError::Rejected { message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bulk_query_serializes_provider_field_names() {
        let request = QueryRequest::for_kind(EntityKind::Client, &SyncSettings::default());
        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(value["Fields"][0], json!({"Field": {"Name": "Id"}}));
        assert_eq!(
            value["where"],
            json!([{"fieldName": "IsDeleted", "Operator": "ExactMatch", "values": [false]}])
        );
        assert_eq!(value["orderBy"], json!([{"field": "Name", "direction": "ASC"}]));
        assert_eq!(value["pagingInfo"], json!({"limit": 50, "offset": 0}));
    }

    #[test]
    fn task_queries_list_bare_field_names() {
        let settings = SyncSettings::default();
        let tasks = serde_json::to_value(QueryRequest::for_kind(EntityKind::Task, &settings))
            .expect("serialize");
        assert_eq!(tasks["Fields"][0], json!("Id"));
        assert!(tasks["Fields"].as_array().expect("fields").iter().all(Value::is_string));

        for kind in [EntityKind::Contact, EntityKind::Deal] {
            let value = serde_json::to_value(QueryRequest::for_kind(kind, &settings))
                .expect("serialize");
            assert_eq!(value["Fields"][0], json!({"Field": {"Name": "Id"}}));
        }

        let parsed: QueryRequest = serde_json::from_value(tasks).expect("deserialize");
        assert_eq!(parsed.field_names().collect::<Vec<_>>(), EntityKind::Task.fields());
    }

    #[test]
    fn delete_request_sends_integer_ids() {
        let request = DeleteRequest::for_ids(&[RecordId::new("12"), RecordId::new("x-1")]);
        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(value, json!({"RecordIds": [12, "x-1"]}));
    }

    #[test]
    fn record_response_tolerates_missing_fields() {
        let response: RecordResponse =
            serde_json::from_value(json!({"success": false})).expect("decode");
        assert!(!response.success);
        assert!(response.data.is_none());
        assert!(response.message.is_none());

        let page: QueryResponse = serde_json::from_value(json!({"data": null})).expect("decode");
        assert!(page.data.is_none());
    }
}
