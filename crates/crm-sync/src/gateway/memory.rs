use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{
    DeleteRequest, DeleteResponse, FetchResponse, GatewayError, QueryRequest, QueryResponse,
    RecordGateway, RecordRequest, RecordResponse, SortDirection, WhereClause,
};
use crate::entity::EntityKind;
use crate::record::{FIELD_CREATED_ON, FIELD_ID, FIELD_IS_DELETED, RawRecord, RecordId};

/// Gateway that keeps every collection in process memory.
///
/// Deletes are soft (`IsDeleted = true`) so the bulk-load filter has
/// something to exclude, the same way the hosted service behaves.
pub fn memory() -> Arc<MemoryRecordGateway> {
    Arc::new(MemoryRecordGateway::default())
}

#[derive(Default)]
pub struct MemoryRecordGateway {
    inner: Mutex<MemoryGatewayInner>,
}

#[derive(Default)]
struct MemoryGatewayInner {
    collections: HashMap<EntityKind, Vec<RawRecord>>,
    last_id: i64,
}

impl MemoryGatewayInner {
    fn assign_id(&mut self) -> RecordId {
        self.last_id += 1;
        RecordId::from(self.last_id)
    }

    fn live_mut(&mut self, kind: EntityKind, id: &RecordId) -> Option<&mut RawRecord> {
        self.collections
            .get_mut(&kind)?
            .iter_mut()
            .find(|record| record.id().as_ref() == Some(id) && !is_deleted(record))
    }
}

impl MemoryRecordGateway {
    /// Stores `record` as-is, assigning an `Id` when it has none.
    pub async fn seed(&self, kind: EntityKind, record: RawRecord) -> RecordId {
        let mut inner = self.inner.lock().await;
        let mut record = record;
        let id = match record.id() {
            Some(id) => {
                if let Ok(number) = id.as_str().parse::<i64>() {
                    inner.last_id = inner.last_id.max(number);
                }
                id
            }
            None => {
                let id = inner.assign_id();
                record.insert(FIELD_ID, id.to_wire());
                id
            }
        };
        if !record.contains_key(FIELD_CREATED_ON) {
            record.insert(FIELD_CREATED_ON, created_on());
        }
        inner.collections.entry(kind).or_default().push(record);
        id
    }

    /// Raw copy of a stored record, soft-deleted ones included.
    pub async fn stored(&self, kind: EntityKind, id: &RecordId) -> Option<RawRecord> {
        let inner = self.inner.lock().await;
        inner
            .collections
            .get(&kind)?
            .iter()
            .find(|record| record.id().as_ref() == Some(id))
            .cloned()
    }
}

#[async_trait]
impl RecordGateway for MemoryRecordGateway {
    async fn query(
        &self,
        kind: EntityKind,
        request: &QueryRequest,
    ) -> Result<QueryResponse, GatewayError> {
        let inner = self.inner.lock().await;
        let Some(records) = inner.collections.get(&kind) else {
            return Ok(QueryResponse { data: None });
        };

        let mut matched: Vec<(usize, &RawRecord)> = records
            .iter()
            .enumerate()
            .filter(|(_, record)| request.filters.iter().all(|clause| admits(record, clause)))
            .collect();

        if !request.order_by.is_empty() {
            let tie_break = request.order_by[0].direction;
            matched.sort_by(|(left_index, left), (right_index, right)| {
                let mut ordering = Ordering::Equal;
                for order in &request.order_by {
                    let by_field = compare_values(left.get(&order.field), right.get(&order.field));
                    ordering = ordering.then(match order.direction {
                        SortDirection::Asc => by_field,
                        SortDirection::Desc => by_field.reverse(),
                    });
                }
                // Equal keys keep insertion order in the first key's direction.
                ordering.then(match tie_break {
                    SortDirection::Asc => left_index.cmp(right_index),
                    SortDirection::Desc => right_index.cmp(left_index),
                })
            });
        }

        let fields: Vec<&str> = request.field_names().collect();
        let page: Vec<RawRecord> = matched
            .into_iter()
            .skip(request.paging.offset as usize)
            .take(request.paging.limit as usize)
            .map(|(_, record)| record.project(&fields))
            .collect();

        Ok(QueryResponse {
            data: if page.is_empty() { None } else { Some(page) },
        })
    }

    async fn get_by_id(
        &self,
        kind: EntityKind,
        id: &RecordId,
    ) -> Result<Option<FetchResponse>, GatewayError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.live_mut(kind, id).map(|record| FetchResponse {
            data: Some(record.clone()),
        }))
    }

    async fn create(
        &self,
        kind: EntityKind,
        request: &RecordRequest,
    ) -> Result<RecordResponse, GatewayError> {
        let mut inner = self.inner.lock().await;
        let id = inner.assign_id();
        let mut record = request.record.clone();
        record.insert(FIELD_ID, id.to_wire());
        record.insert(FIELD_IS_DELETED, false);
        record.insert(FIELD_CREATED_ON, created_on());
        inner.collections.entry(kind).or_default().push(record.clone());
        Ok(RecordResponse {
            success: true,
            data: Some(record),
            message: None,
        })
    }

    async fn update(
        &self,
        kind: EntityKind,
        request: &RecordRequest,
    ) -> Result<RecordResponse, GatewayError> {
        let Some(id) = request.record.id() else {
            return Err(GatewayError::MissingId);
        };
        let mut inner = self.inner.lock().await;
        let Some(stored) = inner.live_mut(kind, &id) else {
            return Ok(not_found());
        };
        stored.merge(&request.record);
        Ok(RecordResponse {
            success: true,
            data: Some(stored.clone()),
            message: None,
        })
    }

    async fn delete(
        &self,
        kind: EntityKind,
        request: &DeleteRequest,
    ) -> Result<DeleteResponse, GatewayError> {
        let mut inner = self.inner.lock().await;
        let ids: Vec<RecordId> = request
            .record_ids
            .iter()
            .filter_map(RecordId::from_wire)
            .collect();
        if ids.len() != request.record_ids.len()
            || ids.iter().any(|id| inner.live_mut(kind, id).is_none())
        {
            return Ok(DeleteResponse {
                success: false,
                message: Some("Record not found".to_string()),
            });
        }
        for id in &ids {
            if let Some(record) = inner.live_mut(kind, id) {
                record.insert(FIELD_IS_DELETED, true);
            }
        }
        Ok(DeleteResponse {
            success: true,
            message: None,
        })
    }
}

fn not_found() -> RecordResponse {
    RecordResponse {
        success: false,
        data: None,
        message: Some("Record not found".to_string()),
    }
}

fn created_on() -> String {
    Utc::now().to_rfc3339()
}

fn is_deleted(record: &RawRecord) -> bool {
    record
        .get(FIELD_IS_DELETED)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn admits(record: &RawRecord, clause: &WhereClause) -> bool {
    let actual = match record.get(&clause.field_name) {
        Some(value) => value.clone(),
        None if clause.field_name == FIELD_IS_DELETED => Value::Bool(false),
        None => Value::Null,
    };
    clause.values.iter().any(|wanted| *wanted == actual)
}

fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    match (left, right) {
        (Some(Value::Number(left)), Some(Value::Number(right))) => left
            .as_f64()
            .partial_cmp(&right.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(left)), Some(Value::String(right))) => left.cmp(right),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        (Some(left), Some(right)) => left.to_string().cmp(&right.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SyncSettings;

    #[tokio::test]
    async fn bulk_query_excludes_deleted_and_orders_by_name() {
        let gateway = memory();
        for name in ["Carol", "Alice", "Bob"] {
            gateway
                .seed(EntityKind::Client, RawRecord::new().with("Name", name))
                .await;
        }
        let bob = RecordId::new("3");
        let deleted = gateway
            .delete(EntityKind::Client, &DeleteRequest::for_ids(&[bob.clone()]))
            .await
            .expect("delete");
        assert!(deleted.success);

        let request = QueryRequest::for_kind(EntityKind::Client, &SyncSettings::default());
        let page = gateway
            .query(EntityKind::Client, &request)
            .await
            .expect("query")
            .data
            .unwrap_or_default();
        let names: Vec<String> = page.iter().map(|record| record.text("Name")).collect();
        assert_eq!(names, ["Alice", "Carol"]);
        assert!(gateway.stored(EntityKind::Client, &bob).await.is_some());
    }

    #[tokio::test]
    async fn update_of_unknown_record_is_rejected() {
        let gateway = memory();
        let response = gateway
            .update(
                EntityKind::Task,
                &RecordRequest {
                    record: RawRecord::new().with("Id", 99).with("Status", "Completed"),
                },
            )
            .await
            .expect("update");
        assert!(!response.success);
        assert_eq!(response.message.as_deref(), Some("Record not found"));
    }

    #[tokio::test]
    async fn paging_limits_the_page() {
        let gateway = memory();
        for index in 0..5 {
            gateway
                .seed(EntityKind::Deal, RawRecord::new().with("Name", format!("deal {index}")))
                .await;
        }
        let settings = SyncSettings {
            page_limit: 2,
            page_offset: 1,
        };
        let request = QueryRequest::new(&["Id", "Name"], &settings);
        let page = gateway
            .query(EntityKind::Deal, &request)
            .await
            .expect("query")
            .data
            .unwrap_or_default();
        let names: Vec<String> = page.iter().map(|record| record.text("Name")).collect();
        assert_eq!(names, ["deal 1", "deal 2"]);
        assert!(!page[0].contains_key(FIELD_CREATED_ON));
    }
}
