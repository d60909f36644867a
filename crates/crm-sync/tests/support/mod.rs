#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use crm_sync::gateway::{
    DeleteRequest, DeleteResponse, FetchResponse, QueryRequest, QueryResponse, RecordRequest,
    RecordResponse,
};
use crm_sync::{
    EntityKind, GatewayClient, GatewayError, MemoryRecordGateway, RawRecord, RecordGateway,
    RecordId, memory,
};
use tokio::sync::Notify;

/// Scripted outcome for the next gateway call.
#[derive(Debug, Clone)]
pub enum Script {
    Fail(GatewayError),
    Reject(String),
}

/// In-memory gateway that counts calls, can fail on demand, and can hold
/// creates open until released.
pub struct ScriptedGateway {
    pub records: Arc<MemoryRecordGateway>,
    calls: Mutex<HashMap<&'static str, usize>>,
    scripts: Mutex<VecDeque<Script>>,
    hold_creates: Mutex<bool>,
    pub create_started: Notify,
    pub create_release: Notify,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            records: memory(),
            calls: Mutex::new(HashMap::new()),
            scripts: Mutex::new(VecDeque::new()),
            hold_creates: Mutex::new(false),
            create_started: Notify::new(),
            create_release: Notify::new(),
        })
    }

    pub fn client(self: &Arc<Self>) -> GatewayClient {
        GatewayClient::new(self.clone())
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    pub fn push(&self, script: Script) {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(script);
    }

    pub fn hold_creates(&self, hold: bool) {
        *self.hold_creates.lock().unwrap_or_else(PoisonError::into_inner) = hold;
    }

    pub async fn seed(&self, kind: EntityKind, record: RawRecord) -> RecordId {
        self.records.seed(kind, record).await
    }

    fn record_call(&self, operation: &'static str) -> Option<Script> {
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(operation)
            .or_default() += 1;
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn is_holding(&self) -> bool {
        *self.hold_creates.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn rejected_record(message: String) -> RecordResponse {
    RecordResponse {
        success: false,
        data: None,
        message: Some(message),
    }
}

#[async_trait]
impl RecordGateway for ScriptedGateway {
    async fn query(
        &self,
        kind: EntityKind,
        request: &QueryRequest,
    ) -> Result<QueryResponse, GatewayError> {
        match self.record_call("query") {
            Some(Script::Fail(error)) => Err(error),
            Some(Script::Reject(message)) => Err(GatewayError::Rejected { message }),
            None => self.records.query(kind, request).await,
        }
    }

    async fn get_by_id(
        &self,
        kind: EntityKind,
        id: &RecordId,
    ) -> Result<Option<FetchResponse>, GatewayError> {
        match self.record_call("get_by_id") {
            Some(Script::Fail(error)) => Err(error),
            Some(Script::Reject(message)) => Err(GatewayError::Rejected { message }),
            None => self.records.get_by_id(kind, id).await,
        }
    }

    async fn create(
        &self,
        kind: EntityKind,
        request: &RecordRequest,
    ) -> Result<RecordResponse, GatewayError> {
        let script = self.record_call("create");
        if self.is_holding() {
            self.create_started.notify_one();
            self.create_release.notified().await;
        }
        match script {
            Some(Script::Fail(error)) => Err(error),
            Some(Script::Reject(message)) => Ok(rejected_record(message)),
            None => self.records.create(kind, request).await,
        }
    }

    async fn update(
        &self,
        kind: EntityKind,
        request: &RecordRequest,
    ) -> Result<RecordResponse, GatewayError> {
        match self.record_call("update") {
            Some(Script::Fail(error)) => Err(error),
            Some(Script::Reject(message)) => Ok(rejected_record(message)),
            None => self.records.update(kind, request).await,
        }
    }

    async fn delete(
        &self,
        kind: EntityKind,
        request: &DeleteRequest,
    ) -> Result<DeleteResponse, GatewayError> {
        match self.record_call("delete") {
            Some(Script::Fail(error)) => Err(error),
            Some(Script::Reject(message)) => Ok(DeleteResponse {
                success: false,
                message: Some(message),
            }),
            None => self.records.delete(kind, request).await,
        }
    }
}

pub fn offline() -> GatewayError {
    GatewayError::Transport {
        message: "offline".to_string(),
    }
}

pub fn contact_record(first_name: &str, last_name: &str, company: &str, date: &str) -> RawRecord {
    RawRecord::new()
        .with("Name", format!("{first_name} {last_name}"))
        .with("firstName", first_name)
        .with("lastName", last_name)
        .with("email", format!("{}@example.com", first_name.to_lowercase()))
        .with("company", company)
        .with("lastContactDate", date)
        .with("Tags", "")
}

pub fn client_record(first_name: &str, company: &str, city: &str) -> RawRecord {
    RawRecord::new()
        .with("Name", format!("{first_name} Client"))
        .with("firstName", first_name)
        .with("lastName", "Client")
        .with("email", format!("{}@example.com", first_name.to_lowercase()))
        .with("company", company)
        .with("city", city)
}

pub fn task_record(name: &str, status: &str) -> RawRecord {
    RawRecord::new()
        .with("Name", name)
        .with("Status", status)
        .with("Priority", "High")
        .with("Tags", "phone,follow-up")
}
