use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Result, anyhow};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use crm_gateway_client::{
    GatewayConfig, HEADER_PROJECT_ID, HEADER_PUBLIC_KEY, HEADER_REQUEST_ID, HttpRecordGateway,
};
use crm_sync::gateway::{DeleteRequest, QueryRequest, RecordRequest};
use crm_sync::{
    CollectionStore, Contact, ContactDraft, DeleteOutcome, Draft, EntityKind, FormController,
    GatewayClient, GatewayError, MemoryRecordGateway, MutationCoordinator, MutationError,
    RawRecord, RecordGateway, RecordId, memory,
};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

#[derive(Debug, Clone)]
struct SeenRequest {
    route: String,
    project_id: Option<String>,
    public_key: Option<String>,
    request_id: Option<String>,
}

#[derive(Clone)]
struct ServiceState {
    records: Arc<MemoryRecordGateway>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
    fail_updates: Arc<AtomicBool>,
}

impl ServiceState {
    fn note(&self, route: String, headers: &HeaderMap) {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SeenRequest {
                route,
                project_id: header(HEADER_PROJECT_ID),
                public_key: header(HEADER_PUBLIC_KEY),
                request_id: header(HEADER_REQUEST_ID),
            });
    }

    fn seen(&self) -> Vec<SeenRequest> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

struct StubService {
    base_url: String,
    state: ServiceState,
    shutdown: oneshot::Sender<()>,
}

async fn spawn_service() -> Result<StubService> {
    let state = ServiceState {
        records: memory(),
        seen: Arc::new(Mutex::new(Vec::new())),
        fail_updates: Arc::new(AtomicBool::new(false)),
    };
    let app = Router::new()
        .route(
            "/collections/:collection/records",
            post(create_record).put(update_record),
        )
        .route(
            "/collections/:collection/records/:segment",
            get(get_record).post(collection_action),
        )
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        let _ = server.await;
    });

    Ok(StubService {
        base_url: format!("http://{addr}"),
        state,
        shutdown: shutdown_tx,
    })
}

fn gateway_failure(error: GatewayError) -> Response {
    (StatusCode::BAD_GATEWAY, error.to_string()).into_response()
}

fn unknown_collection() -> Response {
    (StatusCode::NOT_FOUND, "unknown collection").into_response()
}

async fn collection_action(
    State(state): State<ServiceState>,
    Path((collection, segment)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.note(format!("POST {collection}/{segment}"), &headers);
    let Some(kind) = EntityKind::parse(&collection) else {
        return unknown_collection();
    };
    match segment.as_str() {
        "query" => match serde_json::from_value::<QueryRequest>(body) {
            Ok(request) => match state.records.query(kind, &request).await {
                Ok(response) => Json(response).into_response(),
                Err(error) => gateway_failure(error),
            },
            Err(error) => (StatusCode::UNPROCESSABLE_ENTITY, error.to_string()).into_response(),
        },
        "delete" => match serde_json::from_value::<DeleteRequest>(body) {
            Ok(request) => match state.records.delete(kind, &request).await {
                Ok(response) => Json(response).into_response(),
                Err(error) => gateway_failure(error),
            },
            Err(error) => (StatusCode::UNPROCESSABLE_ENTITY, error.to_string()).into_response(),
        },
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

async fn get_record(
    State(state): State<ServiceState>,
    Path((collection, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    state.note(format!("GET {collection}/{id}"), &headers);
    let Some(kind) = EntityKind::parse(&collection) else {
        return unknown_collection();
    };
    match state.records.get_by_id(kind, &RecordId::new(id)).await {
        Ok(Some(response)) => Json(response).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(error) => gateway_failure(error),
    }
}

async fn create_record(
    State(state): State<ServiceState>,
    Path(collection): Path<String>,
    headers: HeaderMap,
    Json(request): Json<RecordRequest>,
) -> Response {
    state.note(format!("POST {collection}"), &headers);
    let Some(kind) = EntityKind::parse(&collection) else {
        return unknown_collection();
    };
    match state.records.create(kind, &request).await {
        Ok(response) => Json(response).into_response(),
        Err(error) => gateway_failure(error),
    }
}

async fn update_record(
    State(state): State<ServiceState>,
    Path(collection): Path<String>,
    headers: HeaderMap,
    Json(request): Json<RecordRequest>,
) -> Response {
    state.note(format!("PUT {collection}"), &headers);
    if state.fail_updates.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    }
    let Some(kind) = EntityKind::parse(&collection) else {
        return unknown_collection();
    };
    match state.records.update(kind, &request).await {
        Ok(response) => Json(response).into_response(),
        Err(error) => gateway_failure(error),
    }
}

fn client_for(service: &StubService) -> Result<GatewayClient> {
    let http = HttpRecordGateway::new(GatewayConfig::new(
        service.base_url.as_str(),
        "proj_test",
        "pk_test",
    ))?;
    Ok(GatewayClient::new(Arc::new(http)))
}

fn contact(first_name: &str, date: &str) -> RawRecord {
    RawRecord::new()
        .with("Name", format!("{first_name} Lee"))
        .with("firstName", first_name)
        .with("lastName", "Lee")
        .with("email", format!("{}@x.com", first_name.to_lowercase()))
        .with("lastContactDate", date)
        .with("Tags", "vip,")
}

#[tokio::test]
async fn load_and_create_travel_over_http_with_project_headers() -> Result<()> {
    let service = spawn_service().await?;
    service
        .state
        .records
        .seed(EntityKind::Contact, contact("Ann", "2024-01-02"))
        .await;
    service
        .state
        .records
        .seed(EntityKind::Contact, contact("Bo", "2024-03-04"))
        .await;

    let store = CollectionStore::<Contact>::shared();
    let contacts = MutationCoordinator::new(client_for(&service)?, &store);

    let loaded = contacts.load().await?;
    let names: Vec<String> = loaded.value.iter().map(Contact::full_name).collect();
    assert_eq!(names, vec!["Bo Lee", "Ann Lee"]);
    assert_eq!(loaded.value[0].tags, vec!["vip"]);

    let mut form = FormController::<ContactDraft>::new();
    form.set_field("firstName", "Cy")?;
    form.set_field("lastName", "Park")?;
    form.set_field("email", "cy@x.com")?;
    form.set_field("tags", " lead , ,warm")?;
    let created = form.submit(&contacts).await?;
    let created = created
        .value
        .ok_or_else(|| anyhow!("create returned no contact"))?;
    assert_eq!(created.id, RecordId::new("3"));
    assert_eq!(created.tags, vec!["lead", "warm"]);
    assert_eq!(store.read().await.len(), 3);

    let seen = service.state.seen();
    let routes: Vec<&str> = seen.iter().map(|request| request.route.as_str()).collect();
    assert_eq!(routes, vec!["POST contact/query", "POST contact"]);
    for request in &seen {
        assert_eq!(request.project_id.as_deref(), Some("proj_test"));
        assert_eq!(request.public_key.as_deref(), Some("pk_test"));
        assert!(
            request
                .request_id
                .as_deref()
                .is_some_and(|id| id.starts_with("req_"))
        );
    }
    let _ = service.shutdown.send(());
    Ok(())
}

#[tokio::test]
async fn missing_record_is_absent_not_an_error() -> Result<()> {
    let service = spawn_service().await?;
    let store = CollectionStore::<Contact>::shared();
    let contacts = MutationCoordinator::new(client_for(&service)?, &store);

    let refreshed = contacts.refresh(&RecordId::new("99")).await?;
    assert!(refreshed.value.is_none());
    assert_eq!(service.state.seen()[0].route, "GET contact/99");
    let _ = service.shutdown.send(());
    Ok(())
}

#[tokio::test]
async fn http_failure_keeps_the_store_and_names_the_status() -> Result<()> {
    let service = spawn_service().await?;
    let id = service
        .state
        .records
        .seed(EntityKind::Contact, contact("Ann", "2024-01-02"))
        .await;
    let store = CollectionStore::<Contact>::shared();
    let contacts = MutationCoordinator::new(client_for(&service)?, &store);
    contacts.load().await?;

    service.state.fail_updates.store(true, Ordering::SeqCst);
    let existing = store
        .read()
        .await
        .get(&id)
        .cloned()
        .ok_or_else(|| anyhow!("seeded contact not loaded"))?;
    let mut draft = ContactDraft::from_entity(&existing);
    draft.set_field("company", "Acme")?;

    let error = contacts
        .update(&id, &draft)
        .await
        .err()
        .ok_or_else(|| anyhow!("update should fail"))?;
    assert_eq!(
        error,
        MutationError::Gateway {
            action: crm_sync::MutationAction::Update,
            kind: EntityKind::Contact,
            source: GatewayError::Http {
                status: 500,
                body: "boom".to_string(),
            },
        }
    );
    assert_eq!(error.to_string(), "Failed to update contact: gateway http 500: boom");
    assert_eq!(store.read().await.get(&id), Some(&existing));
    let _ = service.shutdown.send(());
    Ok(())
}

#[tokio::test]
async fn confirmed_delete_posts_the_record_ids() -> Result<()> {
    let service = spawn_service().await?;
    let id = service
        .state
        .records
        .seed(EntityKind::Contact, contact("Ann", "2024-01-02"))
        .await;
    let store = CollectionStore::<Contact>::shared();
    let contacts = MutationCoordinator::new(client_for(&service)?, &store);
    contacts.load().await?;

    let outcome = contacts.delete(&id, &|_: &str| true).await?;
    assert!(matches!(outcome, DeleteOutcome::Deleted { .. }));
    assert!(store.read().await.is_empty());
    assert!(contacts.load().await?.value.is_empty());

    let routes: Vec<String> = service
        .state
        .seen()
        .into_iter()
        .map(|request| request.route)
        .collect();
    assert_eq!(
        routes,
        vec!["POST contact/query", "POST contact/delete", "POST contact/query"]
    );
    let _ = service.shutdown.send(());
    Ok(())
}
