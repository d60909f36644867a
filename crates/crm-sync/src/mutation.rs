//! Create/update/delete orchestration for one collection.
//!
//! A `MutationCoordinator` pairs an injected [`GatewayClient`] with a weak
//! handle to the view's [`CollectionStore`]. Every operation runs
//! `Idle -> Submitting -> {Succeeded, Failed}`; the store is only touched
//! after the gateway confirms, and a failure leaves it exactly as it was.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, Weak};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::entity::{Entity, EntityKind, Task, TaskStatus};
use crate::form::{Draft, FieldErrors};
use crate::gateway::{GatewayClient, GatewayError, QueryRequest};
use crate::normalize::{NormalizeContext, normalize_page};
use crate::payload::TaskPatch;
use crate::record::RecordId;
use crate::settings::SyncSettings;
use crate::store::{CollectionStore, StoreHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationAction {
    Load,
    Refresh,
    Create,
    Update,
    UpdateStatus,
    Delete,
}

impl MutationAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Refresh => "refresh",
            Self::Create => "create",
            Self::Update => "update",
            Self::UpdateStatus => "update_status",
            Self::Delete => "delete",
        }
    }

    /// Phrase used in the user-facing failure notice, e.g. `save contact`.
    #[must_use]
    pub fn describe(self, kind: EntityKind) -> String {
        let collection = kind.collection();
        match self {
            Self::Load => format!("load {}", kind.plural()),
            Self::Refresh => format!("refresh {collection}"),
            Self::Create => format!("save {collection}"),
            Self::Update => format!("update {collection}"),
            Self::UpdateStatus => format!("update {collection} status"),
            Self::Delete => format!("delete {collection}"),
        }
    }
}

impl fmt::Display for MutationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MutationState {
    #[default]
    Idle,
    Submitting,
    Succeeded,
    Failed,
}

/// What a confirmed gateway result did to the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEffect {
    Applied,
    /// The id was no longer in the store; nothing changed.
    NotFound,
    /// The store was dropped before the result arrived.
    Detached,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mutated<R> {
    pub value: R,
    pub effect: StoreEffect,
    pub notice: Option<String>,
}

impl<R> Mutated<R> {
    pub fn map<U>(self, f: impl FnOnce(R) -> U) -> Mutated<U> {
        Mutated {
            value: f(self.value),
            effect: self.effect,
            notice: self.notice,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The user said no; the gateway was never called.
    Declined,
    Deleted { effect: StoreEffect, notice: String },
}

/// Yes/no gate in front of destructive actions.
pub trait ConfirmationGate {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> ConfirmationGate for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MutationError {
    #[error("Please fix the form errors: {0}")]
    Validation(FieldErrors),
    #[error("Failed to {}: {source}", failure_phrase(.action, .kind))]
    Gateway {
        action: MutationAction,
        kind: EntityKind,
        source: GatewayError,
    },
    #[error("a {kind} request is already in flight")]
    Busy { kind: EntityKind },
    #[error("{kind} id is required")]
    MissingId { kind: EntityKind },
}

fn failure_phrase(action: &MutationAction, kind: &EntityKind) -> String {
    action.describe(*kind)
}

#[must_use]
pub fn delete_prompt(kind: EntityKind) -> String {
    format!("Are you sure you want to delete this {}?", kind.collection())
}

fn created_notice(kind: EntityKind) -> String {
    match kind {
        EntityKind::Task => format!("{} created successfully!", kind.title()),
        _ => format!("{} added successfully!", kind.title()),
    }
}

fn updated_notice(kind: EntityKind) -> String {
    format!("{} updated successfully!", kind.title())
}

fn deleted_notice(kind: EntityKind) -> String {
    format!("{} deleted successfully", kind.title())
}

/// Resets the single-flight flag however the operation ends, including when
/// the caller drops the future mid-request.
struct InFlight<'a> {
    flag: &'a AtomicBool,
    state: &'a Mutex<MutationState>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == MutationState::Submitting {
            *state = MutationState::Idle;
        }
        self.flag.store(false, Ordering::Release);
    }
}

pub struct MutationCoordinator<T: Entity> {
    gateway: GatewayClient,
    store: Weak<RwLock<CollectionStore<T>>>,
    settings: SyncSettings,
    state: Mutex<MutationState>,
    in_flight: AtomicBool,
}

impl<T: Entity> fmt::Debug for MutationCoordinator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationCoordinator")
            .field("collection", &T::KIND.collection())
            .field("state", &self.state())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<T: Entity> MutationCoordinator<T> {
    #[must_use]
    pub fn new(gateway: GatewayClient, store: &StoreHandle<T>) -> Self {
        Self {
            gateway,
            store: std::sync::Arc::downgrade(store),
            settings: SyncSettings::default(),
            state: Mutex::new(MutationState::Idle),
            in_flight: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn state(&self) -> MutationState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn is_submitting(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// The store, if the view that owns it is still alive.
    #[must_use]
    pub fn store(&self) -> Option<StoreHandle<T>> {
        self.store.upgrade()
    }

    fn begin(&self, action: MutationAction) -> Result<InFlight<'_>, MutationError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(collection = T::KIND.collection(), %action, "rejected while another request is in flight");
            return Err(MutationError::Busy { kind: T::KIND });
        }
        self.set_state(MutationState::Submitting);
        Ok(InFlight {
            flag: &self.in_flight,
            state: &self.state,
        })
    }

    fn finish<R>(&self, result: Result<R, MutationError>) -> Result<R, MutationError> {
        self.set_state(if result.is_ok() {
            MutationState::Succeeded
        } else {
            MutationState::Failed
        });
        result
    }

    /// Validation failures never reach the gateway or wait on the in-flight
    /// guard. A request already in flight keeps its own state.
    fn invalid(&self, errors: FieldErrors) -> MutationError {
        if !self.is_submitting() {
            self.set_state(MutationState::Failed);
        }
        MutationError::Validation(errors)
    }

    fn set_state(&self, next: MutationState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    fn gateway_error(action: MutationAction) -> impl FnOnce(GatewayError) -> MutationError {
        move |source| {
            warn!(collection = T::KIND.collection(), %action, error = %source, "gateway call failed");
            MutationError::Gateway {
                action,
                kind: T::KIND,
                source,
            }
        }
    }

    fn require_id(id: &RecordId) -> Result<(), MutationError> {
        if id.as_str().trim().is_empty() {
            return Err(MutationError::MissingId { kind: T::KIND });
        }
        Ok(())
    }

    /// Runs `apply` against the store if it still exists.
    async fn apply<R>(
        &self,
        action: MutationAction,
        apply: impl FnOnce(&mut CollectionStore<T>) -> R,
    ) -> Option<R> {
        let Some(store) = self.store.upgrade() else {
            warn!(collection = T::KIND.collection(), %action, "store dropped before result arrived; not applied");
            return None;
        };
        let mut store = store.write().await;
        Some(apply(&mut store))
    }

    /// Bulk load: replaces the whole store with the first page of live records.
    pub async fn load(&self) -> Result<Mutated<Vec<T>>, MutationError> {
        let _guard = self.begin(MutationAction::Load)?;
        let result = self.load_inner().await;
        self.finish(result)
    }

    async fn load_inner(&self) -> Result<Mutated<Vec<T>>, MutationError> {
        let action = MutationAction::Load;
        let request = QueryRequest::for_kind(T::KIND, &self.settings);
        let raw = self
            .gateway
            .query(T::KIND, &request)
            .await
            .map_err(Self::gateway_error(action))?;
        let entities: Vec<T> = normalize_page(&raw, &NormalizeContext::today());
        let loaded = entities.clone();
        let effect = self
            .apply(action, move |store| {
                store.replace_all(loaded);
                StoreEffect::Applied
            })
            .await
            .unwrap_or(StoreEffect::Detached);
        info!(collection = T::KIND.collection(), count = entities.len(), "collection loaded");
        Ok(Mutated {
            value: entities,
            effect,
            notice: None,
        })
    }

    /// Re-reads one record. A record the gateway no longer returns is removed.
    pub async fn refresh(&self, id: &RecordId) -> Result<Mutated<Option<T>>, MutationError> {
        let _guard = self.begin(MutationAction::Refresh)?;
        let result = self.refresh_inner(id).await;
        self.finish(result)
    }

    async fn refresh_inner(&self, id: &RecordId) -> Result<Mutated<Option<T>>, MutationError> {
        let action = MutationAction::Refresh;
        Self::require_id(id)?;
        let raw = self
            .gateway
            .get_by_id(T::KIND, id)
            .await
            .map_err(Self::gateway_error(action))?;
        let fetched = raw.and_then(|raw| T::normalize(&raw, &NormalizeContext::today()));
        let stored = fetched.clone();
        let effect = self
            .apply(action, move |store| match stored {
                Some(entity) => {
                    store.insert(entity);
                    StoreEffect::Applied
                }
                None => match store.remove_by_id(id) {
                    Some(_) => StoreEffect::Applied,
                    None => StoreEffect::NotFound,
                },
            })
            .await
            .unwrap_or(StoreEffect::Detached);
        debug!(collection = T::KIND.collection(), id = %id, present = fetched.is_some(), ?effect, "record refreshed");
        Ok(Mutated {
            value: fetched,
            effect,
            notice: None,
        })
    }

    /// Validates, creates on the gateway, then appends the confirmed record.
    pub async fn create<D>(&self, draft: &D) -> Result<Mutated<T>, MutationError>
    where
        D: Draft<Entity = T>,
    {
        let errors = draft.validate();
        if !errors.is_empty() {
            debug!(collection = T::KIND.collection(), %errors, "create blocked by validation");
            return Err(self.invalid(errors));
        }
        let _guard = self.begin(MutationAction::Create)?;
        let result = self.create_inner(draft).await;
        self.finish(result)
    }

    async fn create_inner<D>(&self, draft: &D) -> Result<Mutated<T>, MutationError>
    where
        D: Draft<Entity = T>,
    {
        let action = MutationAction::Create;
        let ctx = NormalizeContext::today();
        let raw = self
            .gateway
            .create(T::KIND, draft.create_record(&ctx))
            .await
            .map_err(Self::gateway_error(action))?;
        let entity = T::normalize(&raw, &ctx)
            .ok_or_else(|| Self::gateway_error(action)(GatewayError::MissingId))?;
        let inserted = entity.clone();
        let effect = self
            .apply(action, move |store| {
                store.insert(inserted);
                StoreEffect::Applied
            })
            .await
            .unwrap_or(StoreEffect::Detached);
        info!(collection = T::KIND.collection(), id = %entity.id(), ?effect, "record created");
        Ok(Mutated {
            value: entity,
            effect,
            notice: Some(created_notice(T::KIND)),
        })
    }

    /// Validates and sends the full draft; a stale id is a silent no-op locally.
    pub async fn update<D>(
        &self,
        id: &RecordId,
        draft: &D,
    ) -> Result<Mutated<Option<T>>, MutationError>
    where
        D: Draft<Entity = T>,
    {
        let errors = draft.validate();
        if !errors.is_empty() {
            debug!(collection = T::KIND.collection(), id = %id, %errors, "update blocked by validation");
            return Err(self.invalid(errors));
        }
        let _guard = self.begin(MutationAction::Update)?;
        let result = self.update_inner(id, draft).await;
        self.finish(result)
    }

    async fn update_inner<D>(
        &self,
        id: &RecordId,
        draft: &D,
    ) -> Result<Mutated<Option<T>>, MutationError>
    where
        D: Draft<Entity = T>,
    {
        Self::require_id(id)?;
        let ctx = NormalizeContext::today();
        let record = draft.update_record(id, &ctx);
        self.send_update(MutationAction::Update, id, record, updated_notice(T::KIND), |echo, existing| {
            echo.unwrap_or_else(|| draft.merge_into(existing, &ctx))
        })
        .await
    }

    /// Shared tail of every update: gateway call, then `replace_by_id`.
    ///
    /// `reconcile` receives the normalized gateway echo (when it carries an
    /// `Id`) and the stored entity, and returns the entity to keep.
    async fn send_update(
        &self,
        action: MutationAction,
        id: &RecordId,
        record: crate::record::RawRecord,
        notice: String,
        reconcile: impl FnOnce(Option<T>, &T) -> T,
    ) -> Result<Mutated<Option<T>>, MutationError> {
        let echo = self
            .gateway
            .update(T::KIND, record)
            .await
            .map_err(Self::gateway_error(action))?;
        let echoed = echo
            .filter(|raw| raw.id().as_ref() == Some(id))
            .and_then(|raw| T::normalize(&raw, &NormalizeContext::today()));

        let mut kept = None;
        let effect = self
            .apply(action, |store| {
                let replaced = store.replace_by_id(id, |existing| {
                    let next = reconcile(echoed.clone(), existing);
                    kept = Some(next.clone());
                    next
                });
                if replaced {
                    StoreEffect::Applied
                } else {
                    StoreEffect::NotFound
                }
            })
            .await
            .unwrap_or(StoreEffect::Detached);
        info!(collection = T::KIND.collection(), id = %id, %action, ?effect, "record updated");
        Ok(Mutated {
            value: kept.or(echoed),
            effect,
            notice: Some(notice),
        })
    }

    /// Asks `gate` first; a declined prompt never reaches the gateway.
    pub async fn delete(
        &self,
        id: &RecordId,
        gate: &impl ConfirmationGate,
    ) -> Result<DeleteOutcome, MutationError> {
        let _guard = self.begin(MutationAction::Delete)?;
        if !gate.confirm(&delete_prompt(T::KIND)) {
            debug!(collection = T::KIND.collection(), id = %id, "delete declined");
            return Ok(DeleteOutcome::Declined);
        }
        let result = self.delete_inner(id).await;
        self.finish(result)
    }

    async fn delete_inner(&self, id: &RecordId) -> Result<DeleteOutcome, MutationError> {
        let action = MutationAction::Delete;
        Self::require_id(id)?;
        self.gateway
            .delete(T::KIND, std::slice::from_ref(id))
            .await
            .map_err(Self::gateway_error(action))?;
        let effect = self
            .apply(action, |store| match store.remove_by_id(id) {
                Some(_) => StoreEffect::Applied,
                None => StoreEffect::NotFound,
            })
            .await
            .unwrap_or(StoreEffect::Detached);
        info!(collection = T::KIND.collection(), id = %id, ?effect, "record deleted");
        Ok(DeleteOutcome::Deleted {
            effect,
            notice: deleted_notice(T::KIND),
        })
    }
}

impl MutationCoordinator<Task> {
    /// Sends only the fields present in `patch`.
    pub async fn update_task(
        &self,
        id: &RecordId,
        patch: &TaskPatch,
    ) -> Result<Mutated<Option<Task>>, MutationError> {
        let _guard = self.begin(MutationAction::Update)?;
        let result = self
            .patch_task(MutationAction::Update, id, patch, updated_notice(EntityKind::Task))
            .await;
        self.finish(result)
    }

    pub async fn set_task_status(
        &self,
        id: &RecordId,
        status: TaskStatus,
    ) -> Result<Mutated<Option<Task>>, MutationError> {
        let _guard = self.begin(MutationAction::UpdateStatus)?;
        let result = self
            .patch_task(
                MutationAction::UpdateStatus,
                id,
                &TaskPatch::status(status),
                format!("Task marked as {}", status.as_str()),
            )
            .await;
        self.finish(result)
    }

    /// Completed tasks reopen as In Progress; anything else is completed.
    pub async fn toggle_completion(
        &self,
        task: &Task,
    ) -> Result<Mutated<Option<Task>>, MutationError> {
        let next = if task.status.is_completed() {
            TaskStatus::InProgress
        } else {
            TaskStatus::Completed
        };
        self.set_task_status(&task.id, next).await
    }

    async fn patch_task(
        &self,
        action: MutationAction,
        id: &RecordId,
        patch: &TaskPatch,
        notice: String,
    ) -> Result<Mutated<Option<Task>>, MutationError> {
        Self::require_id(id)?;
        if patch.is_empty() {
            return Err(MutationError::Gateway {
                action,
                kind: EntityKind::Task,
                source: GatewayError::InvalidRequest {
                    message: "task update has no fields".to_string(),
                },
            });
        }
        // Partial echoes would blank the fields that were not sent.
        self.send_update(action, id, patch.to_record(id), notice, |_echo, existing| {
            patch.apply_to(existing)
        })
        .await
    }
}
