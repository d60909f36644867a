//! Record sync core for the CRM collections.
//!
//! Raw gateway records are normalized into typed entities, held in a
//! per-view [`CollectionStore`], filtered by [`search::filter`], and mutated
//! only through a [`MutationCoordinator`] that waits for gateway
//! confirmation before touching the store.

pub mod entity;
pub mod form;
pub mod gateway;
pub mod mutation;
pub mod normalize;
pub mod payload;
pub mod record;
pub mod search;
pub mod settings;
pub mod store;

pub use entity::{
    Client, Contact, Deal, Entity, EntityKind, LeadSource, Task, TaskPriority, TaskStatus,
};
pub use form::{
    ClientDraft, ContactDraft, DealDraft, Draft, FieldErrors, FormController, FormError,
    TaskDraft,
};
pub use gateway::{
    GatewayClient, GatewayError, MemoryRecordGateway, RecordGateway, SortDirection, memory,
};
pub use mutation::{
    ConfirmationGate, DeleteOutcome, MutationAction, MutationCoordinator, MutationError,
    MutationState, Mutated, StoreEffect,
};
pub use normalize::NormalizeContext;
pub use payload::TaskPatch;
pub use record::{RawRecord, RecordId};
pub use search::{Searchable, TaskStatusFilter};
pub use settings::{SettingsError, SyncSettings};
pub use store::{CollectionStore, StoreHandle};
