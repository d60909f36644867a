//! Draft records behind the create/edit forms, with field-level validation.
//!
//! A draft holds exactly what the user typed (tags stay one comma-joined
//! string). Validation runs on submit; editing a field clears that field's
//! error without re-validating it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::entity::{
    Client, Contact, Deal, Entity, LeadSource, Task, TaskPriority, TaskStatus,
};
use crate::mutation::{MutationCoordinator, MutationError, Mutated};
use crate::normalize::{NormalizeContext, format_date, parse_date};
use crate::payload;
use crate::record::{RawRecord, RecordId, split_tags, join_tag_input, tags_to_input};

pub const ERROR_FIRST_NAME_REQUIRED: &str = "First name is required";
pub const ERROR_LAST_NAME_REQUIRED: &str = "Last name is required";
pub const ERROR_EMAIL_REQUIRED: &str = "Email is required";
pub const ERROR_EMAIL_INVALID: &str = "Email is invalid";
pub const ERROR_TASK_NAME_REQUIRED: &str = "Task name is required";
pub const ERROR_DEAL_NAME_REQUIRED: &str = "Deal name is required";

static EMAIL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\S+@\S+\.\S+").ok());

/// `something@something.something`, matched anywhere in the input.
#[must_use]
pub fn is_valid_email(raw: &str) -> bool {
    EMAIL_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(raw))
}

/// Per-field validation messages keyed by form field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.insert(field.into(), message.into());
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn clear(&mut self, field: &str) -> Option<String> {
        self.0.remove(field)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(field, message)| (field.as_str(), message.as_str()))
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in self.iter() {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormError {
    #[error("unknown form field `{field}`")]
    UnknownField { field: String },
    #[error("invalid value `{value}` for `{field}`")]
    InvalidValue { field: String, value: String },
}

impl FormError {
    fn unknown(field: &str) -> Self {
        Self::UnknownField {
            field: field.to_string(),
        }
    }

    fn invalid(field: &str, value: &str) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

/// Editable form state for one entity kind.
pub trait Draft: Clone + Default + fmt::Debug + Send + Sync + 'static {
    type Entity: Entity;

    /// Pre-fills the form from a stored entity.
    fn from_entity(entity: &Self::Entity) -> Self;

    fn set_field(&mut self, field: &str, value: &str) -> Result<(), FormError>;

    fn validate(&self) -> FieldErrors;

    /// Provider record sent on create.
    fn create_record(&self, ctx: &NormalizeContext) -> RawRecord;

    /// Provider record sent on update; always carries `Id`.
    fn update_record(&self, id: &RecordId, ctx: &NormalizeContext) -> RawRecord {
        let mut record = self.create_record(ctx);
        record.insert(crate::record::FIELD_ID, id.to_wire());
        record
    }

    /// Local result of a confirmed update when the gateway echoes nothing usable.
    fn merge_into(&self, existing: &Self::Entity, ctx: &NormalizeContext) -> Self::Entity;
}

fn require(errors: &mut FieldErrors, field: &str, value: &str, message: &str) {
    if value.trim().is_empty() {
        errors.insert(field, message);
    }
}

fn validate_person(errors: &mut FieldErrors, first_name: &str, last_name: &str, email: &str) {
    require(errors, "firstName", first_name, ERROR_FIRST_NAME_REQUIRED);
    require(errors, "lastName", last_name, ERROR_LAST_NAME_REQUIRED);
    if email.trim().is_empty() {
        errors.insert("email", ERROR_EMAIL_REQUIRED);
    } else if !is_valid_email(email) {
        errors.insert("email", ERROR_EMAIL_INVALID);
    }
}

/// Tags as the store holds them after the gateway accepts the form text.
fn tags_from_input(input: &str) -> Vec<String> {
    split_tags(&join_tag_input(input))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactDraft {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub company: String,
    pub position: String,
    pub lead_source: Option<LeadSource>,
    pub tags: String,
}

impl Draft for ContactDraft {
    type Entity = Contact;

    fn from_entity(entity: &Contact) -> Self {
        Self {
            first_name: entity.first_name.clone(),
            last_name: entity.last_name.clone(),
            email: entity.email.clone(),
            phone: entity.phone.clone(),
            company: entity.company.clone(),
            position: entity.position.clone(),
            lead_source: entity.lead_source,
            tags: tags_to_input(&entity.tags),
        }
    }

    fn set_field(&mut self, field: &str, value: &str) -> Result<(), FormError> {
        match field {
            "firstName" => self.first_name = value.to_string(),
            "lastName" => self.last_name = value.to_string(),
            "email" => self.email = value.to_string(),
            "phone" => self.phone = value.to_string(),
            "company" => self.company = value.to_string(),
            "position" => self.position = value.to_string(),
            "leadSource" => {
                self.lead_source = if value.trim().is_empty() {
                    None
                } else {
                    Some(LeadSource::parse(value).ok_or_else(|| FormError::invalid(field, value))?)
                };
            }
            "tags" => self.tags = value.to_string(),
            _ => return Err(FormError::unknown(field)),
        }
        Ok(())
    }

    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        validate_person(&mut errors, &self.first_name, &self.last_name, &self.email);
        errors
    }

    fn create_record(&self, ctx: &NormalizeContext) -> RawRecord {
        payload::contact_record(self, ctx)
    }

    fn merge_into(&self, existing: &Contact, ctx: &NormalizeContext) -> Contact {
        Contact {
            id: existing.id.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            company: self.company.clone(),
            position: self.position.clone(),
            lead_source: self.lead_source,
            tags: tags_from_input(&self.tags),
            last_contact_date: ctx.today,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientDraft {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub company: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub industry: String,
    pub notes: String,
    pub tags: String,
}

impl Draft for ClientDraft {
    type Entity = Client;

    fn from_entity(entity: &Client) -> Self {
        Self {
            first_name: entity.first_name.clone(),
            last_name: entity.last_name.clone(),
            email: entity.email.clone(),
            phone: entity.phone.clone(),
            company: entity.company.clone(),
            address: entity.address.clone(),
            city: entity.city.clone(),
            state: entity.state.clone(),
            zip: entity.zip.clone(),
            industry: entity.industry.clone(),
            notes: entity.notes.clone(),
            tags: tags_to_input(&entity.tags),
        }
    }

    fn set_field(&mut self, field: &str, value: &str) -> Result<(), FormError> {
        let slot = match field {
            "firstName" => &mut self.first_name,
            "lastName" => &mut self.last_name,
            "email" => &mut self.email,
            "phone" => &mut self.phone,
            "company" => &mut self.company,
            "address" => &mut self.address,
            "city" => &mut self.city,
            "state" => &mut self.state,
            "zip" => &mut self.zip,
            "industry" => &mut self.industry,
            "notes" => &mut self.notes,
            "tags" => &mut self.tags,
            _ => return Err(FormError::unknown(field)),
        };
        *slot = value.to_string();
        Ok(())
    }

    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        validate_person(&mut errors, &self.first_name, &self.last_name, &self.email);
        errors
    }

    fn create_record(&self, ctx: &NormalizeContext) -> RawRecord {
        payload::client_record(self, ctx)
    }

    fn merge_into(&self, existing: &Client, _ctx: &NormalizeContext) -> Client {
        Client {
            id: existing.id.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            company: self.company.clone(),
            address: self.address.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
            zip: self.zip.clone(),
            industry: self.industry.clone(),
            notes: self.notes.clone(),
            tags: tags_from_input(&self.tags),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub name: String,
    pub description: String,
    /// `YYYY-MM-DD` or blank.
    pub due_date: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub tags: String,
}

impl Draft for TaskDraft {
    type Entity = Task;

    fn from_entity(entity: &Task) -> Self {
        Self {
            name: entity.name.clone(),
            description: entity.description.clone(),
            due_date: entity.due_date.map(format_date).unwrap_or_default(),
            priority: entity.priority,
            status: entity.status,
            tags: tags_to_input(&entity.tags),
        }
    }

    fn set_field(&mut self, field: &str, value: &str) -> Result<(), FormError> {
        match field {
            "name" => self.name = value.to_string(),
            "description" => self.description = value.to_string(),
            "dueDate" => {
                if !value.trim().is_empty() && parse_date(value).is_none() {
                    return Err(FormError::invalid(field, value));
                }
                self.due_date = value.trim().to_string();
            }
            "priority" => {
                self.priority =
                    TaskPriority::parse(value).ok_or_else(|| FormError::invalid(field, value))?;
            }
            "status" => {
                self.status =
                    TaskStatus::parse(value).ok_or_else(|| FormError::invalid(field, value))?;
            }
            "tags" => self.tags = value.to_string(),
            _ => return Err(FormError::unknown(field)),
        }
        Ok(())
    }

    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        require(&mut errors, "name", &self.name, ERROR_TASK_NAME_REQUIRED);
        errors
    }

    fn create_record(&self, _ctx: &NormalizeContext) -> RawRecord {
        payload::task_record(self)
    }

    fn merge_into(&self, existing: &Task, _ctx: &NormalizeContext) -> Task {
        Task {
            id: existing.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            due_date: parse_date(&self.due_date),
            priority: self.priority,
            status: self.status,
            tags: tags_from_input(&self.tags),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DealDraft {
    pub name: String,
    pub tags: String,
}

impl Draft for DealDraft {
    type Entity = Deal;

    fn from_entity(entity: &Deal) -> Self {
        Self {
            name: entity.name.clone(),
            tags: tags_to_input(&entity.tags),
        }
    }

    fn set_field(&mut self, field: &str, value: &str) -> Result<(), FormError> {
        match field {
            "name" => self.name = value.to_string(),
            "tags" => self.tags = value.to_string(),
            _ => return Err(FormError::unknown(field)),
        }
        Ok(())
    }

    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        require(&mut errors, "name", &self.name, ERROR_DEAL_NAME_REQUIRED);
        errors
    }

    fn create_record(&self, _ctx: &NormalizeContext) -> RawRecord {
        payload::deal_record(self)
    }

    fn merge_into(&self, existing: &Deal, _ctx: &NormalizeContext) -> Deal {
        Deal {
            id: existing.id.clone(),
            name: self.name.clone(),
            owner: existing.owner.clone(),
            tags: tags_from_input(&self.tags),
        }
    }
}

/// Draft plus error map for one open form.
///
/// `editing` is the id of the entity being edited; `None` means the form
/// creates a new record.
#[derive(Debug, Clone, Default)]
pub struct FormController<D: Draft> {
    draft: D,
    editing: Option<RecordId>,
    errors: FieldErrors,
}

impl<D: Draft> FormController<D> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            draft: D::default(),
            editing: None,
            errors: FieldErrors::new(),
        }
    }

    #[must_use]
    pub fn edit(entity: &D::Entity) -> Self {
        Self {
            draft: D::from_entity(entity),
            editing: Some(entity.id().clone()),
            errors: FieldErrors::new(),
        }
    }

    #[must_use]
    pub fn draft(&self) -> &D {
        &self.draft
    }

    #[must_use]
    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    #[must_use]
    pub fn editing(&self) -> Option<&RecordId> {
        self.editing.as_ref()
    }

    /// Applies one edit and drops that field's pending error.
    pub fn set_field(&mut self, field: &str, value: &str) -> Result<(), FormError> {
        self.draft.set_field(field, value)?;
        self.errors.clear(field);
        Ok(())
    }

    /// Re-runs validation and stores the outcome; returns whether the draft is valid.
    pub fn validate(&mut self) -> bool {
        self.errors = self.draft.validate();
        self.errors.is_empty()
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Submits through `coordinator`.
    ///
    /// Success closes the form (the controller resets). Any failure keeps the
    /// user's input; validation failures also populate the error map.
    pub async fn submit(
        &mut self,
        coordinator: &MutationCoordinator<D::Entity>,
    ) -> Result<Mutated<Option<D::Entity>>, MutationError> {
        let result = match &self.editing {
            Some(id) => coordinator.update(id, &self.draft).await,
            None => coordinator
                .create(&self.draft)
                .await
                .map(|created| created.map(Some)),
        };
        match &result {
            Ok(_) => self.reset(),
            Err(MutationError::Validation(errors)) => self.errors = errors.clone(),
            Err(_) => {}
        }
        result
    }
}
