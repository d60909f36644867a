//! Provider-shaped records built from drafts and patches.
//!
//! Keys follow the collection schemas exactly: provider-managed fields are
//! capitalised, contact and client domain fields are lower camel case, and
//! every task field is capitalised.

use serde_json::Value;

use crate::entity::{Task, TaskPriority, TaskStatus};
use crate::form::{ClientDraft, ContactDraft, DealDraft, TaskDraft};
use crate::normalize::{NormalizeContext, format_date, parse_date};
use crate::record::{FIELD_ID, FIELD_NAME, FIELD_TAGS, RawRecord, RecordId, join_tag_input, split_tags};

pub const TASK_STATUS: &str = "Status";
pub const TASK_PRIORITY: &str = "Priority";
pub const TASK_DESCRIPTION: &str = "Description";
pub const TASK_DUE_DATE: &str = "DueDate";

fn display_name(first_name: &str, last_name: &str) -> String {
    format!("{first_name} {last_name}")
}

pub(crate) fn contact_record(draft: &ContactDraft, ctx: &NormalizeContext) -> RawRecord {
    RawRecord::new()
        .with("firstName", draft.first_name.as_str())
        .with("lastName", draft.last_name.as_str())
        .with(FIELD_NAME, display_name(&draft.first_name, &draft.last_name))
        .with("email", draft.email.as_str())
        .with("phone", draft.phone.as_str())
        .with("company", draft.company.as_str())
        .with("position", draft.position.as_str())
        .with(
            "leadSource",
            draft.lead_source.map(|source| source.as_str()).unwrap_or_default(),
        )
        .with(FIELD_TAGS, join_tag_input(&draft.tags))
        .with("lastContactDate", ctx.today_string())
}

pub(crate) fn client_record(draft: &ClientDraft, _ctx: &NormalizeContext) -> RawRecord {
    RawRecord::new()
        .with("firstName", draft.first_name.as_str())
        .with("lastName", draft.last_name.as_str())
        .with(FIELD_NAME, display_name(&draft.first_name, &draft.last_name))
        .with("email", draft.email.as_str())
        .with("phone", draft.phone.as_str())
        .with("company", draft.company.as_str())
        .with("address", draft.address.as_str())
        .with("city", draft.city.as_str())
        .with("state", draft.state.as_str())
        .with("zip", draft.zip.as_str())
        .with("industry", draft.industry.as_str())
        .with("notes", draft.notes.as_str())
        .with(FIELD_TAGS, join_tag_input(&draft.tags))
}

pub(crate) fn task_record(draft: &TaskDraft) -> RawRecord {
    let due_date = parse_date(&draft.due_date).map_or(Value::Null, |date| Value::from(format_date(date)));
    RawRecord::new()
        .with(FIELD_NAME, draft.name.as_str())
        .with(FIELD_TAGS, join_tag_input(&draft.tags))
        .with(TASK_STATUS, draft.status.as_str())
        .with(TASK_PRIORITY, draft.priority.as_str())
        .with(TASK_DESCRIPTION, draft.description.as_str())
        .with(TASK_DUE_DATE, due_date)
}

pub(crate) fn deal_record(draft: &DealDraft) -> RawRecord {
    RawRecord::new()
        .with(FIELD_NAME, draft.name.as_str())
        .with(FIELD_TAGS, join_tag_input(&draft.tags))
}

/// Partial task update: only the fields that are `Some` are sent.
///
/// `due_date: Some(None)` clears the due date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub tags: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub description: Option<String>,
    pub due_date: Option<Option<chrono::NaiveDate>>,
}

impl TaskPatch {
    #[must_use]
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Update record: `Id` plus each present field.
    #[must_use]
    pub fn to_record(&self, id: &RecordId) -> RawRecord {
        let mut record = RawRecord::new().with(FIELD_ID, id.to_wire());
        if let Some(name) = &self.name {
            record.insert(FIELD_NAME, name.as_str());
        }
        if let Some(tags) = &self.tags {
            record.insert(FIELD_TAGS, join_tag_input(tags));
        }
        if let Some(status) = self.status {
            record.insert(TASK_STATUS, status.as_str());
        }
        if let Some(priority) = self.priority {
            record.insert(TASK_PRIORITY, priority.as_str());
        }
        if let Some(description) = &self.description {
            record.insert(TASK_DESCRIPTION, description.as_str());
        }
        if let Some(due_date) = self.due_date {
            record.insert(
                TASK_DUE_DATE,
                due_date.map_or(Value::Null, |date| Value::from(format_date(date))),
            );
        }
        record
    }

    /// Applies the present fields over a stored task.
    #[must_use]
    pub fn apply_to(&self, task: &Task) -> Task {
        let mut patched = task.clone();
        if let Some(name) = &self.name {
            patched.name.clone_from(name);
        }
        if let Some(tags) = &self.tags {
            patched.tags = split_tags(&join_tag_input(tags));
        }
        if let Some(status) = self.status {
            patched.status = status;
        }
        if let Some(priority) = self.priority {
            patched.priority = priority;
        }
        if let Some(description) = &self.description {
            patched.description.clone_from(description);
        }
        if let Some(due_date) = self.due_date {
            patched.due_date = due_date;
        }
        patched
    }
}
