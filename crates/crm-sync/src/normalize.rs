//! Raw gateway record -> normalized entity mapping.
//!
//! Normalization never fails on field content: absent strings read as `""`,
//! absent tags as an empty list, and absent contact dates as "today". The only
//! record that is skipped is one without a usable `Id`.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use tracing::warn;

use crate::entity::{
    Client, Contact, Deal, Entity, LeadSource, Task, TaskPriority, TaskStatus,
};
use crate::record::{FIELD_NAME, FIELD_OWNER, FIELD_TAGS, RawRecord, split_tags};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeContext {
    pub today: NaiveDate,
}

impl NormalizeContext {
    /// Today's UTC calendar date, the date the gateway stamps records with.
    #[must_use]
    pub fn today() -> Self {
        Self::at_instant(&Utc::now())
    }

    #[must_use]
    pub fn at_instant<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        Self {
            today: now.with_timezone(&Utc).date_naive(),
        }
    }

    #[must_use]
    pub fn at(today: NaiveDate) -> Self {
        Self { today }
    }

    #[must_use]
    pub fn today_string(&self) -> String {
        format_date(self.today)
    }
}

#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parses `YYYY-MM-DD`, also accepting full timestamps by their date prefix.
#[must_use]
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let head = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(head, DATE_FORMAT).ok()
}

fn tags_of(raw: &RawRecord) -> Vec<String> {
    split_tags(&raw.text(FIELD_TAGS))
}

pub(crate) fn normalize_contact(raw: &RawRecord, ctx: &NormalizeContext) -> Option<Contact> {
    let id = raw.id()?;
    let lead_source_raw = raw.text("leadSource");
    let lead_source = LeadSource::parse(&lead_source_raw);
    if lead_source.is_none() && !lead_source_raw.trim().is_empty() {
        warn!(id = %id, lead_source = %lead_source_raw, "unknown contact lead source dropped");
    }
    Some(Contact {
        first_name: raw.text("firstName"),
        last_name: raw.text("lastName"),
        email: raw.text("email"),
        phone: raw.text("phone"),
        company: raw.text("company"),
        position: raw.text("position"),
        lead_source,
        tags: tags_of(raw),
        last_contact_date: parse_date(&raw.text("lastContactDate")).unwrap_or(ctx.today),
        id,
    })
}

pub(crate) fn normalize_client(raw: &RawRecord, _ctx: &NormalizeContext) -> Option<Client> {
    let id = raw.id()?;
    Some(Client {
        first_name: raw.text("firstName"),
        last_name: raw.text("lastName"),
        email: raw.text("email"),
        phone: raw.text("phone"),
        company: raw.text("company"),
        address: raw.text("address"),
        city: raw.text("city"),
        state: raw.text("state"),
        zip: raw.text("zip"),
        industry: raw.text("industry"),
        notes: raw.text("notes"),
        tags: tags_of(raw),
        id,
    })
}

pub(crate) fn normalize_task(raw: &RawRecord, _ctx: &NormalizeContext) -> Option<Task> {
    let id = raw.id()?;
    let status = TaskStatus::parse(&raw.first_text(&["Status", "status"])).unwrap_or_default();
    let priority =
        TaskPriority::parse(&raw.first_text(&["Priority", "priority"])).unwrap_or_default();
    Some(Task {
        name: raw.text(FIELD_NAME),
        description: raw.first_text(&["Description", "description"]),
        due_date: parse_date(&raw.first_text(&["DueDate", "dueDate"])),
        priority,
        status,
        tags: tags_of(raw),
        id,
    })
}

pub(crate) fn normalize_deal(raw: &RawRecord, _ctx: &NormalizeContext) -> Option<Deal> {
    let id = raw.id()?;
    Some(Deal {
        name: raw.text(FIELD_NAME),
        owner: raw.text(FIELD_OWNER),
        tags: tags_of(raw),
        id,
    })
}

/// Normalizes a bulk page, keeping gateway order.
///
/// Records without an id are skipped; a repeated id keeps its first occurrence.
pub fn normalize_page<T: Entity>(records: &[RawRecord], ctx: &NormalizeContext) -> Vec<T> {
    let mut seen = HashSet::new();
    let mut entities = Vec::with_capacity(records.len());
    for raw in records {
        let Some(entity) = T::normalize(raw, ctx) else {
            warn!(collection = T::KIND.collection(), "raw record without Id skipped");
            continue;
        };
        if !seen.insert(entity.id().clone()) {
            warn!(
                collection = T::KIND.collection(),
                id = %entity.id(),
                "duplicate id in page skipped"
            );
            continue;
        }
        entities.push(entity);
    }
    entities
}
