use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::gateway::SortDirection;
use crate::normalize::{self, NormalizeContext};
use crate::record::{FIELD_CREATED_ON, FIELD_ID, FIELD_NAME, FIELD_OWNER, FIELD_TAGS, RawRecord, RecordId};

const CONTACT_FIELDS: [&str; 12] = [
    FIELD_ID,
    FIELD_NAME,
    FIELD_TAGS,
    FIELD_OWNER,
    "firstName",
    "lastName",
    "email",
    "phone",
    "company",
    "position",
    "leadSource",
    "lastContactDate",
];

const CLIENT_FIELDS: [&str; 15] = [
    FIELD_ID,
    FIELD_NAME,
    FIELD_TAGS,
    FIELD_OWNER,
    "firstName",
    "lastName",
    "email",
    "phone",
    "company",
    "address",
    "city",
    "state",
    "zip",
    "industry",
    "notes",
];

const TASK_FIELDS: [&str; 8] = [
    FIELD_ID,
    FIELD_NAME,
    FIELD_TAGS,
    FIELD_OWNER,
    "Status",
    "Priority",
    "DueDate",
    "Description",
];

const DEAL_FIELDS: [&str; 4] = [FIELD_ID, FIELD_NAME, FIELD_TAGS, FIELD_OWNER];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Contact,
    Client,
    Task,
    Deal,
}

impl EntityKind {
    #[must_use]
    pub fn all() -> [Self; 4] {
        [Self::Contact, Self::Client, Self::Task, Self::Deal]
    }

    /// Collection name on the gateway.
    #[must_use]
    pub fn collection(self) -> &'static str {
        match self {
            Self::Contact => "contact",
            Self::Client => "client",
            Self::Task => "task",
            Self::Deal => "deal",
        }
    }

    #[must_use]
    pub fn plural(self) -> &'static str {
        match self {
            Self::Contact => "contacts",
            Self::Client => "clients",
            Self::Task => "tasks",
            Self::Deal => "deals",
        }
    }

    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::Contact => "Contact",
            Self::Client => "Client",
            Self::Task => "Task",
            Self::Deal => "Deal",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "contact" | "contacts" => Some(Self::Contact),
            "client" | "clients" => Some(Self::Client),
            "task" | "tasks" => Some(Self::Task),
            "deal" | "deals" => Some(Self::Deal),
            _ => None,
        }
    }

    /// Fields requested on a bulk load.
    #[must_use]
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            Self::Contact => &CONTACT_FIELDS,
            Self::Client => &CLIENT_FIELDS,
            Self::Task => &TASK_FIELDS,
            Self::Deal => &DEAL_FIELDS,
        }
    }

    /// Display order of a bulk load.
    #[must_use]
    pub fn default_order(self) -> (&'static str, SortDirection) {
        match self {
            Self::Contact => ("lastContactDate", SortDirection::Desc),
            Self::Client => (FIELD_NAME, SortDirection::Asc),
            Self::Task | Self::Deal => (FIELD_CREATED_ON, SortDirection::Desc),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadSource {
    Website,
    Referral,
    Conference,
    #[serde(rename = "Social Media")]
    SocialMedia,
    #[serde(rename = "Email Campaign")]
    EmailCampaign,
    Other,
}

impl LeadSource {
    #[must_use]
    pub fn all() -> [Self; 6] {
        [
            Self::Website,
            Self::Referral,
            Self::Conference,
            Self::SocialMedia,
            Self::EmailCampaign,
            Self::Other,
        ]
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Website => "Website",
            Self::Referral => "Referral",
            Self::Conference => "Conference",
            Self::SocialMedia => "Social Media",
            Self::EmailCampaign => "Email Campaign",
            Self::Other => "Other",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let wanted = collapse(raw);
        Self::all()
            .into_iter()
            .find(|source| collapse(source.as_str()) == wanted)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    #[must_use]
    pub fn all() -> [Self; 4] {
        [Self::Low, Self::Medium, Self::High, Self::Urgent]
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Urgent => "Urgent",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let wanted = collapse(raw);
        Self::all()
            .into_iter()
            .find(|priority| collapse(priority.as_str()) == wanted)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    #[default]
    #[serde(rename = "Not Started")]
    NotStarted,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
    #[serde(rename = "On Hold")]
    OnHold,
}

impl TaskStatus {
    #[must_use]
    pub fn all() -> [Self; 4] {
        [Self::NotStarted, Self::InProgress, Self::Completed, Self::OnHold]
    }

    /// Wire spelling used by the task collection.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "Not Started",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::OnHold => "On Hold",
        }
    }

    /// Accepts `"In Progress"`, `"in_progress"`, `"InProgress"` and so on.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let wanted = collapse(raw);
        Self::all()
            .into_iter()
            .find(|status| collapse(status.as_str()) == wanted)
    }

    #[must_use]
    pub fn is_completed(self) -> bool {
        matches!(self, Self::Completed)
    }
}

fn collapse(raw: &str) -> String {
    raw.chars()
        .filter(|ch| ch.is_ascii_alphanumeric())
        .map(|ch| ch.to_ascii_lowercase())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: RecordId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub company: String,
    pub position: String,
    pub lead_source: Option<LeadSource>,
    pub tags: Vec<String>,
    pub last_contact_date: NaiveDate,
}

impl Contact {
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: RecordId,
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
    pub tags: Vec<String>,
}

impl Client {
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Non-empty address parts joined with `", "`.
    #[must_use]
    pub fn full_address(&self) -> String {
        [&self.address, &self.city, &self.state, &self.zip]
            .into_iter()
            .filter(|part| !part.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: RecordId,
    pub name: String,
    pub description: String,
    pub due_date: Option<NaiveDate>,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    pub id: RecordId,
    pub name: String,
    pub owner: String,
    pub tags: Vec<String>,
}

/// A normalized, UI-facing record of one collection.
pub trait Entity: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> &RecordId;

    /// Short human label used in listings and prompts.
    fn title(&self) -> String;

    /// Maps one raw gateway record. `None` only when the record has no usable `Id`.
    fn normalize(raw: &RawRecord, ctx: &NormalizeContext) -> Option<Self>;
}

impl Entity for Contact {
    const KIND: EntityKind = EntityKind::Contact;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn title(&self) -> String {
        self.full_name()
    }

    fn normalize(raw: &RawRecord, ctx: &NormalizeContext) -> Option<Self> {
        normalize::normalize_contact(raw, ctx)
    }
}

impl Entity for Client {
    const KIND: EntityKind = EntityKind::Client;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn title(&self) -> String {
        self.full_name()
    }

    fn normalize(raw: &RawRecord, ctx: &NormalizeContext) -> Option<Self> {
        normalize::normalize_client(raw, ctx)
    }
}

impl Entity for Task {
    const KIND: EntityKind = EntityKind::Task;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn title(&self) -> String {
        self.name.clone()
    }

    fn normalize(raw: &RawRecord, ctx: &NormalizeContext) -> Option<Self> {
        normalize::normalize_task(raw, ctx)
    }
}

impl Entity for Deal {
    const KIND: EntityKind = EntityKind::Deal;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn title(&self) -> String {
        self.name.clone()
    }

    fn normalize(raw: &RawRecord, ctx: &NormalizeContext) -> Option<Self> {
        normalize::normalize_deal(raw, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_status_parse_is_lenient_about_spelling() {
        assert_eq!(TaskStatus::parse("In Progress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::parse("in_progress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::parse("NotStarted"), Some(TaskStatus::NotStarted));
        assert_eq!(TaskStatus::parse("done"), None);
        assert_eq!(TaskStatus::default(), TaskStatus::NotStarted);
    }

    #[test]
    fn priority_and_lead_source_round_trip_their_labels() {
        for priority in TaskPriority::all() {
            assert_eq!(TaskPriority::parse(priority.as_str()), Some(priority));
        }
        for source in LeadSource::all() {
            assert_eq!(LeadSource::parse(source.as_str()), Some(source));
        }
        assert_eq!(LeadSource::parse("social-media"), Some(LeadSource::SocialMedia));
        assert_eq!(TaskPriority::default(), TaskPriority::Medium);
    }

    #[test]
    fn kinds_map_to_gateway_collections() {
        let names: Vec<_> = EntityKind::all().iter().map(|kind| kind.collection()).collect();
        assert_eq!(names, ["contact", "client", "task", "deal"]);
        assert_eq!(EntityKind::parse("Clients"), Some(EntityKind::Client));
        assert_eq!(EntityKind::Contact.default_order(), ("lastContactDate", SortDirection::Desc));
        assert_eq!(EntityKind::Client.default_order(), ("Name", SortDirection::Asc));
    }

    #[test]
    fn client_full_address_skips_blank_parts() {
        let client = Client {
            id: RecordId::new("1"),
            first_name: "Ann".to_string(),
            last_name: "Lee".to_string(),
            email: String::new(),
            phone: String::new(),
            company: String::new(),
            address: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            state: String::new(),
            zip: "62701".to_string(),
            industry: String::new(),
            notes: String::new(),
            tags: Vec::new(),
        };
        assert_eq!(client.full_address(), "1 Main St, Springfield, 62701");
        assert_eq!(client.full_name(), "Ann Lee");
    }
}
