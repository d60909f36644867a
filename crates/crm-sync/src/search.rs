//! Free-text filtering over an in-memory collection.

use std::borrow::Cow;

use crate::entity::{Client, Contact, Deal, Task};

/// Fields a free-text query is matched against.
pub trait Searchable {
    fn search_fields(&self) -> Vec<Cow<'_, str>>;
}

impl Searchable for Contact {
    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        vec![
            Cow::Owned(self.full_name()),
            Cow::Borrowed(&self.email),
            Cow::Borrowed(&self.company),
        ]
    }
}

impl Searchable for Client {
    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        vec![
            Cow::Owned(self.full_name()),
            Cow::Borrowed(&self.email),
            Cow::Borrowed(&self.company),
            Cow::Borrowed(&self.phone),
            Cow::Borrowed(&self.address),
            Cow::Borrowed(&self.city),
            Cow::Borrowed(&self.state),
            Cow::Borrowed(&self.industry),
        ]
    }
}

impl Searchable for Task {
    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        vec![Cow::Borrowed(&self.name), Cow::Borrowed(&self.description)]
    }
}

impl Searchable for Deal {
    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        vec![Cow::Borrowed(&self.name)]
    }
}

/// Case-insensitive substring match over any searchable field.
///
/// A blank query keeps everything in order. The query itself is not trimmed.
pub fn filter<'a, T: Searchable>(entities: &'a [T], query: &str) -> Vec<&'a T> {
    if query.trim().is_empty() {
        return entities.iter().collect();
    }
    let needle = query.to_lowercase();
    entities
        .iter()
        .filter(|entity| matches_needle(*entity, &needle))
        .collect()
}

fn matches_needle<T: Searchable>(entity: &T, needle: &str) -> bool {
    entity
        .search_fields()
        .iter()
        .any(|field| !field.is_empty() && field.to_lowercase().contains(needle))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskStatusFilter {
    #[default]
    All,
    Active,
    Completed,
}

impl TaskStatusFilter {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "all" => Some(Self::All),
            "active" | "open" => Some(Self::Active),
            "completed" | "done" => Some(Self::Completed),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }

    #[must_use]
    pub fn admits(self, task: &Task) -> bool {
        match self {
            Self::All => true,
            Self::Active => !task.status.is_completed(),
            Self::Completed => task.status.is_completed(),
        }
    }
}

/// Text query and status filter combined, as the task list applies them.
pub fn filter_tasks<'a>(
    tasks: &'a [Task],
    query: &str,
    status: TaskStatusFilter,
) -> Vec<&'a Task> {
    filter(tasks, query)
        .into_iter()
        .filter(|task| status.admits(task))
        .collect()
}
