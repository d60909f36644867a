use anyhow::{Context, Result};
use crm_sync::normalize::format_date;
use crm_sync::{Client, Contact, Deal, Entity, Task};
use serde::Serialize;
use serde_json::Value;

/// One tab-separated line per record in text output.
pub trait Listing: Entity + Serialize {
    fn line(&self) -> String;
}

impl Listing for Contact {
    fn line(&self) -> String {
        columns(&[
            self.id.as_str(),
            &self.full_name(),
            &self.email,
            &self.company,
            &format_date(self.last_contact_date),
        ])
    }
}

impl Listing for Client {
    fn line(&self) -> String {
        columns(&[
            self.id.as_str(),
            &self.full_name(),
            &self.email,
            &self.company,
            &self.full_address(),
        ])
    }
}

impl Listing for Task {
    fn line(&self) -> String {
        let due = self.due_date.map(format_date).unwrap_or_default();
        columns(&[
            self.id.as_str(),
            &self.name,
            self.status.as_str(),
            self.priority.as_str(),
            &due,
        ])
    }
}

impl Listing for Deal {
    fn line(&self) -> String {
        columns(&[self.id.as_str(), &self.name, &self.owner])
    }
}

fn columns(values: &[&str]) -> String {
    values.join("\t")
}

pub fn print_json(value: &Value) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render JSON output")?;
    println!("{rendered}");
    Ok(())
}
