#![expect(
    clippy::print_stdout,
    clippy::print_stderr,
    reason = "the CLI reports to the terminal"
)]

use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use crm_gateway_client::{ConfigOverrides, GatewayConfig, HttpRecordGateway};
use crm_sync::mutation::delete_prompt;
use crm_sync::{
    Client, ClientDraft, CollectionStore, Contact, ContactDraft, Deal, DealDraft, DeleteOutcome,
    Draft, Entity, EntityKind, FormController, GatewayClient, Mutated, MutationCoordinator,
    RecordId, Searchable, StoreHandle, SyncSettings, Task, TaskDraft, TaskStatus,
    TaskStatusFilter, search,
};
use serde_json::json;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod render;

use render::{Listing, print_json};

#[derive(Parser)]
#[command(name = "crm")]
#[command(about = "List, search, and edit CRM contacts, clients, tasks, and deals")]
struct Cli {
    #[command(flatten)]
    gateway: GatewayArgs,
    /// Print JSON instead of tab-separated lines.
    #[arg(long)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GatewayArgs {
    /// Overrides CRM_GATEWAY_BASE_URL.
    #[arg(long)]
    base_url: Option<String>,
    /// Overrides CRM_PROJECT_ID.
    #[arg(long)]
    project_id: Option<String>,
    /// Overrides CRM_PUBLIC_KEY.
    #[arg(long)]
    public_key: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a collection and print the records matching the filters.
    List(ListArgs),
    /// Fetch one record by id.
    Show(RecordArgs),
    /// Create a record from `--set field=value` pairs.
    Add(AddArgs),
    /// Change fields of an existing record.
    Edit(EditArgs),
    /// Delete a record after confirmation.
    Delete(DeleteArgs),
    #[command(subcommand)]
    Task(TaskCommands),
}

#[derive(Args)]
struct ListArgs {
    #[arg(value_parser = parse_kind)]
    kind: EntityKind,
    #[arg(long, default_value = "")]
    search: String,
    /// Task lists only: all, active, or completed.
    #[arg(long, value_parser = parse_status_filter)]
    status: Option<TaskStatusFilter>,
}

#[derive(Args)]
struct RecordArgs {
    #[arg(value_parser = parse_kind)]
    kind: EntityKind,
    id: String,
}

#[derive(Args)]
struct AddArgs {
    #[arg(value_parser = parse_kind)]
    kind: EntityKind,
    #[arg(long = "set", value_name = "FIELD=VALUE", value_parser = parse_assignment)]
    set: Vec<(String, String)>,
}

#[derive(Args)]
struct EditArgs {
    #[arg(value_parser = parse_kind)]
    kind: EntityKind,
    id: String,
    #[arg(
        long = "set",
        value_name = "FIELD=VALUE",
        value_parser = parse_assignment,
        required = true
    )]
    set: Vec<(String, String)>,
}

#[derive(Args)]
struct DeleteArgs {
    #[arg(value_parser = parse_kind)]
    kind: EntityKind,
    id: String,
    /// Skip the confirmation prompt.
    #[arg(long)]
    yes: bool,
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Mark a task Completed.
    Complete { id: String },
    /// Move a task back to In Progress.
    Reopen { id: String },
    /// Completed tasks reopen; anything else is completed.
    Toggle { id: String },
    /// Set an explicit status.
    Status {
        id: String,
        #[arg(value_parser = parse_task_status)]
        status: TaskStatus,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let session = Session::connect(cli.gateway, cli.json)?;
    match cli.command {
        Commands::List(args) => run_list(&session, args).await,
        Commands::Show(args) => match args.kind {
            EntityKind::Contact => show::<Contact>(&session, &args.id).await,
            EntityKind::Client => show::<Client>(&session, &args.id).await,
            EntityKind::Task => show::<Task>(&session, &args.id).await,
            EntityKind::Deal => show::<Deal>(&session, &args.id).await,
        },
        Commands::Add(args) => match args.kind {
            EntityKind::Contact => add::<ContactDraft>(&session, &args.set).await,
            EntityKind::Client => add::<ClientDraft>(&session, &args.set).await,
            EntityKind::Task => add::<TaskDraft>(&session, &args.set).await,
            EntityKind::Deal => add::<DealDraft>(&session, &args.set).await,
        },
        Commands::Edit(args) => match args.kind {
            EntityKind::Contact => edit::<ContactDraft>(&session, &args.id, &args.set).await,
            EntityKind::Client => edit::<ClientDraft>(&session, &args.id, &args.set).await,
            EntityKind::Task => edit::<TaskDraft>(&session, &args.id, &args.set).await,
            EntityKind::Deal => edit::<DealDraft>(&session, &args.id, &args.set).await,
        },
        Commands::Delete(args) => match args.kind {
            EntityKind::Contact => delete::<Contact>(&session, &args.id, args.yes).await,
            EntityKind::Client => delete::<Client>(&session, &args.id, args.yes).await,
            EntityKind::Task => delete::<Task>(&session, &args.id, args.yes).await,
            EntityKind::Deal => delete::<Deal>(&session, &args.id, args.yes).await,
        },
        Commands::Task(command) => run_task(&session, command).await,
    }
}

struct Session {
    gateway: GatewayClient,
    settings: SyncSettings,
    json: bool,
}

impl Session {
    fn connect(args: GatewayArgs, json: bool) -> Result<Self> {
        let overrides = ConfigOverrides {
            base_url: args.base_url,
            project_id: args.project_id,
            public_key: args.public_key,
        };
        let config =
            GatewayConfig::from_env_with(&overrides).context("invalid gateway configuration")?;
        debug!(base_url = %config.base_url, timeout_ms = config.timeout_ms, "gateway configured");
        let http = HttpRecordGateway::new(config).context("invalid gateway configuration")?;
        let settings = SyncSettings::from_env().context("invalid paging settings")?;
        Ok(Self {
            gateway: GatewayClient::new(Arc::new(http)),
            settings,
            json,
        })
    }

    /// The returned store must outlive the coordinator's calls.
    fn coordinator<T: Entity>(&self) -> (StoreHandle<T>, MutationCoordinator<T>) {
        let store = CollectionStore::shared();
        let coordinator =
            MutationCoordinator::new(self.gateway.clone(), &store).with_settings(self.settings);
        (store, coordinator)
    }

    fn print_records<T: Listing>(&self, records: &[&T]) -> Result<()> {
        if self.json {
            return print_json(&serde_json::to_value(records)?);
        }
        if records.is_empty() {
            println!("No {} found", T::KIND.plural());
        }
        for record in records {
            println!("{}", record.line());
        }
        Ok(())
    }

    fn print_mutation<T: Listing>(&self, mutated: &Mutated<Option<T>>) -> Result<()> {
        if self.json {
            return print_json(&json!({
                "notice": mutated.notice,
                "record": mutated.value,
            }));
        }
        if let Some(notice) = &mutated.notice {
            println!("{notice}");
        }
        if let Some(record) = &mutated.value {
            println!("{}", record.line());
        }
        Ok(())
    }
}

async fn run_list(session: &Session, args: ListArgs) -> Result<()> {
    if args.status.is_some() && args.kind != EntityKind::Task {
        bail!("--status only applies to tasks");
    }
    match args.kind {
        EntityKind::Contact => list::<Contact>(session, &args.search).await,
        EntityKind::Client => list::<Client>(session, &args.search).await,
        EntityKind::Deal => list::<Deal>(session, &args.search).await,
        EntityKind::Task => {
            let tasks = load::<Task>(session).await?;
            let status = args.status.unwrap_or_default();
            session.print_records(&search::filter_tasks(&tasks, &args.search, status))
        }
    }
}

async fn load<T: Entity>(session: &Session) -> Result<Vec<T>> {
    let (_store, coordinator) = session.coordinator::<T>();
    Ok(coordinator.load().await?.value)
}

async fn list<T: Listing + Searchable>(session: &Session, query: &str) -> Result<()> {
    let records = load::<T>(session).await?;
    session.print_records(&search::filter(&records, query))
}

async fn fetch<T: Entity>(coordinator: &MutationCoordinator<T>, id: &RecordId) -> Result<T> {
    coordinator
        .refresh(id)
        .await?
        .value
        .with_context(|| format!("{} {id} not found", T::KIND.collection()))
}

async fn show<T: Listing>(session: &Session, id: &str) -> Result<()> {
    let (_store, coordinator) = session.coordinator::<T>();
    let record = fetch(&coordinator, &RecordId::new(id)).await?;
    session.print_records(&[&record])
}

fn apply_assignments<D: Draft>(
    form: &mut FormController<D>,
    assignments: &[(String, String)],
) -> Result<()> {
    for (field, value) in assignments {
        form.set_field(field, value)?;
    }
    Ok(())
}

async fn add<D>(session: &Session, assignments: &[(String, String)]) -> Result<()>
where
    D: Draft,
    D::Entity: Listing,
{
    let (_store, coordinator) = session.coordinator::<D::Entity>();
    let mut form = FormController::<D>::new();
    apply_assignments(&mut form, assignments)?;
    let created = form.submit(&coordinator).await?;
    session.print_mutation(&created)
}

async fn edit<D>(session: &Session, id: &str, assignments: &[(String, String)]) -> Result<()>
where
    D: Draft,
    D::Entity: Listing,
{
    let (_store, coordinator) = session.coordinator::<D::Entity>();
    let existing = fetch(&coordinator, &RecordId::new(id)).await?;
    let mut form = FormController::<D>::edit(&existing);
    apply_assignments(&mut form, assignments)?;
    let updated = form.submit(&coordinator).await?;
    session.print_mutation(&updated)
}

async fn delete<T: Listing>(session: &Session, id: &str, assume_yes: bool) -> Result<()> {
    let (_store, coordinator) = session.coordinator::<T>();
    let id = RecordId::new(id);
    let confirmed = assume_yes || confirm_on_stdin(delete_prompt(T::KIND)).await?;
    let outcome = coordinator.delete(&id, &move |_: &str| confirmed).await?;
    match outcome {
        DeleteOutcome::Declined if session.json => print_json(&json!({"deleted": false})),
        DeleteOutcome::Declined => {
            println!("Delete cancelled");
            Ok(())
        }
        DeleteOutcome::Deleted { notice, .. } if session.json => {
            print_json(&json!({"deleted": true, "notice": notice}))
        }
        DeleteOutcome::Deleted { notice, .. } => {
            println!("{notice}");
            Ok(())
        }
    }
}

async fn run_task(session: &Session, command: TaskCommands) -> Result<()> {
    let (_store, coordinator) = session.coordinator::<Task>();
    let (id, target) = match command {
        TaskCommands::Complete { id } => (id, Some(TaskStatus::Completed)),
        TaskCommands::Reopen { id } => (id, Some(TaskStatus::InProgress)),
        TaskCommands::Status { id, status } => (id, Some(status)),
        TaskCommands::Toggle { id } => (id, None),
    };
    let task = fetch(&coordinator, &RecordId::new(id)).await?;
    let updated = match target {
        Some(status) => coordinator.set_task_status(&task.id, status).await?,
        None => coordinator.toggle_completion(&task).await?,
    };
    session.print_mutation(&updated)
}

/// The terminal read runs on the blocking pool, before the coordinator
/// takes its in-flight slot.
async fn confirm_on_stdin(prompt: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || {
        read_confirmation(&prompt, &mut io::stdin().lock(), &mut io::stderr())
    })
    .await
    .context("confirmation prompt failed")
}

fn read_confirmation(prompt: &str, input: &mut impl BufRead, output: &mut impl Write) -> bool {
    if write!(output, "{prompt} [y/N] ").and_then(|()| output.flush()).is_err() {
        return false;
    }
    let mut answer = String::new();
    if input.read_line(&mut answer).is_err() {
        return false;
    }
    is_affirmative(&answer)
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn parse_kind(raw: &str) -> Result<EntityKind, String> {
    EntityKind::parse(raw)
        .ok_or_else(|| format!("unknown collection `{raw}` (contacts, clients, tasks, deals)"))
}

fn parse_status_filter(raw: &str) -> Result<TaskStatusFilter, String> {
    TaskStatusFilter::parse(raw)
        .ok_or_else(|| format!("unknown status filter `{raw}` (all, active, completed)"))
}

fn parse_task_status(raw: &str) -> Result<TaskStatus, String> {
    TaskStatus::parse(raw).ok_or_else(|| {
        let known = TaskStatus::all().map(TaskStatus::as_str).join(", ");
        format!("unknown task status `{raw}` ({known})")
    })
}

fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=VALUE, got `{raw}`"))?;
    let field = field.trim();
    if field.is_empty() {
        return Err(format!("missing field name in `{raw}`"));
    }
    Ok((field.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn list_accepts_plural_and_singular_kinds() {
        let cli = Cli::try_parse_from(["crm", "list", "Contacts", "--search", "acme"])
            .expect("parse list");
        let Commands::List(args) = cli.command else {
            panic!("expected list");
        };
        assert_eq!(args.kind, EntityKind::Contact);
        assert_eq!(args.search, "acme");
        assert_eq!(args.status, None);

        let cli = Cli::try_parse_from(["crm", "--json", "list", "task", "--status", "done"])
            .expect("parse task list");
        assert!(cli.json);
        let Commands::List(args) = cli.command else {
            panic!("expected list");
        };
        assert_eq!(args.status, Some(TaskStatusFilter::Completed));
    }

    #[test]
    fn unknown_kind_is_a_value_error() {
        let error = Cli::try_parse_from(["crm", "list", "invoices"]).err().expect("error");
        assert_eq!(error.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn edit_requires_at_least_one_assignment() {
        let error = Cli::try_parse_from(["crm", "edit", "contact", "4"])
            .err()
            .expect("error");
        assert_eq!(error.kind(), ErrorKind::MissingRequiredArgument);

        let cli = Cli::try_parse_from([
            "crm",
            "edit",
            "contact",
            "4",
            "--set",
            "email=ann@x.com",
            "--set",
            "notes=a=b",
        ])
        .expect("parse edit");
        let Commands::Edit(args) = cli.command else {
            panic!("expected edit");
        };
        assert_eq!(
            args.set,
            vec![
                ("email".to_string(), "ann@x.com".to_string()),
                ("notes".to_string(), "a=b".to_string()),
            ]
        );
    }

    #[test]
    fn gateway_flags_come_before_the_command() {
        let cli = Cli::try_parse_from([
            "crm",
            "--base-url",
            "http://localhost:8080",
            "--project-id",
            "proj",
            "delete",
            "deal",
            "9",
            "--yes",
        ])
        .expect("parse delete");
        assert_eq!(cli.gateway.base_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(cli.gateway.project_id.as_deref(), Some("proj"));
        let Commands::Delete(args) = cli.command else {
            panic!("expected delete");
        };
        assert!(args.yes);
    }

    #[test]
    fn task_status_accepts_loose_spelling() {
        let cli = Cli::try_parse_from(["crm", "task", "status", "3", "on_hold"])
            .expect("parse task status");
        let Commands::Task(TaskCommands::Status { id, status }) = cli.command else {
            panic!("expected task status");
        };
        assert_eq!(id, "3");
        assert_eq!(status, TaskStatus::OnHold);

        let error = Cli::try_parse_from(["crm", "task", "status", "3", "later"])
            .err()
            .expect("error");
        assert_eq!(error.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn assignments_need_a_field_name() {
        assert!(parse_assignment("=x").is_err());
        assert!(parse_assignment("novalue").is_err());
        assert_eq!(
            parse_assignment(" phone =555"),
            Ok(("phone".to_string(), "555".to_string()))
        );
    }

    #[test]
    fn only_yes_confirms() {
        assert!(is_affirmative("y\n"));
        assert!(is_affirmative(" YES "));
        assert!(!is_affirmative(""));
        assert!(!is_affirmative("no"));
    }

    #[test]
    fn confirmation_writes_the_prompt_and_reads_one_line() {
        let mut output = Vec::new();
        let mut input = io::Cursor::new("yes\nno\n");
        let prompt = delete_prompt(EntityKind::Deal);
        assert!(read_confirmation(&prompt, &mut input, &mut output));
        assert_eq!(
            String::from_utf8(output).expect("utf8"),
            "Are you sure you want to delete this deal? [y/N] "
        );
        assert!(!read_confirmation(&prompt, &mut input, &mut Vec::new()));
        assert!(!read_confirmation(&prompt, &mut io::Cursor::new(""), &mut Vec::new()));
    }
}
