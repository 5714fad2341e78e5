use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};
use futures::TryStreamExt;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use gitlab_work::builder::BaseFields;
use gitlab_work::catalog::{CatalogHealth, TypeCatalog};
use gitlab_work::engine::{CreateRequest, ListFilter, WorkItemEngine};
use gitlab_work::gitlab::{GraphqlClient, Transport};
use gitlab_work::model::work_item_type::looks_like_global_id;
use gitlab_work::model::{
    AssigneeChange, ContainerRef, HealthStatus, Patch, StateEvent, WidgetOperation,
    WorkItemLocator, WorkItemState, WorkItemType,
};

use crate::config::GitLabConfig;

#[derive(Parser, Debug)]
#[command(name = "gitlab-work")]
#[command(about = "Create, inspect and change GitLab work items")]
#[command(version)]
pub struct Cli {
    /// Path to config file (default: ~/.gitlab-work/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the work item types this instance knows
    Types {
        /// Discover again instead of reusing the session table
        #[arg(long)]
        refresh: bool,
    },
    /// Create a work item
    Create(CreateArgs),
    /// Show one work item
    Get(LocatorArgs),
    /// Change an existing work item
    Update(UpdateArgs),
    /// Permanently delete a work item
    Delete {
        #[command(flatten)]
        target: LocatorArgs,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// List work items in a project or group
    List(ListArgs),
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct ContainerArgs {
    /// Project path, e.g. acme/web
    #[arg(long)]
    pub project: Option<String>,
    /// Group path, e.g. acme
    #[arg(long)]
    pub group: Option<String>,
}

impl ContainerArgs {
    pub fn container(&self) -> Result<ContainerRef> {
        container_from(self.project.as_deref(), self.group.as_deref())?
            .context("Either --project or --group is required")
    }
}

#[derive(Args, Debug)]
pub struct LocatorArgs {
    /// Global id (gid://gitlab/WorkItem/123) or iid with --project/--group
    pub item: String,
    #[arg(long, conflicts_with = "group")]
    pub project: Option<String>,
    #[arg(long)]
    pub group: Option<String>,
}

impl LocatorArgs {
    pub fn locator(&self) -> Result<WorkItemLocator> {
        let item = self.item.trim();
        if looks_like_global_id(item) {
            return Ok(WorkItemLocator::Id(item.to_string()));
        }
        let iid: u64 = item
            .trim_start_matches('#')
            .parse()
            .with_context(|| format!("{item:?} is neither a global id nor an iid"))?;
        match container_from(self.project.as_deref(), self.group.as_deref())? {
            Some(container) => Ok(WorkItemLocator::Iid { container, iid }),
            None => bail!("iid {iid} needs --project or --group"),
        }
    }
}

/// Widget flags shared by `create` and `update`.
#[derive(Args, Debug, Default)]
pub struct WidgetArgs {
    /// Assign users (global ids), comma separated
    #[arg(long = "assign", value_delimiter = ',')]
    pub assign: Vec<String>,
    /// Unassign users (global ids), comma separated
    #[arg(long = "unassign", value_delimiter = ',')]
    pub unassign: Vec<String>,
    /// Replace all assignees
    #[arg(long = "assignees", value_delimiter = ',', conflicts_with_all = ["assign", "unassign"])]
    pub assignees: Option<Vec<String>>,

    #[arg(long = "add-label", value_delimiter = ',')]
    pub add_labels: Vec<String>,
    #[arg(long = "remove-label", value_delimiter = ',')]
    pub remove_labels: Vec<String>,

    /// Parent work item (global id)
    #[arg(long, conflicts_with = "clear_parent")]
    pub parent: Option<String>,
    #[arg(long)]
    pub clear_parent: bool,
    /// Child work items (global ids), comma separated
    #[arg(long, value_delimiter = ',')]
    pub children: Option<Vec<String>>,

    #[arg(long, conflicts_with = "clear_milestone")]
    pub milestone: Option<String>,
    #[arg(long)]
    pub clear_milestone: bool,

    #[arg(long, conflicts_with = "clear_iteration")]
    pub iteration: Option<String>,
    #[arg(long)]
    pub clear_iteration: bool,

    /// YYYY-MM-DD
    #[arg(long, conflicts_with = "clear_start_date")]
    pub start_date: Option<NaiveDate>,
    #[arg(long)]
    pub clear_start_date: bool,
    /// YYYY-MM-DD
    #[arg(long, conflicts_with = "clear_due_date")]
    pub due_date: Option<NaiveDate>,
    #[arg(long)]
    pub clear_due_date: bool,

    /// Progress in percent (0-100)
    #[arg(long)]
    pub progress: Option<u8>,

    /// on_track, needs_attention or at_risk
    #[arg(long, conflicts_with = "clear_health_status")]
    pub health_status: Option<String>,
    #[arg(long)]
    pub clear_health_status: bool,

    #[arg(long, conflicts_with = "clear_weight")]
    pub weight: Option<u32>,
    #[arg(long)]
    pub clear_weight: bool,
}

impl WidgetArgs {
    pub fn operations(&self) -> Result<Vec<WidgetOperation>> {
        let mut ops = Vec::new();

        if let Some(ids) = &self.assignees {
            ops.push(WidgetOperation::Assignees(AssigneeChange::Replace(ids.clone())));
        }
        if !self.assign.is_empty() {
            ops.push(WidgetOperation::Assignees(AssigneeChange::Add(self.assign.clone())));
        }
        if !self.unassign.is_empty() {
            ops.push(WidgetOperation::Assignees(AssigneeChange::Remove(
                self.unassign.clone(),
            )));
        }
        if !self.add_labels.is_empty() {
            ops.push(WidgetOperation::LabelsAdd(self.add_labels.clone()));
        }
        if !self.remove_labels.is_empty() {
            ops.push(WidgetOperation::LabelsRemove(self.remove_labels.clone()));
        }

        let parent = patch(self.parent.clone(), self.clear_parent);
        if parent.is_some() || self.children.is_some() {
            ops.push(WidgetOperation::Hierarchy {
                parent,
                children: self.children.clone(),
            });
        }
        if let Some(p) = patch(self.milestone.clone(), self.clear_milestone) {
            ops.push(WidgetOperation::Milestone(p));
        }
        if let Some(p) = patch(self.iteration.clone(), self.clear_iteration) {
            ops.push(WidgetOperation::Iteration(p));
        }

        let start = patch(self.start_date, self.clear_start_date);
        let due = patch(self.due_date, self.clear_due_date);
        if start.is_some() || due.is_some() {
            ops.push(WidgetOperation::Dates { start, due });
        }

        if let Some(progress) = self.progress {
            ops.push(WidgetOperation::Progress(progress));
        }
        let health = match &self.health_status {
            Some(raw) => Some(
                HealthStatus::parse(raw)
                    .with_context(|| format!("Unknown health status {raw:?}"))?,
            ),
            None => None,
        };
        if let Some(p) = patch(health, self.clear_health_status) {
            ops.push(WidgetOperation::HealthStatus(p));
        }
        if let Some(p) = patch(self.weight, self.clear_weight) {
            ops.push(WidgetOperation::Weight(p));
        }

        Ok(ops)
    }
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Type name (issue, "key result", ...) or type global id
    #[arg(value_name = "TYPE")]
    pub type_name: String,
    pub title: String,
    #[command(flatten)]
    pub container: ContainerArgs,
    #[arg(short, long)]
    pub description: Option<String>,
    #[arg(long)]
    pub confidential: bool,
    #[command(flatten)]
    pub widgets: WidgetArgs,
}

impl CreateArgs {
    pub fn request(&self) -> Result<CreateRequest> {
        Ok(CreateRequest {
            type_input: self.type_name.clone(),
            container: self.container.container()?,
            base: BaseFields {
                title: self.title.clone(),
                description: self.description.clone(),
                confidential: self.confidential.then_some(true),
            },
            operations: self.widgets.operations()?,
        })
    }
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub target: LocatorArgs,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(short, long)]
    pub description: Option<String>,
    #[arg(long)]
    pub confidential: Option<bool>,
    /// close or reopen
    #[arg(long)]
    pub state: Option<String>,
    #[command(flatten)]
    pub widgets: WidgetArgs,
}

impl UpdateArgs {
    pub fn operations(&self) -> Result<Vec<WidgetOperation>> {
        let mut ops = Vec::new();
        if let Some(title) = &self.title {
            ops.push(WidgetOperation::Title(title.clone()));
        }
        if let Some(description) = &self.description {
            ops.push(WidgetOperation::Description(description.clone()));
        }
        if let Some(confidential) = self.confidential {
            ops.push(WidgetOperation::Confidential(confidential));
        }
        if let Some(state) = &self.state {
            ops.push(WidgetOperation::State(StateEvent::parse(state)?));
        }
        ops.extend(self.widgets.operations()?);
        if ops.is_empty() {
            bail!("Nothing to update. Pass at least one change, e.g. --title or --add-label");
        }
        Ok(ops)
    }
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub container: ContainerArgs,
    /// Only these types, comma separated
    #[arg(long = "type", value_delimiter = ',')]
    pub types: Vec<String>,
    /// opened or closed
    #[arg(long)]
    pub state: Option<String>,
    #[arg(long)]
    pub search: Option<String>,
    /// e.g. CREATED_DESC, UPDATED_ASC
    #[arg(long)]
    pub sort: Option<String>,
    #[arg(long)]
    pub page_size: Option<u32>,
    /// Start after this cursor
    #[arg(long)]
    pub after: Option<String>,
    /// Stop after this many items
    #[arg(long)]
    pub limit: Option<usize>,
}

impl ListArgs {
    pub fn filter(&self) -> Result<ListFilter> {
        let state = match &self.state {
            Some(raw) => Some(
                WorkItemState::parse(raw)
                    .with_context(|| format!("Unknown state {raw:?}; use opened or closed"))?,
            ),
            None => None,
        };
        Ok(ListFilter {
            types: self.types.clone(),
            state,
            search: self.search.clone(),
            sort: self.sort.clone(),
            page_size: self.page_size,
            after: self.after.clone(),
            limit: self.limit,
        })
    }
}

fn container_from(project: Option<&str>, group: Option<&str>) -> Result<Option<ContainerRef>> {
    match (project, group) {
        (Some(_), Some(_)) => bail!("Pass either --project or --group, not both"),
        (Some(path), None) => Ok(Some(ContainerRef::project(path))),
        (None, Some(path)) => Ok(Some(ContainerRef::group(path))),
        (None, None) => Ok(None),
    }
}

fn patch<T>(value: Option<T>, clear: bool) -> Option<Patch<T>> {
    match (value, clear) {
        (Some(v), _) => Some(Patch::Set(v)),
        (None, true) => Some(Patch::Clear),
        (None, false) => None,
    }
}

/// Build the engine for the configured instance.
pub fn build_engine(config: &GitLabConfig) -> Result<WorkItemEngine<GraphqlClient>> {
    let Some(token) = config.token.clone() else {
        bail!("No GitLab token configured. Set GITLAB_PERSONAL_ACCESS_TOKEN or add token to ~/.gitlab-work/config.toml");
    };
    let client = GraphqlClient::new(&config.url, token, config.timeout())
        .context("Failed to set up the GitLab client")?;
    let catalog = Arc::new(TypeCatalog::new(config.discovery_options()));
    let mut engine = WorkItemEngine::new(client, catalog).with_page_size(config.page_size);
    if let Some(timeout) = config.timeout() {
        engine = engine.with_timeout(timeout);
    }
    Ok(engine)
}

#[derive(Serialize)]
struct TypesReport {
    health: CatalogHealth,
    types: Vec<WorkItemType>,
}

/// Run one command and print its result as JSON on stdout.
pub async fn run<T: Transport>(engine: &WorkItemEngine<T>, command: Command) -> Result<()> {
    match command {
        Command::Types { refresh } => {
            let health = if refresh {
                engine.reinitialize().await
            } else {
                engine.initialize().await
            };
            print_json(&TypesReport {
                health,
                types: engine.catalog().types(),
            })
        }
        Command::Create(args) => {
            let outcome = engine.create(args.request()?).await?;
            print_json(&outcome)
        }
        Command::Get(args) => {
            let item = engine.get(&args.locator()?).await?;
            print_json(&item)
        }
        Command::Update(args) => {
            let operations = args.operations()?;
            let outcome = engine.update(&args.target.locator()?, &operations).await?;
            print_json(&outcome)
        }
        Command::Delete { target, yes } => {
            if !yes {
                bail!("Refusing to delete {} without --yes (deletion cannot be undone)", target.item);
            }
            engine.delete(&target.locator()?).await?;
            print_json(&serde_json::json!({ "deleted": target.item }))
        }
        Command::List(args) => {
            let container = args.container.container()?;
            let filter = args.filter()?;
            let items = engine.list(&container, &filter).await?;
            futures::pin_mut!(items);
            while let Some(item) = items.try_next().await? {
                println!("{}", serde_json::to_string(&item)?);
            }
            Ok(())
        }
    }
}

fn print_json<S: Serialize>(value: &S) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
