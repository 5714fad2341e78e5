//! Session-scoped table of work item types.
//!
//! The table is discovered once from the backend and is read-only afterwards.
//! If discovery is unavailable the catalog falls back to the conventional
//! type ids and records why in its health.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

use crate::capability::WidgetCapabilityModel;
use crate::error::{CatalogError, DiscoveryError};
use crate::gitlab::api_types::{self, ApiTypeNode, FirstProjectData, ProjectTypesData};
use crate::gitlab::{queries, Transport};
use crate::model::work_item_type::{looks_like_global_id, normalize_type_key};
use crate::model::{TypeName, WorkItemType};

/// Ids used when the instance cannot be asked.
pub const FALLBACK_TYPES: [(TypeName, &str); 9] = [
    (TypeName::Epic, "gid://gitlab/WorkItems::Type/1"),
    (TypeName::Issue, "gid://gitlab/WorkItems::Type/2"),
    (TypeName::Incident, "gid://gitlab/WorkItems::Type/3"),
    (TypeName::Task, "gid://gitlab/WorkItems::Type/4"),
    (TypeName::TestCase, "gid://gitlab/WorkItems::Type/5"),
    (TypeName::Requirement, "gid://gitlab/WorkItems::Type/6"),
    (TypeName::Objective, "gid://gitlab/WorkItems::Type/7"),
    (TypeName::KeyResult, "gid://gitlab/WorkItems::Type/8"),
    (TypeName::Ticket, "gid://gitlab/WorkItems::Type/9"),
];

#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub enabled: bool,
    /// Project to read types from; the first accessible project is used if unset.
    pub project_path: Option<String>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            project_path: None,
        }
    }
}

impl DiscoveryOptions {
    /// Skip discovery and use the built-in type ids.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            project_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CatalogHealth {
    Uninitialized,
    Discovered { source: String, type_count: usize },
    Fallback { reason: String },
}

impl CatalogHealth {
    pub fn is_fallback(&self) -> bool {
        matches!(self, CatalogHealth::Fallback { .. })
    }
}

#[derive(Debug)]
struct TypeTable {
    by_key: HashMap<String, WorkItemType>,
    health: CatalogHealth,
}

pub struct TypeCatalog {
    options: DiscoveryOptions,
    model: WidgetCapabilityModel,
    table: RwLock<Option<Arc<TypeTable>>>,
    /// Single-flight guard for discovery. `resolve` never touches it.
    in_flight: tokio::sync::Mutex<()>,
    generation: AtomicU64,
}

impl TypeCatalog {
    pub fn new(options: DiscoveryOptions) -> Self {
        Self {
            options,
            model: WidgetCapabilityModel::new(),
            table: RwLock::new(None),
            in_flight: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Populate the table if it is empty. Concurrent callers share one
    /// discovery request. Discovery failures degrade to the fallback table,
    /// so this always leaves the catalog usable.
    pub async fn initialize<T: Transport + ?Sized>(&self, transport: &T) -> CatalogHealth {
        self.load(transport, false).await
    }

    /// Discard the current table and discover again. Only on explicit request.
    pub async fn reinitialize<T: Transport + ?Sized>(&self, transport: &T) -> CatalogHealth {
        self.load(transport, true).await
    }

    async fn load<T: Transport + ?Sized>(&self, transport: &T, force: bool) -> CatalogHealth {
        let seen = self.generation.load(Ordering::Acquire);
        if !force {
            if let Some(table) = self.current() {
                return table.health.clone();
            }
        }

        let _flight = self.in_flight.lock().await;
        if self.generation.load(Ordering::Acquire) != seen {
            if let Some(table) = self.current() {
                debug!("reusing type table loaded by a concurrent initializer");
                return table.health.clone();
            }
        }

        let table = Arc::new(self.discover(transport).await);
        let health = table.health.clone();
        *self.table.write().unwrap_or_else(PoisonError::into_inner) = Some(table);
        self.generation.fetch_add(1, Ordering::AcqRel);
        health
    }

    fn current(&self) -> Option<Arc<TypeTable>> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.current().is_some()
    }

    pub fn health(&self) -> CatalogHealth {
        self.current()
            .map(|t| t.health.clone())
            .unwrap_or(CatalogHealth::Uninitialized)
    }

    /// Resolve a type name (any casing or separator) or pass a global id through.
    ///
    /// A global id is returned as-is with an `UNKNOWN` name and no scope,
    /// without consulting the table.
    pub fn resolve(&self, input: &str) -> Result<WorkItemType, CatalogError> {
        let input = input.trim();
        if looks_like_global_id(input) {
            return Ok(WorkItemType {
                name: TypeName::Unknown,
                global_id: input.to_string(),
                icon_name: None,
                scope: None,
            });
        }

        let table = self.current().ok_or(CatalogError::NotInitialized)?;
        table
            .by_key
            .get(&normalize_type_key(input))
            .cloned()
            .ok_or_else(|| CatalogError::UnknownType {
                input: input.to_string(),
            })
    }

    /// Name of the type with `global_id`, if it is in the table.
    pub fn name_of(&self, global_id: &str) -> Option<TypeName> {
        self.current()?
            .by_key
            .values()
            .find(|t| t.global_id == global_id)
            .map(|t| t.name.clone())
    }

    /// All types in the table, ordered by name.
    pub fn types(&self) -> Vec<WorkItemType> {
        let mut types: Vec<WorkItemType> = self
            .current()
            .map(|t| t.by_key.values().cloned().collect())
            .unwrap_or_default();
        types.sort_by(|a, b| a.name.cmp(&b.name));
        types
    }

    async fn discover<T: Transport + ?Sized>(&self, transport: &T) -> TypeTable {
        match self.try_discover(transport).await {
            Ok((source, nodes)) => {
                let table = self.table_from_nodes(&source, nodes);
                info!(
                    project = %source,
                    count = table.by_key.len(),
                    "discovered work item types"
                );
                table
            }
            Err(err) => {
                warn!(error = %err, "work item type discovery failed; using fallback types");
                self.fallback_table(err)
            }
        }
    }

    async fn try_discover<T: Transport + ?Sized>(
        &self,
        transport: &T,
    ) -> Result<(String, Vec<ApiTypeNode>), DiscoveryError> {
        if !self.options.enabled {
            return Err(DiscoveryError::Disabled);
        }

        let project = match &self.options.project_path {
            Some(path) => path.clone(),
            None => first_accessible_project(transport).await?,
        };

        let data = transport
            .execute(
                queries::PROJECT_WORK_ITEM_TYPES,
                serde_json::json!({ "projectPath": project }),
            )
            .await?;
        let parsed: ProjectTypesData =
            api_types::decode(data).map_err(|e| DiscoveryError::Schema(e.to_string()))?;
        let nodes = parsed
            .project
            .map(|p| p.work_item_types.nodes)
            .unwrap_or_default();
        if nodes.is_empty() {
            return Err(DiscoveryError::Empty(project));
        }
        Ok((project, nodes))
    }

    fn table_from_nodes(&self, source: &str, nodes: Vec<ApiTypeNode>) -> TypeTable {
        let mut by_key: HashMap<String, WorkItemType> = HashMap::new();
        for node in nodes {
            let name = TypeName::parse(&node.name);
            let key = name.as_key().to_string();
            if by_key.contains_key(&key) {
                warn!(name = %node.name, id = %node.id, "duplicate work item type ignored");
                continue;
            }
            let scope = self.model.required_scope(&name);
            by_key.insert(
                key,
                WorkItemType {
                    name,
                    global_id: node.id,
                    icon_name: node.icon_name,
                    scope,
                },
            );
        }
        let type_count = by_key.len();
        TypeTable {
            by_key,
            health: CatalogHealth::Discovered {
                source: source.to_string(),
                type_count,
            },
        }
    }

    fn fallback_table(&self, reason: DiscoveryError) -> TypeTable {
        let by_key = FALLBACK_TYPES
            .iter()
            .map(|(name, id)| {
                (
                    name.as_key().to_string(),
                    WorkItemType {
                        name: name.clone(),
                        global_id: (*id).to_string(),
                        icon_name: None,
                        scope: self.model.required_scope(name),
                    },
                )
            })
            .collect();
        TypeTable {
            by_key,
            health: CatalogHealth::Fallback {
                reason: reason.to_string(),
            },
        }
    }
}

async fn first_accessible_project<T: Transport + ?Sized>(
    transport: &T,
) -> Result<String, DiscoveryError> {
    let data = transport
        .execute(queries::FIRST_ACCESSIBLE_PROJECT, serde_json::json!({}))
        .await?;
    let parsed: FirstProjectData =
        api_types::decode(data).map_err(|e| DiscoveryError::Schema(e.to_string()))?;
    let path = parsed
        .current_user
        .and_then(|u| u.project_memberships.nodes.into_iter().next())
        .and_then(|m| m.project)
        .map(|p| p.full_path)
        .ok_or(DiscoveryError::NoProject)?;
    debug!(project = %path, "using first accessible project for type discovery");
    Ok(path)
}
