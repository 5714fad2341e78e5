use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::builder::{BaseFields, BuildRequest, BuildTarget, MutationBuilder, WidgetSet};
use crate::capability::{TierNotice, WidgetCapabilityModel};
use crate::catalog::{CatalogHealth, TypeCatalog};
use crate::error::{CatalogError, EngineError, TransportError, ValidationError};
use crate::gitlab::api_types::{
    self, ContainerItemsData, MutationResult, TypeOfData, WorkItemByIdData,
};
use crate::gitlab::{queries, Transport};
use crate::model::{
    ContainerRef, Patch, Scope, TypeName, WidgetKind, WidgetOperation, WorkItem, WorkItemLocator,
    WorkItemState, WorkItemType,
};

#[cfg(test)]
mod tests;

pub const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Debug, Clone)]
pub struct CreateRequest {
    /// Type name in any spelling, or a type global id.
    pub type_input: String,
    pub container: ContainerRef,
    pub base: BaseFields,
    pub operations: Vec<WidgetOperation>,
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub types: Vec<String>,
    pub state: Option<WorkItemState>,
    pub search: Option<String>,
    /// Backend sort key, e.g. `CREATED_DESC`.
    pub sort: Option<String>,
    pub page_size: Option<u32>,
    /// Cursor to start after.
    pub after: Option<String>,
    /// Stop after this many items in total.
    pub limit: Option<usize>,
}

/// Result of a create or update: the item as the backend returned it, plus
/// widgets that lower license tiers may have ignored.
#[derive(Debug, Clone, Serialize)]
pub struct MutationOutcome {
    pub item: WorkItem,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notices: Vec<TierNotice>,
}

/// One page of list results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub items: Vec<WorkItem>,
    pub next_cursor: Option<String>,
}

/// Entry point for work item operations.
///
/// The engine keeps no per-call state. The only shared state is the type
/// catalog, which is read-only once initialized.
pub struct WorkItemEngine<T: Transport> {
    transport: T,
    catalog: Arc<TypeCatalog>,
    model: WidgetCapabilityModel,
    builder: MutationBuilder,
    timeout: Option<Duration>,
    page_size: u32,
}

impl<T: Transport> WorkItemEngine<T> {
    pub fn new(transport: T, catalog: Arc<TypeCatalog>) -> Self {
        let model = WidgetCapabilityModel::new();
        Self {
            transport,
            catalog,
            model,
            builder: MutationBuilder::new(model),
            timeout: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Fail any single backend call that takes longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    pub async fn initialize(&self) -> CatalogHealth {
        self.catalog.initialize(&self.transport).await
    }

    pub async fn reinitialize(&self) -> CatalogHealth {
        self.catalog.reinitialize(&self.transport).await
    }

    pub async fn create(&self, request: CreateRequest) -> Result<MutationOutcome, EngineError> {
        self.initialize().await;
        let work_item_type = self.catalog.resolve(&request.type_input)?;
        let target = BuildTarget::Create {
            container: request.container.clone(),
            base: request.base,
        };
        let payload = self.builder.build(&BuildRequest {
            work_item_type: &work_item_type,
            target: &target,
            operations: &request.operations,
        })?;

        let set = WidgetSet::from_operations(&request.operations)?;
        self.check_hierarchy(None, &work_item_type.name, &set).await?;

        log_notices(&payload.notices);
        let data = self.call(payload.document(), payload.variables()).await?;
        let item = mutated_item(data, "workItemCreate")?;
        info!(
            iid = item.iid,
            work_item_type = %item.work_item_type.name,
            container = %request.container.path,
            "created work item"
        );
        Ok(MutationOutcome {
            item,
            notices: payload.notices,
        })
    }

    pub async fn get(&self, locator: &WorkItemLocator) -> Result<WorkItem, EngineError> {
        match locator {
            WorkItemLocator::Id(id) => {
                let data = self
                    .call(queries::WORK_ITEM_BY_ID, json!({ "id": id }))
                    .await?;
                let parsed: WorkItemByIdData = decode(data)?;
                parsed
                    .work_item
                    .map(|w| w.into_work_item())
                    .ok_or_else(|| EngineError::NotFound {
                        what: format!("work item {id}"),
                    })
            }
            WorkItemLocator::Iid { container, iid } => {
                let document = match container.kind {
                    Scope::Project => queries::PROJECT_WORK_ITEM_BY_IID,
                    Scope::Group => queries::GROUP_WORK_ITEM_BY_IID,
                };
                let data = self
                    .call(
                        document,
                        json!({ "fullPath": container.path, "iid": iid.to_string() }),
                    )
                    .await?;
                let parsed: ContainerItemsData = decode(data)?;
                let container_items = parsed.container.ok_or_else(|| EngineError::NotFound {
                    what: format!("{} {}", container.kind.to_string().to_lowercase(), container.path),
                })?;
                container_items
                    .work_items
                    .nodes
                    .into_iter()
                    .next()
                    .map(|w| w.into_work_item())
                    .ok_or_else(|| EngineError::NotFound {
                        what: format!("work item #{iid} in {}", container.path),
                    })
            }
        }
    }

    /// Apply `operations` to an existing item in one mutation.
    ///
    /// Conflicts and bad values are rejected before the item is read. The
    /// item's own type decides which widgets are allowed.
    pub async fn update(
        &self,
        locator: &WorkItemLocator,
        operations: &[WidgetOperation],
    ) -> Result<MutationOutcome, EngineError> {
        let set = WidgetSet::from_operations(operations)?;

        let current = self.get(locator).await?;
        let work_item_type = WorkItemType {
            name: current.work_item_type.name.clone(),
            global_id: current.work_item_type.id.clone().unwrap_or_default(),
            icon_name: None,
            scope: self.model.required_scope(&current.work_item_type.name),
        };
        let target = BuildTarget::Update {
            id: current.id.clone(),
            current_assignees: current.assignee_ids(),
        };
        let payload = self.builder.build(&BuildRequest {
            work_item_type: &work_item_type,
            target: &target,
            operations,
        })?;

        self.check_hierarchy(Some(current.id.as_str()), &work_item_type.name, &set)
            .await?;

        if let Some(event) = set.state() {
            debug!(iid = current.iid, state = ?current.state, ?event, "state change requested");
        }

        log_notices(&payload.notices);
        let data = self.call(payload.document(), payload.variables()).await?;
        let item = mutated_item(data, "workItemUpdate")?;
        info!(iid = item.iid, widgets = set.kinds().len(), "updated work item");
        Ok(MutationOutcome {
            item,
            notices: payload.notices,
        })
    }

    /// Permanently delete a work item. There is no undo.
    pub async fn delete(&self, locator: &WorkItemLocator) -> Result<(), EngineError> {
        let id = match locator {
            WorkItemLocator::Id(id) => id.clone(),
            WorkItemLocator::Iid { .. } => self.get(locator).await?.id,
        };
        let data = self
            .call(queries::DELETE_WORK_ITEM, json!({ "input": { "id": id } }))
            .await?;
        mutation_result(data, "workItemDelete")?;
        info!(id = %id, "deleted work item");
        Ok(())
    }

    /// Fetch one page starting after `after`, for callers that keep their own cursor.
    pub async fn list_page(
        &self,
        container: &ContainerRef,
        filter: &ListFilter,
        after: Option<String>,
    ) -> Result<Page, EngineError> {
        let types = self.filter_types(&filter.types).await?;
        self.fetch_page(container, filter, &types, after).await
    }

    /// Lazily page through the items of a container.
    ///
    /// One page is requested each time the buffered items run out, and the
    /// stream ends when the backend reports no further pages or `limit` is
    /// reached. Calling `list` again starts over from `filter.after`.
    pub async fn list<'a>(
        &'a self,
        container: &'a ContainerRef,
        filter: &'a ListFilter,
    ) -> Result<impl Stream<Item = Result<WorkItem, EngineError>> + 'a, EngineError> {
        let types = self.filter_types(&filter.types).await?;

        let pages = stream::try_unfold(
            (Some(filter.after.clone()), types),
            move |(cursor, types)| async move {
                let Some(after) = cursor else {
                    return Ok::<_, EngineError>(None);
                };
                let page = self.fetch_page(container, filter, &types, after).await?;
                let next = page.next_cursor.map(Some);
                Ok(Some((page.items, (next, types))))
            },
        );

        let items = pages
            .map_ok(|items| stream::iter(items.into_iter().map(Ok::<_, EngineError>)))
            .try_flatten()
            .take(filter.limit.unwrap_or(usize::MAX));
        Ok(items)
    }

    async fn fetch_page(
        &self,
        container: &ContainerRef,
        filter: &ListFilter,
        types: &[String],
        after: Option<String>,
    ) -> Result<Page, EngineError> {
        let document = match container.kind {
            Scope::Project => queries::LIST_PROJECT_WORK_ITEMS,
            Scope::Group => queries::LIST_GROUP_WORK_ITEMS,
        };
        let mut first = filter.page_size.unwrap_or(self.page_size).max(1);
        if let Some(limit) = filter.limit {
            first = first.min(u32::try_from(limit.max(1)).unwrap_or(u32::MAX));
        }

        let variables = json!({
            "fullPath": container.path,
            "types": (!types.is_empty()).then_some(types),
            "state": filter.state.map(|s| s.as_filter()),
            "search": filter.search,
            "sort": filter.sort,
            "first": first,
            "after": after,
        });
        let data = self.call(document, variables).await?;
        let parsed: ContainerItemsData = decode(data)?;
        let connection = parsed
            .container
            .ok_or_else(|| EngineError::NotFound {
                what: format!("{} {}", container.kind.to_string().to_lowercase(), container.path),
            })?
            .work_items;

        let next_cursor = connection
            .page_info
            .filter(|p| p.has_next_page)
            .and_then(|p| p.end_cursor);
        debug!(
            count = connection.nodes.len(),
            more = next_cursor.is_some(),
            "fetched work item page"
        );
        Ok(Page {
            items: connection
                .nodes
                .into_iter()
                .map(|w| w.into_work_item())
                .collect(),
            next_cursor,
        })
    }

    /// Canonical type keys for a list filter. Ids are mapped back to names
    /// through the catalog since the list query filters by name.
    async fn filter_types(&self, inputs: &[String]) -> Result<Vec<String>, CatalogError> {
        if !inputs.is_empty() {
            self.initialize().await;
        }
        let mut keys: Vec<String> = Vec::new();
        for input in inputs {
            let resolved = self.catalog.resolve(input)?;
            let name = match resolved.name {
                TypeName::Unknown => self.catalog.name_of(&resolved.global_id).ok_or_else(|| {
                    CatalogError::UnknownType {
                        input: input.clone(),
                    }
                })?,
                name => name,
            };
            let key = name.as_key().to_string();
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    /// Verify parent/child type compatibility with read-only lookups.
    async fn check_hierarchy(
        &self,
        item_id: Option<&str>,
        item_type: &TypeName,
        set: &WidgetSet,
    ) -> Result<(), EngineError> {
        if let Some(Patch::Set(parent_id)) = set.parent() {
            if item_id == Some(parent_id.as_str()) {
                return Err(self_reference("parent"));
            }
            let parent_type = self.type_of(parent_id).await?;
            if !self.model.can_parent(&parent_type, item_type) {
                return Err(ValidationError::HierarchyViolation {
                    parent: parent_type,
                    child: item_type.clone(),
                }
                .into());
            }
        }

        for child_id in set.children() {
            if item_id == Some(child_id.as_str()) {
                return Err(self_reference("child"));
            }
            let child_type = self.type_of(child_id).await?;
            if !self.model.can_parent(item_type, &child_type) {
                return Err(ValidationError::HierarchyViolation {
                    parent: item_type.clone(),
                    child: child_type,
                }
                .into());
            }
        }
        Ok(())
    }

    async fn type_of(&self, id: &str) -> Result<TypeName, EngineError> {
        let data = self
            .call(queries::WORK_ITEM_TYPE_OF, json!({ "id": id }))
            .await?;
        let parsed: TypeOfData = decode(data)?;
        parsed
            .work_item
            .map(|w| TypeName::parse(&w.work_item_type.name))
            .ok_or_else(|| EngineError::NotFound {
                what: format!("work item {id}"),
            })
    }

    async fn call(&self, document: &str, variables: Value) -> Result<Value, EngineError> {
        let operation = queries::operation_name(document);
        debug!(operation, "dispatching");
        let request = self.transport.execute(document, variables);
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .map_err(|_| EngineError::Timeout)?,
            None => request.await,
        };
        match result {
            Ok(data) => Ok(data),
            // Top-level GraphQL errors on a mutation mean the backend refused it.
            Err(TransportError::Http { status: 200, messages }) if queries::is_mutation(document) => {
                Err(EngineError::BackendRejected { messages })
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn log_notices(notices: &[TierNotice]) {
    for notice in notices {
        warn!(
            type_name = %notice.type_name,
            widget = %notice.widget,
            "widget requires a paid tier; backend may ignore it"
        );
    }
}

fn self_reference(role: &str) -> EngineError {
    ValidationError::InvalidValue {
        widget: WidgetKind::Hierarchy,
        detail: format!("a work item cannot be its own {role}"),
    }
    .into()
}

fn decode<D: serde::de::DeserializeOwned>(value: Value) -> Result<D, EngineError> {
    api_types::decode(value).map_err(|e| EngineError::UnexpectedResponse(e.to_string()))
}

fn mutation_result(mut data: Value, field: &str) -> Result<MutationResult, EngineError> {
    let payload = data
        .get_mut(field)
        .map(Value::take)
        .filter(|v| !v.is_null())
        .ok_or_else(|| EngineError::UnexpectedResponse(format!("missing {field} in response")))?;
    let result: MutationResult = decode(payload)?;
    if !result.errors.is_empty() {
        return Err(EngineError::BackendRejected {
            messages: result.errors,
        });
    }
    Ok(result)
}

fn mutated_item(data: Value, field: &str) -> Result<WorkItem, EngineError> {
    mutation_result(data, field)?
        .work_item
        .map(|w| w.into_work_item())
        .ok_or_else(|| EngineError::UnexpectedResponse(format!("{field} returned no work item")))
}
