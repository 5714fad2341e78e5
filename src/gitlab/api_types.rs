//! Serde types matching GraphQL responses.
//!
//! Kept apart from the domain model so the wire shape can change without
//! touching what callers see.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::model::work_item::{
    ContainerInfo, ItemRef, LabelRef, TimeboxRef, TypeRef, UserRef, WidgetPayload,
};
use crate::model::{HealthStatus, Scope, TypeName, WidgetKind, WorkItem, WorkItemState};

/// Decode a `data` object (or part of it) into a typed response.
pub fn decode<T: DeserializeOwned>(value: Value) -> serde_json::Result<T> {
    serde_json::from_value(value)
}

#[derive(Debug, Deserialize)]
pub struct Connection<T> {
    #[serde(default = "Vec::new")]
    pub nodes: Vec<T>,
    #[serde(rename = "pageInfo")]
    pub page_info: Option<PageInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(default)]
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

// ============================================================================
// Type discovery
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirstProjectData {
    pub current_user: Option<CurrentUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub project_memberships: Connection<Membership>,
}

#[derive(Debug, Deserialize)]
pub struct Membership {
    pub project: Option<FullPath>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullPath {
    pub full_path: String,
}

#[derive(Debug, Deserialize)]
pub struct ProjectTypesData {
    pub project: Option<ProjectTypes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTypes {
    pub work_item_types: Connection<ApiTypeNode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTypeNode {
    pub id: String,
    pub name: String,
    pub icon_name: Option<String>,
}

// ============================================================================
// Work items
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemByIdData {
    pub work_item: Option<ApiWorkItem>,
}

#[derive(Debug, Deserialize)]
pub struct ContainerItemsData {
    pub container: Option<ContainerItems>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerItems {
    pub work_items: Connection<ApiWorkItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeOfData {
    pub work_item: Option<TypeOfItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeOfItem {
    pub id: String,
    pub work_item_type: ApiType,
}

/// Payload of `workItemCreate` / `workItemUpdate` / `workItemDelete`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationResult {
    #[serde(default)]
    pub errors: Vec<String>,
    pub work_item: Option<ApiWorkItem>,
}

#[derive(Debug, Deserialize)]
pub struct ApiType {
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiUser {
    pub id: String,
    pub name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiContainer {
    pub name: Option<String>,
    pub full_path: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiLabel {
    pub id: String,
    pub title: String,
    pub color: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiItemRef {
    pub id: String,
    #[serde(default, deserialize_with = "de_opt_iid")]
    pub iid: Option<u64>,
    pub title: Option<String>,
    pub work_item_type: Option<ApiType>,
}

#[derive(Debug, Deserialize)]
pub struct ApiTimebox {
    pub id: String,
    pub title: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiWidget {
    Description {
        description: Option<String>,
    },
    Assignees {
        assignees: Option<Connection<ApiUser>>,
    },
    Labels {
        labels: Option<Connection<ApiLabel>>,
    },
    Hierarchy {
        parent: Option<ApiItemRef>,
        children: Option<Connection<ApiItemRef>>,
    },
    Milestone {
        milestone: Option<ApiTimebox>,
    },
    Iteration {
        iteration: Option<ApiTimebox>,
    },
    StartAndDueDate {
        #[serde(rename = "startDate")]
        start_date: Option<NaiveDate>,
        #[serde(rename = "dueDate")]
        due_date: Option<NaiveDate>,
    },
    Progress {
        progress: Option<i64>,
    },
    HealthStatus {
        #[serde(rename = "healthStatus")]
        health_status: Option<HealthStatus>,
    },
    Weight {
        weight: Option<u32>,
    },
    #[serde(other)]
    Unrecognized,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiWorkItem {
    pub id: String,
    #[serde(deserialize_with = "de_iid")]
    pub iid: u64,
    pub title: String,
    pub state: WorkItemState,
    #[serde(default)]
    pub confidential: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub web_url: Option<String>,
    pub reference: Option<String>,
    pub author: Option<ApiUser>,
    pub project: Option<ApiContainer>,
    pub namespace: Option<ApiContainer>,
    pub work_item_type: ApiType,
    #[serde(default)]
    pub widgets: Vec<ApiWidget>,
}

/// The backend sends iids as strings; accept numbers too.
fn de_iid<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom("iid is not a positive integer")),
        Value::String(s) => s.parse().map_err(serde::de::Error::custom),
        other => Err(serde::de::Error::custom(format!("unexpected iid: {other}"))),
    }
}

fn de_opt_iid<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_u64()),
        Value::String(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
        other => Err(serde::de::Error::custom(format!("unexpected iid: {other}"))),
    }
}

impl From<ApiUser> for UserRef {
    fn from(u: ApiUser) -> Self {
        UserRef {
            id: u.id,
            username: u.username,
            name: u.name,
        }
    }
}

impl From<ApiItemRef> for ItemRef {
    fn from(r: ApiItemRef) -> Self {
        ItemRef {
            id: r.id,
            iid: r.iid,
            title: r.title,
            type_name: r.work_item_type.map(|t| TypeName::parse(&t.name)),
        }
    }
}

impl From<ApiTimebox> for TimeboxRef {
    fn from(t: ApiTimebox) -> Self {
        TimeboxRef {
            id: t.id,
            title: t.title,
            state: t.state,
        }
    }
}

impl ApiWidget {
    /// Converts to a domain payload. Widgets with nothing set yield `None`.
    fn into_payload(self) -> Option<(WidgetKind, WidgetPayload)> {
        match self {
            ApiWidget::Description { description } => description
                .filter(|d| !d.is_empty())
                .map(|description| (WidgetKind::Description, WidgetPayload::Description { description })),
            ApiWidget::Assignees { assignees } => {
                let assignees: Vec<UserRef> = assignees
                    .map(|c| c.nodes.into_iter().map(UserRef::from).collect())
                    .unwrap_or_default();
                (!assignees.is_empty())
                    .then_some((WidgetKind::Assignees, WidgetPayload::Assignees { assignees }))
            }
            ApiWidget::Labels { labels } => {
                let labels: Vec<LabelRef> = labels
                    .map(|c| {
                        c.nodes
                            .into_iter()
                            .map(|l| LabelRef {
                                id: l.id,
                                title: l.title,
                                color: l.color,
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                (!labels.is_empty()).then_some((WidgetKind::Labels, WidgetPayload::Labels { labels }))
            }
            ApiWidget::Hierarchy { parent, children } => {
                let parent = parent.map(ItemRef::from);
                let children: Vec<ItemRef> = children
                    .map(|c| c.nodes.into_iter().map(ItemRef::from).collect())
                    .unwrap_or_default();
                (parent.is_some() || !children.is_empty())
                    .then_some((WidgetKind::Hierarchy, WidgetPayload::Hierarchy { parent, children }))
            }
            ApiWidget::Milestone { milestone } => milestone.map(|m| {
                (
                    WidgetKind::Milestone,
                    WidgetPayload::Milestone { milestone: m.into() },
                )
            }),
            ApiWidget::Iteration { iteration } => iteration.map(|i| {
                (
                    WidgetKind::Iteration,
                    WidgetPayload::Iteration { iteration: i.into() },
                )
            }),
            ApiWidget::StartAndDueDate { start_date, due_date } => {
                (start_date.is_some() || due_date.is_some()).then_some((
                    WidgetKind::StartAndDueDate,
                    WidgetPayload::StartAndDueDate { start_date, due_date },
                ))
            }
            ApiWidget::Progress { progress } => {
                progress.map(|progress| (WidgetKind::Progress, WidgetPayload::Progress { progress }))
            }
            ApiWidget::HealthStatus { health_status } => health_status.map(|health_status| {
                (
                    WidgetKind::HealthStatus,
                    WidgetPayload::HealthStatus { health_status },
                )
            }),
            ApiWidget::Weight { weight } => {
                weight.map(|weight| (WidgetKind::Weight, WidgetPayload::Weight { weight }))
            }
            ApiWidget::Unrecognized => None,
        }
    }
}

impl ApiWorkItem {
    pub fn into_work_item(self) -> WorkItem {
        let container = match (self.project, self.namespace) {
            (Some(p), _) => Some(ContainerInfo {
                scope: Scope::Project,
                full_path: p.full_path,
                name: p.name,
            }),
            (None, Some(n)) => Some(ContainerInfo {
                scope: Scope::Group,
                full_path: n.full_path,
                name: n.name,
            }),
            (None, None) => None,
        };

        let widgets: BTreeMap<WidgetKind, WidgetPayload> = self
            .widgets
            .into_iter()
            .filter_map(ApiWidget::into_payload)
            .collect();

        WorkItem {
            iid: self.iid,
            title: self.title,
            id: self.id,
            state: self.state,
            work_item_type: TypeRef {
                id: self.work_item_type.id,
                name: TypeName::parse(&self.work_item_type.name),
            },
            confidential: self.confidential,
            container,
            author: self.author.map(UserRef::from),
            created_at: self.created_at,
            updated_at: self.updated_at,
            closed_at: self.closed_at,
            web_url: self.web_url,
            reference: self.reference,
            widgets,
        }
    }
}
