use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::widget::{HealthStatus, WidgetKind};
use super::work_item_type::{Scope, TypeName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkItemState {
    Open,
    Closed,
}

impl WorkItemState {
    /// Queries filter with `opened`/`closed` while responses carry `OPEN`/`CLOSED`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            WorkItemState::Open => "opened",
            WorkItemState::Closed => "closed",
        }
    }

    pub fn parse(input: &str) -> Option<WorkItemState> {
        match input.trim().to_ascii_uppercase().as_str() {
            "OPEN" | "OPENED" => Some(WorkItemState::Open),
            "CLOSED" | "CLOSE" => Some(WorkItemState::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeRef {
    pub id: Option<String>,
    pub name: TypeName,
}

/// The project or group that holds a work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInfo {
    pub scope: Scope,
    pub full_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelRef {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRef {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iid: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_name: Option<TypeName>,
}

/// Milestones and iterations share the same summary shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeboxRef {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WidgetPayload {
    Description {
        description: String,
    },
    Assignees {
        assignees: Vec<UserRef>,
    },
    Labels {
        labels: Vec<LabelRef>,
    },
    Hierarchy {
        parent: Option<ItemRef>,
        children: Vec<ItemRef>,
    },
    Milestone {
        milestone: TimeboxRef,
    },
    Iteration {
        iteration: TimeboxRef,
    },
    StartAndDueDate {
        start_date: Option<NaiveDate>,
        due_date: Option<NaiveDate>,
    },
    Progress {
        progress: i64,
    },
    HealthStatus {
        health_status: HealthStatus,
    },
    Weight {
        weight: u32,
    },
}

/// Immutable snapshot of a work item as returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub iid: u64,
    pub title: String,
    pub id: String,
    pub state: WorkItemState,
    pub work_item_type: TypeRef,
    pub confidential: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<UserRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Only widgets populated on this item are present.
    #[serde(default)]
    pub widgets: BTreeMap<WidgetKind, WidgetPayload>,
}

impl WorkItem {
    pub fn widget(&self, kind: WidgetKind) -> Option<&WidgetPayload> {
        self.widgets.get(&kind)
    }

    pub fn assignee_ids(&self) -> Vec<String> {
        match self.widget(WidgetKind::Assignees) {
            Some(WidgetPayload::Assignees { assignees }) => {
                assignees.iter().map(|u| u.id.clone()).collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn label_ids(&self) -> Vec<String> {
        match self.widget(WidgetKind::Labels) {
            Some(WidgetPayload::Labels { labels }) => labels.iter().map(|l| l.id.clone()).collect(),
            _ => Vec::new(),
        }
    }

    pub fn parent(&self) -> Option<&ItemRef> {
        match self.widget(WidgetKind::Hierarchy) {
            Some(WidgetPayload::Hierarchy { parent, .. }) => parent.as_ref(),
            _ => None,
        }
    }

    pub fn children(&self) -> &[ItemRef] {
        match self.widget(WidgetKind::Hierarchy) {
            Some(WidgetPayload::Hierarchy { children, .. }) => children,
            _ => &[],
        }
    }
}
