pub mod widget;
pub mod work_item;
pub mod work_item_type;

pub use widget::{AssigneeChange, HealthStatus, Patch, StateEvent, WidgetKind, WidgetOperation};
pub use work_item::{WorkItem, WorkItemState};
pub use work_item_type::{Scope, TypeName, WorkItemType};

/// Where a new work item goes: a project path or a group (namespace) path.
/// The kind is always stated by the caller, never inferred from the path.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ContainerRef {
    pub kind: Scope,
    pub path: String,
}

impl ContainerRef {
    pub fn project(path: impl Into<String>) -> Self {
        Self {
            kind: Scope::Project,
            path: path.into(),
        }
    }

    pub fn group(path: impl Into<String>) -> Self {
        Self {
            kind: Scope::Group,
            path: path.into(),
        }
    }
}

/// How a caller points at an existing work item. Both forms behave the same
/// once resolved to a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItemLocator {
    Id(String),
    Iid { container: ContainerRef, iid: u64 },
}
