use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

/// Capability modules a work item type may carry. `Title`, `State` and
/// `Confidential` are base fields but go through the same validation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WidgetKind {
    Title,
    State,
    Confidential,
    Description,
    Assignees,
    Labels,
    Hierarchy,
    Milestone,
    Iteration,
    StartAndDueDate,
    Progress,
    HealthStatus,
    Weight,
}

impl WidgetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WidgetKind::Title => "TITLE",
            WidgetKind::State => "STATE",
            WidgetKind::Confidential => "CONFIDENTIAL",
            WidgetKind::Description => "DESCRIPTION",
            WidgetKind::Assignees => "ASSIGNEES",
            WidgetKind::Labels => "LABELS",
            WidgetKind::Hierarchy => "HIERARCHY",
            WidgetKind::Milestone => "MILESTONE",
            WidgetKind::Iteration => "ITERATION",
            WidgetKind::StartAndDueDate => "START_AND_DUE_DATE",
            WidgetKind::Progress => "PROGRESS",
            WidgetKind::HealthStatus => "HEALTH_STATUS",
            WidgetKind::Weight => "WEIGHT",
        }
    }
}

impl fmt::Display for WidgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change to a clearable association. Absence of the whole value means
/// "not mentioned"; `Clear` means "remove the association".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Patch<T> {
    Set(T),
    Clear,
}

impl<T> Patch<T> {
    pub fn as_set(&self) -> Option<&T> {
        match self {
            Patch::Set(v) => Some(v),
            Patch::Clear => None,
        }
    }
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Patch::Set(v) => v.serialize(serializer),
            Patch::Clear => serializer.serialize_none(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StateEvent {
    Close,
    Reopen,
}

impl StateEvent {
    /// Accepts either the event (`close`, `reopen`) or the target state
    /// (`closed`, `open`, `opened`). Anything else is not a valid transition.
    pub fn parse(requested: &str) -> Result<StateEvent, ValidationError> {
        match requested.trim().to_ascii_uppercase().as_str() {
            "CLOSE" | "CLOSED" => Ok(StateEvent::Close),
            "REOPEN" | "OPEN" | "OPENED" => Ok(StateEvent::Reopen),
            _ => Err(ValidationError::InvalidStateTransition {
                requested: requested.to_string(),
            }),
        }
    }
}

/// Serialized the way the backend's enum spells it (`onTrack`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HealthStatus {
    OnTrack,
    NeedsAttention,
    AtRisk,
}

impl HealthStatus {
    pub fn parse(input: &str) -> Option<HealthStatus> {
        match crate::model::work_item_type::normalize_type_key(input).as_str() {
            "ON_TRACK" | "ONTRACK" => Some(HealthStatus::OnTrack),
            "NEEDS_ATTENTION" | "NEEDSATTENTION" => Some(HealthStatus::NeedsAttention),
            "AT_RISK" | "ATRISK" => Some(HealthStatus::AtRisk),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssigneeChange {
    Add(Vec<String>),
    Remove(Vec<String>),
    Replace(Vec<String>),
}

/// One desired change to a work item, tagged by the widget it touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetOperation {
    Title(String),
    State(StateEvent),
    Confidential(bool),
    Description(String),
    Assignees(AssigneeChange),
    LabelsAdd(Vec<String>),
    LabelsRemove(Vec<String>),
    Hierarchy {
        parent: Option<Patch<String>>,
        children: Option<Vec<String>>,
    },
    Milestone(Patch<String>),
    Iteration(Patch<String>),
    Dates {
        start: Option<Patch<NaiveDate>>,
        due: Option<Patch<NaiveDate>>,
    },
    Progress(u8),
    HealthStatus(Patch<HealthStatus>),
    Weight(Patch<u32>),
}

impl WidgetOperation {
    pub fn kind(&self) -> WidgetKind {
        match self {
            WidgetOperation::Title(_) => WidgetKind::Title,
            WidgetOperation::State(_) => WidgetKind::State,
            WidgetOperation::Confidential(_) => WidgetKind::Confidential,
            WidgetOperation::Description(_) => WidgetKind::Description,
            WidgetOperation::Assignees(_) => WidgetKind::Assignees,
            WidgetOperation::LabelsAdd(_) | WidgetOperation::LabelsRemove(_) => WidgetKind::Labels,
            WidgetOperation::Hierarchy { .. } => WidgetKind::Hierarchy,
            WidgetOperation::Milestone(_) => WidgetKind::Milestone,
            WidgetOperation::Iteration(_) => WidgetKind::Iteration,
            WidgetOperation::Dates { .. } => WidgetKind::StartAndDueDate,
            WidgetOperation::Progress(_) => WidgetKind::Progress,
            WidgetOperation::HealthStatus(_) => WidgetKind::HealthStatus,
            WidgetOperation::Weight(_) => WidgetKind::Weight,
        }
    }
}
