//! Turns a list of widget operations into one backend mutation input.
//!
//! Building is pure: no I/O, and the same request always produces the same
//! payload. Everything that can be checked without the network is checked
//! here, before anything is sent.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;

use crate::capability::{TierNotice, WidgetCapabilityModel};
use crate::error::ValidationError;
use crate::gitlab::queries;
use crate::model::{
    AssigneeChange, ContainerRef, HealthStatus, Patch, Scope, StateEvent, WidgetKind,
    WidgetOperation, WorkItemType,
};

/// Fields every new work item is created with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaseFields {
    pub title: String,
    pub description: Option<String>,
    pub confidential: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildTarget {
    Create {
        container: ContainerRef,
        base: BaseFields,
    },
    /// `current_assignees` is the item's assignee list before this change;
    /// add/remove operations are applied on top of it.
    Update {
        id: String,
        current_assignees: Vec<String>,
    },
}

#[derive(Debug, Clone)]
pub struct BuildRequest<'a> {
    pub work_item_type: &'a WorkItemType,
    pub target: &'a BuildTarget,
    pub operations: &'a [WidgetOperation],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptionInput {
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssigneesInput {
    pub assignee_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelsInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub add_label_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub remove_label_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyInput {
    /// `Clear` is sent as `null`, which detaches the parent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Patch<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneInput {
    pub milestone_id: Patch<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationInput {
    pub iteration_id: Patch<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatesInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<Patch<NaiveDate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Patch<NaiveDate>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressInput {
    pub current_value: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatusInput {
    pub health_status: Patch<HealthStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeightInput {
    pub weight: Patch<u32>,
}

/// The `input` argument of `workItemCreate` / `workItemUpdate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_item_type_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidential: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_event: Option<StateEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_widget: Option<DescriptionInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignees_widget: Option<AssigneesInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels_widget: Option<LabelsInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hierarchy_widget: Option<HierarchyInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone_widget: Option<MilestoneInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration_widget: Option<IterationInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_and_due_date_widget: Option<DatesInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_widget: Option<ProgressInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_status_widget: Option<HealthStatusInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_widget: Option<WeightInput>,
}

/// A validated mutation, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationPayload {
    pub kind: MutationKind,
    pub input: MutationInput,
    /// Tier-gated widgets the backend may ignore.
    pub notices: Vec<TierNotice>,
}

impl MutationPayload {
    pub fn document(&self) -> &'static str {
        match self.kind {
            MutationKind::Create => queries::CREATE_WORK_ITEM,
            MutationKind::Update => queries::UPDATE_WORK_ITEM,
        }
    }

    pub fn variables(&self) -> Value {
        json!({ "input": self.input })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct AssigneeSet {
    replace: Option<Vec<String>>,
    add: Vec<String>,
    remove: Vec<String>,
}

/// Operations of one call merged per widget kind.
///
/// Labels and assignee add/remove lists accumulate; every other kind may be
/// mentioned once per call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WidgetSet {
    kinds: BTreeSet<WidgetKind>,
    title: Option<String>,
    state: Option<StateEvent>,
    confidential: Option<bool>,
    description: Option<String>,
    assignees: Option<AssigneeSet>,
    labels_add: Vec<String>,
    labels_remove: Vec<String>,
    parent: Option<Patch<String>>,
    children: Option<Vec<String>>,
    hierarchy_seen: bool,
    milestone: Option<Patch<String>>,
    iteration: Option<Patch<String>>,
    start: Option<Patch<NaiveDate>>,
    due: Option<Patch<NaiveDate>>,
    dates_seen: bool,
    progress: Option<u8>,
    health_status: Option<Patch<HealthStatus>>,
    weight: Option<Patch<u32>>,
}

impl WidgetSet {
    /// Merge `operations`, rejecting conflicts and out-of-range values.
    /// Independent of the work item type.
    pub fn from_operations(operations: &[WidgetOperation]) -> Result<Self, ValidationError> {
        let mut set = WidgetSet::default();
        for op in operations {
            set.merge(op)?;
        }
        set.check()?;
        Ok(set)
    }

    pub fn kinds(&self) -> &BTreeSet<WidgetKind> {
        &self.kinds
    }

    pub fn state(&self) -> Option<StateEvent> {
        self.state
    }

    pub fn parent(&self) -> Option<&Patch<String>> {
        self.parent.as_ref()
    }

    pub fn children(&self) -> &[String] {
        self.children.as_deref().unwrap_or(&[])
    }

    fn merge(&mut self, op: &WidgetOperation) -> Result<(), ValidationError> {
        let kind = op.kind();
        self.kinds.insert(kind);
        match op {
            WidgetOperation::Title(title) => {
                if title.trim().is_empty() {
                    return Err(invalid(kind, "title must not be empty"));
                }
                set_once(&mut self.title, title.clone(), kind)
            }
            WidgetOperation::State(event) => set_once(&mut self.state, *event, kind),
            WidgetOperation::Confidential(flag) => set_once(&mut self.confidential, *flag, kind),
            WidgetOperation::Description(text) => {
                set_once(&mut self.description, text.clone(), kind)
            }
            WidgetOperation::Assignees(change) => {
                let assignees = self.assignees.get_or_insert_with(AssigneeSet::default);
                match change {
                    AssigneeChange::Replace(ids) => {
                        if assignees.replace.is_some() {
                            return Err(conflict(kind, "assignees replaced more than once"));
                        }
                        let mut list = Vec::new();
                        extend_unique(&mut list, ids);
                        assignees.replace = Some(list);
                    }
                    AssigneeChange::Add(ids) => extend_unique(&mut assignees.add, ids),
                    AssigneeChange::Remove(ids) => extend_unique(&mut assignees.remove, ids),
                }
                Ok(())
            }
            WidgetOperation::LabelsAdd(ids) => {
                extend_unique(&mut self.labels_add, ids);
                Ok(())
            }
            WidgetOperation::LabelsRemove(ids) => {
                extend_unique(&mut self.labels_remove, ids);
                Ok(())
            }
            WidgetOperation::Hierarchy { parent, children } => {
                if self.hierarchy_seen {
                    return Err(conflict(kind, "hierarchy changed more than once"));
                }
                if parent.is_none() && children.is_none() {
                    return Err(invalid(kind, "neither parent nor children given"));
                }
                if let (Some(Patch::Set(parent_id)), Some(ids)) = (parent, children) {
                    if ids.contains(parent_id) {
                        return Err(invalid(
                            kind,
                            format!("{parent_id} cannot be both parent and child"),
                        ));
                    }
                }
                self.hierarchy_seen = true;
                self.parent = parent.clone();
                self.children = children.as_ref().map(|ids| {
                    let mut list = Vec::new();
                    extend_unique(&mut list, ids);
                    list
                });
                Ok(())
            }
            WidgetOperation::Milestone(patch) => set_once(&mut self.milestone, patch.clone(), kind),
            WidgetOperation::Iteration(patch) => set_once(&mut self.iteration, patch.clone(), kind),
            WidgetOperation::Dates { start, due } => {
                if self.dates_seen {
                    return Err(conflict(kind, "dates changed more than once"));
                }
                if start.is_none() && due.is_none() {
                    return Err(invalid(kind, "neither start nor due date given"));
                }
                self.dates_seen = true;
                self.start = start.clone();
                self.due = due.clone();
                Ok(())
            }
            WidgetOperation::Progress(value) => {
                if *value > 100 {
                    return Err(invalid(kind, format!("progress {value} is above 100")));
                }
                set_once(&mut self.progress, *value, kind)
            }
            WidgetOperation::HealthStatus(patch) => {
                set_once(&mut self.health_status, patch.clone(), kind)
            }
            WidgetOperation::Weight(patch) => set_once(&mut self.weight, patch.clone(), kind),
        }
    }

    fn check(&self) -> Result<(), ValidationError> {
        if let Some(id) = self.labels_add.iter().find(|id| self.labels_remove.contains(id)) {
            return Err(conflict(
                WidgetKind::Labels,
                format!("label {id} is both added and removed"),
            ));
        }

        if let Some(assignees) = &self.assignees {
            if assignees.replace.is_some()
                && (!assignees.add.is_empty() || !assignees.remove.is_empty())
            {
                return Err(conflict(
                    WidgetKind::Assignees,
                    "replace cannot be combined with add or remove",
                ));
            }
            if let Some(id) = assignees.add.iter().find(|id| assignees.remove.contains(id)) {
                return Err(conflict(
                    WidgetKind::Assignees,
                    format!("user {id} is both added and removed"),
                ));
            }
        }

        if let (Some(Patch::Set(start)), Some(Patch::Set(due))) = (&self.start, &self.due) {
            if start > due {
                return Err(invalid(
                    WidgetKind::StartAndDueDate,
                    format!("start date {start} is after due date {due}"),
                ));
            }
        }

        Ok(())
    }

    fn assignee_ids(&self, current: &[String]) -> Option<Vec<String>> {
        let assignees = self.assignees.as_ref()?;
        if let Some(replace) = &assignees.replace {
            return Some(replace.clone());
        }
        let mut ids: Vec<String> = Vec::new();
        extend_unique(&mut ids, current);
        extend_unique(&mut ids, &assignees.add);
        ids.retain(|id| !assignees.remove.contains(id));
        Some(ids)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MutationBuilder {
    model: WidgetCapabilityModel,
}

impl MutationBuilder {
    pub fn new(model: WidgetCapabilityModel) -> Self {
        Self { model }
    }

    /// Validate and assemble a mutation. Fails on the first problem found;
    /// nothing partial is ever returned.
    pub fn build(&self, request: &BuildRequest<'_>) -> Result<MutationPayload, ValidationError> {
        let work_item_type = request.work_item_type;
        let type_name = &work_item_type.name;

        let mut operations: Vec<WidgetOperation> = Vec::with_capacity(request.operations.len() + 3);
        if let BuildTarget::Create { container, base } = request.target {
            if let Some(required) = self.model.required_scope(type_name) {
                if required != container.kind {
                    return Err(ValidationError::ScopeMismatch {
                        type_name: type_name.clone(),
                        required,
                        actual: container.kind,
                    });
                }
            }
            operations.push(WidgetOperation::Title(base.title.clone()));
            if let Some(description) = &base.description {
                operations.push(WidgetOperation::Description(description.clone()));
            }
            if let Some(confidential) = base.confidential {
                operations.push(WidgetOperation::Confidential(confidential));
            }
        }
        operations.extend(request.operations.iter().cloned());

        for op in &operations {
            if !self.model.supports(type_name, op.kind()) {
                return Err(ValidationError::UnsupportedWidget {
                    type_name: type_name.clone(),
                    widget: op.kind(),
                });
            }
            if matches!(request.target, BuildTarget::Create { .. }) && is_removal(op) {
                return Err(ValidationError::NotApplicableOnCreate { widget: op.kind() });
            }
        }

        let set = WidgetSet::from_operations(&operations)?;
        let notices = self.model.tier_notices(type_name, set.kinds().iter().copied());

        let (kind, mut input) = match request.target {
            BuildTarget::Create { container, .. } => {
                let mut input = MutationInput {
                    work_item_type_id: Some(work_item_type.global_id.clone()),
                    ..MutationInput::default()
                };
                match container.kind {
                    Scope::Project => input.project_path = Some(container.path.clone()),
                    Scope::Group => input.namespace_path = Some(container.path.clone()),
                }
                input.assignees_widget = set
                    .assignee_ids(&[])
                    .map(|assignee_ids| AssigneesInput { assignee_ids });
                if !set.labels_add.is_empty() {
                    input.labels_widget = Some(LabelsInput {
                        label_ids: Some(set.labels_add.clone()),
                        add_label_ids: Vec::new(),
                        remove_label_ids: Vec::new(),
                    });
                }
                (MutationKind::Create, input)
            }
            BuildTarget::Update {
                id,
                current_assignees,
            } => {
                let mut input = MutationInput {
                    id: Some(id.clone()),
                    ..MutationInput::default()
                };
                input.assignees_widget = set
                    .assignee_ids(current_assignees)
                    .map(|assignee_ids| AssigneesInput { assignee_ids });
                if !set.labels_add.is_empty() || !set.labels_remove.is_empty() {
                    input.labels_widget = Some(LabelsInput {
                        label_ids: None,
                        add_label_ids: set.labels_add.clone(),
                        remove_label_ids: set.labels_remove.clone(),
                    });
                }
                (MutationKind::Update, input)
            }
        };

        input.title = set.title.clone();
        input.confidential = set.confidential;
        input.state_event = set.state;
        input.description_widget = set
            .description
            .clone()
            .map(|description| DescriptionInput { description });
        if set.hierarchy_seen {
            input.hierarchy_widget = Some(HierarchyInput {
                parent_id: set.parent.clone(),
                children_ids: set.children.clone(),
            });
        }
        input.milestone_widget = set
            .milestone
            .clone()
            .map(|milestone_id| MilestoneInput { milestone_id });
        input.iteration_widget = set
            .iteration
            .clone()
            .map(|iteration_id| IterationInput { iteration_id });
        if set.dates_seen {
            input.start_and_due_date_widget = Some(DatesInput {
                start_date: set.start.clone(),
                due_date: set.due.clone(),
            });
        }
        input.progress_widget = set
            .progress
            .map(|current_value| ProgressInput { current_value });
        input.health_status_widget = set
            .health_status
            .clone()
            .map(|health_status| HealthStatusInput { health_status });
        input.weight_widget = set.weight.clone().map(|weight| WeightInput { weight });

        Ok(MutationPayload {
            kind,
            input,
            notices,
        })
    }
}

/// Operations that only make sense against an existing item.
fn is_removal(op: &WidgetOperation) -> bool {
    match op {
        WidgetOperation::State(_)
        | WidgetOperation::LabelsRemove(_)
        | WidgetOperation::Assignees(AssigneeChange::Remove(_)) => true,
        WidgetOperation::Hierarchy { parent, .. } => matches!(parent, Some(Patch::Clear)),
        WidgetOperation::Milestone(patch) | WidgetOperation::Iteration(patch) => {
            matches!(patch, Patch::Clear)
        }
        WidgetOperation::Dates { start, due } => {
            matches!(start, Some(Patch::Clear)) || matches!(due, Some(Patch::Clear))
        }
        WidgetOperation::HealthStatus(patch) => matches!(patch, Patch::Clear),
        WidgetOperation::Weight(patch) => matches!(patch, Patch::Clear),
        _ => false,
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T, widget: WidgetKind) -> Result<(), ValidationError> {
    if slot.is_some() {
        return Err(conflict(widget, "given more than once in one call"));
    }
    *slot = Some(value);
    Ok(())
}

/// Append ids not already present, keeping first-seen order.
fn extend_unique(list: &mut Vec<String>, ids: &[String]) {
    for id in ids {
        let id = id.trim();
        if !id.is_empty() && !list.iter().any(|existing| existing == id) {
            list.push(id.to_string());
        }
    }
}

fn conflict(widget: WidgetKind, detail: impl Into<String>) -> ValidationError {
    ValidationError::ConflictingOperation {
        widget,
        detail: detail.into(),
    }
}

fn invalid(widget: WidgetKind, detail: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        widget,
        detail: detail.into(),
    }
}
