//! Static knowledge of which widgets each work item type carries, which
//! container scope it lives in, and which types it may parent.
//!
//! Nothing here is discovered; the tables reflect the conventional types.

use crate::model::{Scope, TypeName, WidgetKind};

/// Base fields every type accepts.
const BASE: &[WidgetKind] = &[
    WidgetKind::Title,
    WidgetKind::State,
    WidgetKind::Confidential,
    WidgetKind::Description,
];

const EPIC: &[WidgetKind] = &[
    WidgetKind::Assignees,
    WidgetKind::Labels,
    WidgetKind::Hierarchy,
    WidgetKind::StartAndDueDate,
    WidgetKind::HealthStatus,
];

const ISSUE: &[WidgetKind] = &[
    WidgetKind::Assignees,
    WidgetKind::Labels,
    WidgetKind::Hierarchy,
    WidgetKind::Milestone,
    WidgetKind::Iteration,
    WidgetKind::StartAndDueDate,
    WidgetKind::HealthStatus,
    WidgetKind::Weight,
];

const TASK: &[WidgetKind] = &[
    WidgetKind::Assignees,
    WidgetKind::Labels,
    WidgetKind::Hierarchy,
    WidgetKind::Milestone,
    WidgetKind::Iteration,
    WidgetKind::StartAndDueDate,
    WidgetKind::Weight,
];

const INCIDENT: &[WidgetKind] = &[
    WidgetKind::Assignees,
    WidgetKind::Labels,
    WidgetKind::Hierarchy,
    WidgetKind::Milestone,
];

const TEST_CASE: &[WidgetKind] = &[WidgetKind::Labels, WidgetKind::Hierarchy];

const REQUIREMENT: &[WidgetKind] = &[WidgetKind::Labels, WidgetKind::Hierarchy];

const OBJECTIVE: &[WidgetKind] = &[
    WidgetKind::Assignees,
    WidgetKind::Labels,
    WidgetKind::Hierarchy,
    WidgetKind::Milestone,
    WidgetKind::Progress,
    WidgetKind::HealthStatus,
];

const KEY_RESULT: &[WidgetKind] = &[
    WidgetKind::Assignees,
    WidgetKind::Labels,
    WidgetKind::Hierarchy,
    WidgetKind::StartAndDueDate,
    WidgetKind::Progress,
    WidgetKind::HealthStatus,
];

const TICKET: &[WidgetKind] = &[
    WidgetKind::Assignees,
    WidgetKind::Labels,
    WidgetKind::Hierarchy,
    WidgetKind::Milestone,
    WidgetKind::StartAndDueDate,
];

const OTHER: &[WidgetKind] = &[WidgetKind::Assignees, WidgetKind::Labels];

/// Widgets that only work on paid tiers. Using them is allowed; the license
/// tier cannot be checked from here.
const TIER_GATED: &[WidgetKind] = &[
    WidgetKind::Iteration,
    WidgetKind::Progress,
    WidgetKind::HealthStatus,
    WidgetKind::Weight,
];

/// A widget that may be ignored by the backend on lower license tiers.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TierNotice {
    pub type_name: TypeName,
    pub widget: WidgetKind,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WidgetCapabilityModel;

impl WidgetCapabilityModel {
    pub fn new() -> Self {
        Self
    }

    /// Whether `type_name` carries `widget`. Types addressed only by id
    /// (`Unknown`) are not checked locally and accept everything.
    pub fn supports(&self, type_name: &TypeName, widget: WidgetKind) -> bool {
        if BASE.contains(&widget) {
            return true;
        }
        match type_name {
            TypeName::Unknown => true,
            other => widgets_for(other).contains(&widget),
        }
    }

    /// Container scope the type must be created in. `None` for `Unknown`.
    pub fn required_scope(&self, type_name: &TypeName) -> Option<Scope> {
        match type_name {
            TypeName::Epic | TypeName::Objective | TypeName::KeyResult => Some(Scope::Group),
            TypeName::Issue
            | TypeName::Task
            | TypeName::Incident
            | TypeName::TestCase
            | TypeName::Requirement
            | TypeName::Ticket
            | TypeName::Other(_) => Some(Scope::Project),
            TypeName::Unknown => None,
        }
    }

    /// Types that may appear as direct children of `parent`.
    pub fn allowed_children(&self, parent: &TypeName) -> &'static [TypeName] {
        const EPIC_CHILDREN: &[TypeName] = &[
            TypeName::Issue,
            TypeName::Task,
            TypeName::Incident,
            TypeName::Requirement,
            TypeName::TestCase,
            TypeName::Objective,
        ];
        const ISSUE_CHILDREN: &[TypeName] =
            &[TypeName::Task, TypeName::TestCase, TypeName::Requirement];
        const INCIDENT_CHILDREN: &[TypeName] = &[TypeName::Task];
        const REQUIREMENT_CHILDREN: &[TypeName] = &[TypeName::TestCase, TypeName::Task];
        const OBJECTIVE_CHILDREN: &[TypeName] = &[TypeName::KeyResult];
        const TICKET_CHILDREN: &[TypeName] = &[TypeName::Task];

        match parent {
            TypeName::Epic => EPIC_CHILDREN,
            TypeName::Issue => ISSUE_CHILDREN,
            TypeName::Incident => INCIDENT_CHILDREN,
            TypeName::Requirement => REQUIREMENT_CHILDREN,
            TypeName::Objective => OBJECTIVE_CHILDREN,
            TypeName::Ticket => TICKET_CHILDREN,
            _ => &[],
        }
    }

    /// Parent/child compatibility. Unknown or custom types on either side are
    /// left to the backend.
    pub fn can_parent(&self, parent: &TypeName, child: &TypeName) -> bool {
        if is_unchecked(parent) || is_unchecked(child) {
            return true;
        }
        self.allowed_children(parent).contains(child)
    }

    /// Notices for tier-gated widgets in `widgets`, one per widget kind.
    pub fn tier_notices(
        &self,
        type_name: &TypeName,
        widgets: impl IntoIterator<Item = WidgetKind>,
    ) -> Vec<TierNotice> {
        let mut notices: Vec<TierNotice> = Vec::new();
        for widget in widgets {
            if TIER_GATED.contains(&widget) && !notices.iter().any(|n| n.widget == widget) {
                notices.push(TierNotice {
                    type_name: type_name.clone(),
                    widget,
                });
            }
        }
        notices
    }
}

fn widgets_for(type_name: &TypeName) -> &'static [WidgetKind] {
    match type_name {
        TypeName::Epic => EPIC,
        TypeName::Issue => ISSUE,
        TypeName::Task => TASK,
        TypeName::Incident => INCIDENT,
        TypeName::TestCase => TEST_CASE,
        TypeName::Requirement => REQUIREMENT,
        TypeName::Objective => OBJECTIVE,
        TypeName::KeyResult => KEY_RESULT,
        TypeName::Ticket => TICKET,
        TypeName::Other(_) => OTHER,
        TypeName::Unknown => &[],
    }
}

fn is_unchecked(type_name: &TypeName) -> bool {
    matches!(type_name, TypeName::Unknown | TypeName::Other(_))
}
