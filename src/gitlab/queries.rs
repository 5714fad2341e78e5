//! GraphQL documents sent to the backend.

macro_rules! work_item_fields {
    () => {
        r#"
      id
      iid
      title
      state
      confidential
      createdAt
      updatedAt
      closedAt
      webUrl
      reference
      author { id name username }
      project { id name fullPath }
      namespace { id name fullPath }
      workItemType { id name }
      widgets {
        type
        ... on WorkItemWidgetDescription { description }
        ... on WorkItemWidgetAssignees { assignees { nodes { id name username } } }
        ... on WorkItemWidgetLabels { labels { nodes { id title color } } }
        ... on WorkItemWidgetHierarchy {
          parent { id iid title workItemType { name } }
          children { nodes { id iid title workItemType { name } } }
        }
        ... on WorkItemWidgetMilestone { milestone { id title state } }
        ... on WorkItemWidgetIteration { iteration { id title state } }
        ... on WorkItemWidgetStartAndDueDate { startDate dueDate }
        ... on WorkItemWidgetProgress { progress }
        ... on WorkItemWidgetHealthStatus { healthStatus }
        ... on WorkItemWidgetWeight { weight }
      }
"#
    };
}

macro_rules! list_fields {
    () => {
        r#"
        nodes {
          id
          iid
          title
          state
          confidential
          createdAt
          updatedAt
          closedAt
          webUrl
          author { id name username }
          workItemType { id name }
        }
        pageInfo { hasNextPage endCursor }
"#
    };
}

pub const FIRST_ACCESSIBLE_PROJECT: &str = r#"
query firstAccessibleProject {
  currentUser {
    projectMemberships(first: 1) {
      nodes { project { fullPath } }
    }
  }
}
"#;

pub const PROJECT_WORK_ITEM_TYPES: &str = r#"
query projectWorkItemTypes($projectPath: ID!) {
  project(fullPath: $projectPath) {
    workItemTypes {
      nodes { id name iconName }
    }
  }
}
"#;

pub const WORK_ITEM_BY_ID: &str = concat!(
    "query workItemById($id: WorkItemID!) {\n  workItem(id: $id) {",
    work_item_fields!(),
    "  }\n}\n"
);

pub const PROJECT_WORK_ITEM_BY_IID: &str = concat!(
    "query projectWorkItemByIid($fullPath: ID!, $iid: String!) {\n",
    "  container: project(fullPath: $fullPath) {\n    workItems(iid: $iid, first: 1) {\n      nodes {",
    work_item_fields!(),
    "      }\n    }\n  }\n}\n"
);

pub const GROUP_WORK_ITEM_BY_IID: &str = concat!(
    "query groupWorkItemByIid($fullPath: ID!, $iid: String!) {\n",
    "  container: group(fullPath: $fullPath) {\n    workItems(iid: $iid, first: 1) {\n      nodes {",
    work_item_fields!(),
    "      }\n    }\n  }\n}\n"
);

/// Just the type of a work item; used for hierarchy checks.
pub const WORK_ITEM_TYPE_OF: &str = r#"
query workItemTypeOf($id: WorkItemID!) {
  workItem(id: $id) {
    id
    workItemType { id name }
  }
}
"#;

pub const LIST_PROJECT_WORK_ITEMS: &str = concat!(
    "query listProjectWorkItems($fullPath: ID!, $types: [IssueType!], $state: IssuableState, ",
    "$search: String, $sort: WorkItemSort, $first: Int, $after: String) {\n",
    "  container: project(fullPath: $fullPath) {\n",
    "    workItems(types: $types, state: $state, search: $search, sort: $sort, first: $first, after: $after) {",
    list_fields!(),
    "    }\n  }\n}\n"
);

pub const LIST_GROUP_WORK_ITEMS: &str = concat!(
    "query listGroupWorkItems($fullPath: ID!, $types: [IssueType!], $state: IssuableState, ",
    "$search: String, $sort: WorkItemSort, $first: Int, $after: String) {\n",
    "  container: group(fullPath: $fullPath) {\n",
    "    workItems(types: $types, state: $state, search: $search, sort: $sort, first: $first, after: $after) {",
    list_fields!(),
    "    }\n  }\n}\n"
);

pub const CREATE_WORK_ITEM: &str = concat!(
    "mutation workItemCreate($input: WorkItemCreateInput!) {\n",
    "  workItemCreate(input: $input) {\n    errors\n    workItem {",
    work_item_fields!(),
    "    }\n  }\n}\n"
);

pub const UPDATE_WORK_ITEM: &str = concat!(
    "mutation workItemUpdate($input: WorkItemUpdateInput!) {\n",
    "  workItemUpdate(input: $input) {\n    errors\n    workItem {",
    work_item_fields!(),
    "    }\n  }\n}\n"
);

pub const DELETE_WORK_ITEM: &str = r#"
mutation workItemDelete($input: WorkItemDeleteInput!) {
  workItemDelete(input: $input) {
    errors
  }
}
"#;

/// Operation name of a document, e.g. `workItemCreate`. Used in logs.
pub fn operation_name(document: &str) -> &str {
    document
        .split_whitespace()
        .skip_while(|w| *w != "query" && *w != "mutation")
        .nth(1)
        .and_then(|w| w.split('(').next())
        .map(|w| w.trim_end_matches('{'))
        .unwrap_or("anonymous")
}

/// Whether `document` is a mutation rather than a query.
pub fn is_mutation(document: &str) -> bool {
    document.split_whitespace().next() == Some("mutation")
}
