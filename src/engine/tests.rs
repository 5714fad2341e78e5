use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use serde_json::{json, Value};

use super::{CreateRequest, ListFilter, WorkItemEngine};
use crate::builder::BaseFields;
use crate::catalog::{DiscoveryOptions, TypeCatalog};
use crate::error::{CatalogError, EngineError, TransportError, ValidationError};
use crate::gitlab::mock::MockTransport;
use crate::gitlab::queries::operation_name;
use crate::gitlab::Transport;
use crate::model::{
    AssigneeChange, ContainerRef, Patch, Scope, StateEvent, TypeName, WidgetKind,
    WidgetOperation, WorkItem, WorkItemLocator, WorkItemState,
};

const ITEM_ID: &str = "gid://gitlab/WorkItem/500";

fn fallback_catalog() -> Arc<TypeCatalog> {
    Arc::new(TypeCatalog::new(DiscoveryOptions::disabled()))
}

fn engine(transport: &MockTransport) -> WorkItemEngine<MockTransport> {
    WorkItemEngine::new(transport.clone(), fallback_catalog())
}

fn api_item(id: &str, iid: u64, type_name: &str, state: &str) -> Value {
    json!({
        "id": id,
        "iid": iid.to_string(),
        "title": format!("Item {iid}"),
        "state": state,
        "confidential": false,
        "createdAt": "2024-01-15T10:00:00Z",
        "updatedAt": "2024-01-15T10:00:00Z",
        "closedAt": null,
        "webUrl": null,
        "reference": null,
        "author": { "id": "gid://gitlab/User/1", "name": "Root", "username": "root" },
        "project": { "id": "gid://gitlab/Project/1", "name": "Web", "fullPath": "acme/web" },
        "namespace": null,
        "workItemType": { "id": "gid://gitlab/WorkItems::Type/2", "name": type_name },
        "widgets": [
            { "type": "ASSIGNEES", "assignees": { "nodes": [] } },
            { "type": "LABELS", "labels": { "nodes": [] } },
            { "type": "HIERARCHY", "parent": null, "children": { "nodes": [] } }
        ]
    })
}

fn by_id(item: Value) -> Result<Value, TransportError> {
    Ok(json!({ "workItem": item }))
}

fn updated(item: Value) -> Result<Value, TransportError> {
    Ok(json!({ "workItemUpdate": { "errors": [], "workItem": item } }))
}

fn page(iids: &[u64], next: Option<&str>) -> Result<Value, TransportError> {
    let nodes: Vec<Value> = iids
        .iter()
        .map(|iid| {
            json!({
                "id": format!("gid://gitlab/WorkItem/{iid}"),
                "iid": iid.to_string(),
                "title": format!("Item {iid}"),
                "state": "OPEN",
                "workItemType": { "id": "gid://gitlab/WorkItems::Type/2", "name": "Issue" }
            })
        })
        .collect();
    Ok(json!({
        "container": {
            "workItems": {
                "nodes": nodes,
                "pageInfo": { "hasNextPage": next.is_some(), "endCursor": next }
            }
        }
    }))
}

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// create
// ============================================================================

#[tokio::test]
async fn create_epic_in_group_sends_one_mutation() {
    let transport = MockTransport::new();
    let mut created = api_item(ITEM_ID, 1, "Epic", "OPEN");
    created["project"] = Value::Null;
    created["namespace"] = json!({ "id": "gid://gitlab/Group/9", "name": "Acme", "fullPath": "acme" });
    transport.respond(
        "workItemCreate",
        Ok(json!({ "workItemCreate": { "errors": [], "workItem": created } })),
    );

    let item = engine(&transport)
        .create(CreateRequest {
            type_input: "epic".into(),
            container: ContainerRef::group("acme"),
            base: BaseFields {
                title: "Q1 roadmap".into(),
                ..BaseFields::default()
            },
            operations: vec![],
        })
        .await
        .unwrap()
        .item;

    assert_eq!(item.work_item_type.name, TypeName::Epic);
    assert_eq!(item.container.unwrap().scope, Scope::Group);
    assert_eq!(transport.operations(), vec!["workItemCreate"]);
    let input = &transport.last_variables("workItemCreate").unwrap()["input"];
    assert_eq!(input["namespacePath"], "acme");
    assert_eq!(input["workItemTypeId"], "gid://gitlab/WorkItems::Type/1");
    assert!(input.get("projectPath").is_none());
}

#[tokio::test]
async fn create_with_wrong_container_makes_no_call() {
    let transport = MockTransport::new();
    let err = engine(&transport)
        .create(CreateRequest {
            type_input: "OBJECTIVE".into(),
            container: ContainerRef::project("acme/web"),
            base: BaseFields {
                title: "Grow".into(),
                ..BaseFields::default()
            },
            operations: vec![],
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::ScopeMismatch { .. })
    ));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn create_with_unknown_type_fails() {
    let transport = MockTransport::new();
    let err = engine(&transport)
        .create(CreateRequest {
            type_input: "story".into(),
            container: ContainerRef::project("acme/web"),
            base: BaseFields {
                title: "As a user".into(),
                ..BaseFields::default()
            },
            operations: vec![],
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::Catalog(CatalogError::UnknownType { ref input }) if input == "story"
    ));
}

#[tokio::test]
async fn create_checks_parent_type_before_mutating() {
    let transport = MockTransport::new();
    transport.respond(
        "workItemTypeOf",
        Ok(json!({ "workItem": { "id": "gid://gitlab/WorkItem/9", "workItemType": { "name": "Key Result" } } })),
    );

    let err = engine(&transport)
        .create(CreateRequest {
            type_input: "task".into(),
            container: ContainerRef::project("acme/web"),
            base: BaseFields {
                title: "Chore".into(),
                ..BaseFields::default()
            },
            operations: vec![WidgetOperation::Hierarchy {
                parent: Some(Patch::Set("gid://gitlab/WorkItem/9".into())),
                children: None,
            }],
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::HierarchyViolation {
            parent: TypeName::KeyResult,
            child: TypeName::Task
        })
    ));
    assert_eq!(transport.operations(), vec!["workItemTypeOf"]);
}

// ============================================================================
// update
// ============================================================================

#[tokio::test]
async fn conflicting_labels_fail_before_any_call() {
    let transport = MockTransport::new();
    let err = engine(&transport)
        .update(
            &WorkItemLocator::Id(ITEM_ID.into()),
            &[
                WidgetOperation::LabelsAdd(ids(&["L1"])),
                WidgetOperation::LabelsRemove(ids(&["L1"])),
            ],
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::ConflictingOperation {
            widget: WidgetKind::Labels,
            ..
        })
    ));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn reopen_on_open_item_is_sent() {
    let transport = MockTransport::new();
    transport.respond("workItemById", by_id(api_item(ITEM_ID, 5, "Issue", "OPEN")));
    transport.respond("workItemUpdate", updated(api_item(ITEM_ID, 5, "Issue", "OPEN")));

    let item = engine(&transport)
        .update(
            &WorkItemLocator::Id(ITEM_ID.into()),
            &[WidgetOperation::State(StateEvent::Reopen)],
        )
        .await
        .unwrap()
        .item;

    assert_eq!(item.state, WorkItemState::Open);
    assert_eq!(transport.operations(), vec!["workItemById", "workItemUpdate"]);
    let input = &transport.last_variables("workItemUpdate").unwrap()["input"];
    assert_eq!(input["stateEvent"], "REOPEN");
    assert_eq!(input["id"], ITEM_ID);
}

#[tokio::test]
async fn tier_gated_widgets_come_back_as_notices() {
    let transport = MockTransport::new();
    transport.respond("workItemById", by_id(api_item(ITEM_ID, 5, "Issue", "OPEN")));
    transport.respond("workItemUpdate", updated(api_item(ITEM_ID, 5, "Issue", "OPEN")));

    let outcome = engine(&transport)
        .update(
            &WorkItemLocator::Id(ITEM_ID.into()),
            &[
                WidgetOperation::Weight(Patch::Set(3)),
                WidgetOperation::Title("Renamed".into()),
            ],
        )
        .await
        .unwrap();

    assert_eq!(outcome.notices.len(), 1);
    assert_eq!(outcome.notices[0].widget, WidgetKind::Weight);
    assert_eq!(outcome.notices[0].type_name, TypeName::Issue);
    assert_eq!(transport.last_variables("workItemUpdate").unwrap()["input"]["weightWidget"]["weight"], 3);
}

#[tokio::test]
async fn plain_create_has_no_notices() {
    let transport = MockTransport::new();
    transport.respond(
        "workItemCreate",
        Ok(json!({ "workItemCreate": { "errors": [], "workItem": api_item(ITEM_ID, 1, "Issue", "OPEN") } })),
    );

    let outcome = engine(&transport)
        .create(CreateRequest {
            type_input: "issue".into(),
            container: ContainerRef::project("acme/web"),
            base: BaseFields {
                title: "Fix login".into(),
                ..BaseFields::default()
            },
            operations: vec![],
        })
        .await
        .unwrap();

    assert!(outcome.notices.is_empty());
    let json = serde_json::to_value(&outcome).unwrap();
    assert!(json.get("notices").is_none());
    assert_eq!(json["item"]["id"], ITEM_ID);
}

#[tokio::test]
async fn iid_and_id_lookups_send_the_same_mutation() {
    let ops = [
        WidgetOperation::Title("Renamed".into()),
        WidgetOperation::Milestone(Patch::Clear),
    ];

    let by_id_transport = MockTransport::new();
    by_id_transport.respond("workItemById", by_id(api_item(ITEM_ID, 5, "Issue", "OPEN")));
    by_id_transport.respond("workItemUpdate", updated(api_item(ITEM_ID, 5, "Issue", "OPEN")));
    engine(&by_id_transport)
        .update(&WorkItemLocator::Id(ITEM_ID.into()), &ops)
        .await
        .unwrap();

    let by_iid_transport = MockTransport::new();
    by_iid_transport.respond(
        "projectWorkItemByIid",
        Ok(json!({ "container": { "workItems": { "nodes": [api_item(ITEM_ID, 5, "Issue", "OPEN")] } } })),
    );
    by_iid_transport.respond("workItemUpdate", updated(api_item(ITEM_ID, 5, "Issue", "OPEN")));
    engine(&by_iid_transport)
        .update(
            &WorkItemLocator::Iid {
                container: ContainerRef::project("acme/web"),
                iid: 5,
            },
            &ops,
        )
        .await
        .unwrap();

    assert_eq!(
        by_id_transport.last_variables("workItemUpdate"),
        by_iid_transport.last_variables("workItemUpdate")
    );
    assert_eq!(
        by_iid_transport.last_variables("projectWorkItemByIid").unwrap(),
        json!({ "fullPath": "acme/web", "iid": "5" })
    );
}

#[tokio::test]
async fn unsupported_widget_reads_but_never_mutates() {
    let transport = MockTransport::new();
    transport.respond("workItemById", by_id(api_item(ITEM_ID, 5, "Issue", "OPEN")));

    let err = engine(&transport)
        .update(
            &WorkItemLocator::Id(ITEM_ID.into()),
            &[
                WidgetOperation::Title("Still valid".into()),
                WidgetOperation::Progress(30),
            ],
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::UnsupportedWidget {
            widget: WidgetKind::Progress,
            ..
        })
    ));
    assert_eq!(transport.operations(), vec!["workItemById"]);
}

#[tokio::test]
async fn assignee_add_keeps_current_assignees() {
    let transport = MockTransport::new();
    let mut current = api_item(ITEM_ID, 5, "Task", "OPEN");
    current["widgets"][0]["assignees"]["nodes"] =
        json!([{ "id": "gid://gitlab/User/1", "name": "Root", "username": "root" }]);
    transport.respond("workItemById", by_id(current.clone()));
    transport.respond("workItemUpdate", updated(current));

    engine(&transport)
        .update(
            &WorkItemLocator::Id(ITEM_ID.into()),
            &[WidgetOperation::Assignees(AssigneeChange::Add(ids(&[
                "gid://gitlab/User/2",
            ])))],
        )
        .await
        .unwrap();

    let input = &transport.last_variables("workItemUpdate").unwrap()["input"];
    assert_eq!(
        input["assigneesWidget"]["assigneeIds"],
        json!(["gid://gitlab/User/1", "gid://gitlab/User/2"])
    );
}

#[tokio::test]
async fn item_cannot_be_its_own_parent() {
    let transport = MockTransport::new();
    transport.respond("workItemById", by_id(api_item(ITEM_ID, 5, "Task", "OPEN")));

    let err = engine(&transport)
        .update(
            &WorkItemLocator::Id(ITEM_ID.into()),
            &[WidgetOperation::Hierarchy {
                parent: Some(Patch::Set(ITEM_ID.into())),
                children: None,
            }],
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::InvalidValue {
            widget: WidgetKind::Hierarchy,
            ..
        })
    ));
    assert_eq!(transport.operations(), vec!["workItemById"]);
}

#[tokio::test]
async fn incompatible_child_is_rejected() {
    let transport = MockTransport::new();
    transport.respond("workItemById", by_id(api_item(ITEM_ID, 5, "Issue", "OPEN")));
    transport.respond(
        "workItemTypeOf",
        Ok(json!({ "workItem": { "id": "gid://gitlab/WorkItem/8", "workItemType": { "name": "Epic" } } })),
    );

    let err = engine(&transport)
        .update(
            &WorkItemLocator::Id(ITEM_ID.into()),
            &[WidgetOperation::Hierarchy {
                parent: None,
                children: Some(ids(&["gid://gitlab/WorkItem/8"])),
            }],
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::HierarchyViolation {
            parent: TypeName::Issue,
            child: TypeName::Epic
        })
    ));
}

#[tokio::test]
async fn one_item_as_parent_and_child_fails_before_any_call() {
    let transport = MockTransport::new();
    let err = engine(&transport)
        .update(
            &WorkItemLocator::Id(ITEM_ID.into()),
            &[WidgetOperation::Hierarchy {
                parent: Some(Patch::Set("gid://gitlab/WorkItem/9".into())),
                children: Some(ids(&["gid://gitlab/WorkItem/9"])),
            }],
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::InvalidValue {
            widget: WidgetKind::Hierarchy,
            ..
        })
    ));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn backend_error_list_is_a_rejection() {
    let transport = MockTransport::new();
    transport.respond("workItemById", by_id(api_item(ITEM_ID, 5, "Issue", "OPEN")));
    transport.respond(
        "workItemUpdate",
        Ok(json!({ "workItemUpdate": { "errors": ["Title is too long"], "workItem": null } })),
    );

    let err = engine(&transport)
        .update(
            &WorkItemLocator::Id(ITEM_ID.into()),
            &[WidgetOperation::Title("x".repeat(300))],
        )
        .await
        .unwrap_err();

    match err {
        EngineError::BackendRejected { messages } => {
            assert_eq!(messages, vec!["Title is too long".to_string()])
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

// ============================================================================
// get / delete
// ============================================================================

#[tokio::test]
async fn missing_item_is_not_found() {
    let transport = MockTransport::new();
    transport.respond("workItemById", by_id(Value::Null));

    let err = engine(&transport)
        .get(&WorkItemLocator::Id(ITEM_ID.into()))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));
}

#[tokio::test]
async fn group_iid_lookup_uses_group_query() {
    let transport = MockTransport::new();
    let mut epic = api_item(ITEM_ID, 3, "Epic", "CLOSED");
    epic["project"] = Value::Null;
    epic["namespace"] = json!({ "id": "gid://gitlab/Group/9", "name": "Acme", "fullPath": "acme" });
    transport.respond(
        "groupWorkItemByIid",
        Ok(json!({ "container": { "workItems": { "nodes": [epic] } } })),
    );

    let item = engine(&transport)
        .get(&WorkItemLocator::Iid {
            container: ContainerRef::group("acme"),
            iid: 3,
        })
        .await
        .unwrap();
    assert_eq!(item.state, WorkItemState::Closed);
    assert_eq!(transport.operations(), vec!["groupWorkItemByIid"]);
}

#[tokio::test]
async fn delete_by_iid_resolves_the_id_first() {
    let transport = MockTransport::new();
    transport.respond(
        "projectWorkItemByIid",
        Ok(json!({ "container": { "workItems": { "nodes": [api_item(ITEM_ID, 5, "Issue", "OPEN")] } } })),
    );
    transport.respond("workItemDelete", Ok(json!({ "workItemDelete": { "errors": [] } })));

    engine(&transport)
        .delete(&WorkItemLocator::Iid {
            container: ContainerRef::project("acme/web"),
            iid: 5,
        })
        .await
        .unwrap();

    assert_eq!(
        transport.operations(),
        vec!["projectWorkItemByIid", "workItemDelete"]
    );
    assert_eq!(
        transport.last_variables("workItemDelete").unwrap(),
        json!({ "input": { "id": ITEM_ID } })
    );
}

#[tokio::test]
async fn delete_rejection_is_surfaced() {
    let transport = MockTransport::new();
    transport.respond(
        "workItemDelete",
        Ok(json!({ "workItemDelete": { "errors": ["You don't have permission"] } })),
    );

    let err = engine(&transport)
        .delete(&WorkItemLocator::Id(ITEM_ID.into()))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::BackendRejected { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn graphql_errors_on_delete_are_a_rejection() {
    let transport = MockTransport::new();
    transport.respond(
        "workItemDelete",
        Err(TransportError::Http {
            status: 200,
            messages: vec![
                "The resource that you are attempting to access does not exist or you don't have permission to perform this action".into(),
            ],
        }),
    );

    let err = engine(&transport)
        .delete(&WorkItemLocator::Id(ITEM_ID.into()))
        .await
        .unwrap_err();
    assert!(!err.is_retryable());
    match err {
        EngineError::BackendRejected { messages } => {
            assert!(messages[0].contains("don't have permission"))
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn graphql_errors_on_update_are_a_rejection() {
    let transport = MockTransport::new();
    transport.respond("workItemById", by_id(api_item(ITEM_ID, 5, "Issue", "OPEN")));
    transport.respond(
        "workItemUpdate",
        Err(TransportError::Http {
            status: 200,
            messages: vec!["Variable $input of type WorkItemUpdateInput! was provided invalid value".into()],
        }),
    );

    let err = engine(&transport)
        .update(
            &WorkItemLocator::Id(ITEM_ID.into()),
            &[WidgetOperation::Title("Renamed".into())],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::BackendRejected { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn graphql_errors_on_a_query_stay_transport_errors() {
    let transport = MockTransport::new();
    transport.respond(
        "workItemById",
        Err(TransportError::Http {
            status: 200,
            messages: vec!["Internal server error".into()],
        }),
    );

    let err = engine(&transport)
        .get(&WorkItemLocator::Id(ITEM_ID.into()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Transport(TransportError::Http { status: 200, .. })
    ));
}

#[tokio::test]
async fn gateway_failure_on_delete_stays_retryable() {
    let transport = MockTransport::new();
    transport.respond(
        "workItemDelete",
        Err(TransportError::Http {
            status: 503,
            messages: vec!["Service Unavailable".into()],
        }),
    );

    let err = engine(&transport)
        .delete(&WorkItemLocator::Id(ITEM_ID.into()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Transport(TransportError::Http { status: 503, .. })
    ));
    assert!(err.is_retryable());
}

// ============================================================================
// transport failures
// ============================================================================

#[tokio::test]
async fn slow_backend_times_out() {
    let transport = MockTransport::new().with_delay(Duration::from_millis(500));
    transport.respond("workItemById", by_id(api_item(ITEM_ID, 5, "Issue", "OPEN")));

    let err = engine(&transport)
        .with_timeout(Duration::from_millis(20))
        .get(&WorkItemLocator::Id(ITEM_ID.into()))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Timeout));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn http_failure_is_a_transport_error() {
    let transport = MockTransport::new();
    transport.respond(
        "workItemById",
        Err(TransportError::Http {
            status: 502,
            messages: vec!["bad gateway".into()],
        }),
    );

    let err = engine(&transport)
        .get(&WorkItemLocator::Id(ITEM_ID.into()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Transport(TransportError::Http { status: 502, .. })
    ));
}

// ============================================================================
// list
// ============================================================================

#[tokio::test]
async fn list_follows_cursors_and_restarts() {
    let transport = MockTransport::new();
    transport.respond("listProjectWorkItems", page(&[1, 2], Some("c1")));
    transport.respond("listProjectWorkItems", page(&[3], None));
    transport.respond("listProjectWorkItems", page(&[1, 2], Some("c1")));
    transport.respond("listProjectWorkItems", page(&[3], None));

    let engine = engine(&transport);
    let container = ContainerRef::project("acme/web");
    let filter = ListFilter::default();

    let items: Vec<WorkItem> = engine
        .list(&container, &filter)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    let iids: Vec<u64> = items.iter().map(|i| i.iid).collect();
    assert_eq!(iids, vec![1, 2, 3]);
    assert_eq!(transport.call_count(), 2);
    assert_eq!(
        transport.last_variables("listProjectWorkItems").unwrap()["after"],
        "c1"
    );

    let again: Vec<WorkItem> = engine
        .list(&container, &filter)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(again.len(), 3);
    assert_eq!(transport.call_count(), 4);
}

#[tokio::test]
async fn list_limit_stops_paging() {
    let transport = MockTransport::new();
    transport.respond("listProjectWorkItems", page(&[1, 2], Some("c1")));

    let engine = engine(&transport);
    let container = ContainerRef::project("acme/web");
    let filter = ListFilter {
        limit: Some(2),
        ..ListFilter::default()
    };

    let items: Vec<WorkItem> = engine
        .list(&container, &filter)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(transport.call_count(), 1);
    assert_eq!(
        transport.last_variables("listProjectWorkItems").unwrap()["first"],
        2
    );
}

#[tokio::test]
async fn list_filters_are_normalized() {
    let transport = MockTransport::new();
    transport.respond("listGroupWorkItems", page(&[], None));

    let engine = engine(&transport);
    let container = ContainerRef::group("acme");
    let filter = ListFilter {
        types: vec!["key result".into(), "gid://gitlab/WorkItems::Type/7".into()],
        state: Some(WorkItemState::Closed),
        search: Some("roadmap".into()),
        ..ListFilter::default()
    };

    let items: Vec<WorkItem> = engine
        .list(&container, &filter)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert!(items.is_empty());

    let vars = transport.last_variables("listGroupWorkItems").unwrap();
    assert_eq!(vars["fullPath"], "acme");
    assert_eq!(vars["types"], json!(["KEY_RESULT", "OBJECTIVE"]));
    assert_eq!(vars["state"], "closed");
    assert_eq!(vars["search"], "roadmap");
    assert!(vars["after"].is_null());
}

#[tokio::test]
async fn single_page_exposes_the_next_cursor() {
    let transport = MockTransport::new();
    transport.respond("listProjectWorkItems", page(&[4, 5], Some("c2")));

    let page = engine(&transport)
        .list_page(
            &ContainerRef::project("acme/web"),
            &ListFilter::default(),
            Some("c1".into()),
        )
        .await
        .unwrap();
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.next_cursor.as_deref(), Some("c2"));
    assert_eq!(
        transport.last_variables("listProjectWorkItems").unwrap()["after"],
        "c1"
    );
}

#[tokio::test]
async fn list_with_unknown_type_fails_before_any_call() {
    let transport = MockTransport::new();
    let engine = engine(&transport);
    let container = ContainerRef::project("acme/web");
    let filter = ListFilter {
        types: vec!["bug".into()],
        ..ListFilter::default()
    };

    let result = engine.list(&container, &filter).await;
    assert!(matches!(
        result,
        Err(EngineError::Catalog(CatalogError::UnknownType { .. }))
    ));
    assert_eq!(transport.call_count(), 0);
}

// ============================================================================
// catalog sharing
// ============================================================================

#[tokio::test]
async fn concurrent_first_use_triggers_one_discovery() {
    let transport = MockTransport::new().with_delay(Duration::from_millis(30));
    transport.respond(
        "projectWorkItemTypes",
        Ok(json!({ "project": { "workItemTypes": { "nodes": [
            { "id": "gid://gitlab/WorkItems::Type/2", "name": "Issue", "iconName": null }
        ] } } })),
    );
    let catalog = Arc::new(TypeCatalog::new(DiscoveryOptions {
        enabled: true,
        project_path: Some("acme/web".into()),
    }));
    let first = WorkItemEngine::new(transport.clone(), catalog.clone());
    let second = WorkItemEngine::new(transport.clone(), catalog);

    let (a, b) = tokio::join!(first.initialize(), second.initialize());
    assert_eq!(a, b);
    assert_eq!(transport.operations(), vec!["projectWorkItemTypes"]);
    assert_eq!(
        second.catalog().resolve("issue").unwrap().global_id,
        "gid://gitlab/WorkItems::Type/2"
    );
}

// ============================================================================
// round trip against an in-memory backend
// ============================================================================

/// Keeps work items in memory and applies the subset of update input the
/// hierarchy scenarios need.
struct FakeBackend {
    items: Mutex<HashMap<String, Value>>,
}

impl FakeBackend {
    fn with_items(items: Vec<Value>) -> Self {
        let items = items
            .into_iter()
            .map(|item| (item["id"].as_str().unwrap_or_default().to_string(), item))
            .collect();
        Self {
            items: Mutex::new(items),
        }
    }

    fn apply_update(&self, input: &Value) -> Value {
        let mut items = self.items.lock().unwrap();
        let id = input["id"].as_str().unwrap().to_string();

        let parent_ref = match input["hierarchyWidget"].get("parentId") {
            Some(Value::String(parent_id)) => {
                let parent = &items[parent_id];
                Some(json!({
                    "id": parent_id,
                    "iid": parent["iid"],
                    "title": parent["title"],
                    "workItemType": { "name": parent["workItemType"]["name"] }
                }))
            }
            Some(Value::Null) => Some(Value::Null),
            _ => None,
        };

        let item = items.get_mut(&id).unwrap();
        if let Some(parent_ref) = parent_ref {
            for widget in item["widgets"].as_array_mut().unwrap() {
                if widget["type"] == "HIERARCHY" {
                    widget["parent"] = parent_ref.clone();
                }
            }
        }
        match input["stateEvent"].as_str() {
            Some("CLOSE") => item["state"] = json!("CLOSED"),
            Some("REOPEN") => item["state"] = json!("OPEN"),
            _ => {}
        }
        item.clone()
    }
}

#[async_trait]
impl Transport for FakeBackend {
    async fn execute(&self, document: &str, variables: Value) -> Result<Value, TransportError> {
        match operation_name(document) {
            "workItemById" => {
                let items = self.items.lock().unwrap();
                let id = variables["id"].as_str().unwrap_or_default();
                Ok(json!({ "workItem": items.get(id).cloned() }))
            }
            "workItemTypeOf" => {
                let items = self.items.lock().unwrap();
                let id = variables["id"].as_str().unwrap_or_default();
                Ok(json!({
                    "workItem": items.get(id).map(|item| json!({
                        "id": id,
                        "workItemType": item["workItemType"]
                    }))
                }))
            }
            "workItemUpdate" => {
                let item = self.apply_update(&variables["input"]);
                Ok(json!({ "workItemUpdate": { "errors": [], "workItem": item } }))
            }
            other => Err(TransportError::Http {
                status: 400,
                messages: vec![format!("unsupported operation {other}")],
            }),
        }
    }
}

#[tokio::test]
async fn set_then_clear_parent_leaves_no_parent() {
    let epic_id = "gid://gitlab/WorkItem/1";
    let backend = Arc::new(FakeBackend::with_items(vec![
        api_item(epic_id, 1, "Epic", "OPEN"),
        api_item(ITEM_ID, 5, "Issue", "OPEN"),
    ]));
    let engine = WorkItemEngine::new(backend, fallback_catalog());
    let locator = WorkItemLocator::Id(ITEM_ID.into());

    let with_parent = engine
        .update(
            &locator,
            &[WidgetOperation::Hierarchy {
                parent: Some(Patch::Set(epic_id.into())),
                children: None,
            }],
        )
        .await
        .unwrap()
        .item;
    assert_eq!(with_parent.parent().map(|p| p.id.as_str()), Some(epic_id));

    engine
        .update(
            &locator,
            &[WidgetOperation::Hierarchy {
                parent: Some(Patch::Clear),
                children: None,
            }],
        )
        .await
        .unwrap();

    let current = engine.get(&locator).await.unwrap();
    assert!(current.parent().is_none());
    assert_eq!(current.state, WorkItemState::Open);
}

#[tokio::test]
async fn close_then_reopen_round_trips() {
    let backend = Arc::new(FakeBackend::with_items(vec![api_item(
        ITEM_ID, 5, "Task", "OPEN",
    )]));
    let engine = WorkItemEngine::new(backend, fallback_catalog());
    let locator = WorkItemLocator::Id(ITEM_ID.into());

    let closed = engine
        .update(&locator, &[WidgetOperation::State(StateEvent::Close)])
        .await
        .unwrap()
        .item;
    assert_eq!(closed.state, WorkItemState::Closed);

    let reopened = engine
        .update(&locator, &[WidgetOperation::State(StateEvent::Reopen)])
        .await
        .unwrap()
        .item;
    assert_eq!(reopened.state, WorkItemState::Open);
}
