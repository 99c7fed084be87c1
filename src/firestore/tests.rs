use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use reqwest_middleware::ClientBuilder;
use serde_json::json;
use std::collections::HashMap;

use crate::firestore::field_value::FieldValue;
use crate::firestore::models::{
    Direction, Document, FieldOperator, MapValue, Value, ValueType,
};
use crate::firestore::query::Query;
use crate::firestore::reference::{auto_id, SetOptions};
use crate::firestore::snapshot::DocumentSnapshot;
use crate::firestore::value::encode_write_payload;
use crate::firestore::{Firestore, FirestoreError};

const BASE_PATH: &str = "/v1/projects/demo/databases/(default)/documents";

// Bare client without the auth middleware so mocks are reachable without a
// token round-trip.
fn test_db(server: &MockServer) -> Firestore {
    let client = ClientBuilder::new(reqwest::Client::new()).build();
    Firestore::with_client(client, server.url(BASE_PATH))
}

fn offline_db() -> Firestore {
    let client = ClientBuilder::new(reqwest::Client::new()).build();
    Firestore::with_client(
        client,
        format!("http://localhost{}", BASE_PATH),
    )
}

#[test]
fn filters_compound_with_and() {
    let query = Query::new("todos")
        .where_filter("completed", FieldOperator::Equal, false)
        .unwrap()
        .where_filter("priority", FieldOperator::GreaterThan, 3)
        .unwrap()
        .where_filter("assignee", FieldOperator::Equal, "kim")
        .unwrap();

    let body = serde_json::to_value(&query.structured).unwrap();
    assert_eq!(body["where"]["compositeFilter"]["op"], "AND");

    let filters = body["where"]["compositeFilter"]["filters"]
        .as_array()
        .unwrap();
    assert_eq!(filters.len(), 3);
    assert_eq!(filters[0]["fieldFilter"]["field"]["fieldPath"], "completed");
    assert_eq!(filters[1]["fieldFilter"]["op"], "GREATER_THAN");
    assert_eq!(filters[1]["fieldFilter"]["value"]["integerValue"], "3");
    assert_eq!(filters[2]["fieldFilter"]["value"]["stringValue"], "kim");
}

#[test]
fn null_comparisons_become_unary_filters() {
    let query = Query::new("customers")
        .where_filter("deletedAt", FieldOperator::Equal, serde_json::Value::Null)
        .unwrap();
    let body = serde_json::to_value(&query.structured).unwrap();
    assert_eq!(body["where"]["unaryFilter"]["op"], "IS_NULL");
    assert_eq!(body["where"]["unaryFilter"]["field"]["fieldPath"], "deletedAt");

    let query = Query::new("customers")
        .where_filter("deletedAt", FieldOperator::NotEqual, serde_json::Value::Null)
        .unwrap();
    let body = serde_json::to_value(&query.structured).unwrap();
    assert_eq!(body["where"]["unaryFilter"]["op"], "IS_NOT_NULL");

    let err = Query::new("customers")
        .where_filter("deletedAt", FieldOperator::LessThan, serde_json::Value::Null)
        .unwrap_err();
    assert!(matches!(err, FirestoreError::Validation(_)));
}

#[test]
fn constraint_methods_return_independent_handles() {
    let db = offline_db();
    let base = db.collection("todos");

    let filtered = base
        .where_filter("completed", FieldOperator::Equal, false)
        .unwrap();
    assert!(base.query.structured.where_clause.is_none());
    assert!(filtered.query.structured.where_clause.is_some());

    let limited = filtered.limit(5);
    assert!(filtered.query.structured.limit.is_none());
    assert_eq!(limited.query.structured.limit, Some(5));

    let ordered = limited.order_by("text", Direction::default());
    assert!(limited.query.structured.order_by.is_none());
    assert!(ordered.query.structured.order_by.is_some());
}

#[tokio::test]
async fn captured_handle_is_unaffected_by_derived_constraints() {
    let server = MockServer::start();
    let db = test_db(&server);

    let base = db.collection("todos");
    let _narrowed = base
        .where_filter("completed", FieldOperator::Equal, false)
        .unwrap();

    // The captured handle still runs a constraint-free query.
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path(format!("{}:runQuery", BASE_PATH))
            .json_body(json!({
                "structuredQuery": { "from": [{ "collectionId": "todos" }] }
            }));
        then.status(200).json_body(json!([]));
    });

    let snapshot = base.get().await.unwrap();
    assert!(snapshot.empty());
    assert_eq!(snapshot.size(), 0);
    mock.assert();
}

#[tokio::test]
async fn where_filter_narrows_results() {
    let server = MockServer::start();
    let db = test_db(&server);

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path(format!("{}:runQuery", BASE_PATH))
            .json_body(json!({
                "structuredQuery": {
                    "from": [{ "collectionId": "todos" }],
                    "where": {
                        "fieldFilter": {
                            "field": { "fieldPath": "completed" },
                            "op": "EQUAL",
                            "value": { "booleanValue": false }
                        }
                    }
                }
            }));
        then.status(200).json_body(json!([
            {
                "document": {
                    "name": "projects/demo/databases/(default)/documents/todos/wash",
                    "fields": {
                        "text": { "stringValue": "wash car" },
                        "completed": { "booleanValue": false }
                    },
                    "createTime": "2024-05-01T10:00:00Z",
                    "updateTime": "2024-05-01T10:00:00Z"
                },
                "readTime": "2024-05-02T08:00:00Z"
            }
        ]));
    });

    let snapshot = db
        .collection("todos")
        .where_filter("completed", FieldOperator::Equal, false)
        .unwrap()
        .get()
        .await
        .unwrap();

    assert_eq!(snapshot.size(), 1);
    let doc = &snapshot.docs()[0];
    assert_eq!(doc.id(), "wash");
    assert!(doc.exists());
    assert_eq!(
        doc.get_field::<String>("text").unwrap().as_deref(),
        Some("wash car")
    );
    assert!(doc.read_time().is_some());
    mock.assert();
}

#[tokio::test]
async fn order_and_limit_ride_in_the_query_body() {
    let server = MockServer::start();
    let db = test_db(&server);

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path(format!("{}:runQuery", BASE_PATH))
            .json_body(json!({
                "structuredQuery": {
                    "from": [{ "collectionId": "appointments" }],
                    "orderBy": [{
                        "field": { "fieldPath": "startTime" },
                        "direction": "DESCENDING"
                    }],
                    "limit": 2
                }
            }));
        then.status(200).json_body(json!([]));
    });

    db.collection("appointments")
        .order_by("startTime", Direction::Descending)
        .limit(2)
        .get()
        .await
        .unwrap();
    mock.assert();
}

#[tokio::test]
async fn subcollection_queries_target_the_parent_document() {
    let server = MockServer::start();
    let db = test_db(&server);

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path(format!("{}/customers/c1:runQuery", BASE_PATH))
            .json_body(json!({
                "structuredQuery": { "from": [{ "collectionId": "vehicles" }] }
            }));
        then.status(200).json_body(json!([]));
    });

    db.collection("customers")
        .doc("c1")
        .collection("vehicles")
        .get()
        .await
        .unwrap();
    mock.assert();
}

#[tokio::test]
async fn get_missing_document_reports_absence() {
    let server = MockServer::start();
    let db = test_db(&server);

    let mock = server.mock(|when, then| {
        when.method(GET).path(format!("{}/todos/nope", BASE_PATH));
        then.status(404);
    });

    let snapshot = db.collection("todos").doc("nope").get().await.unwrap();
    assert!(!snapshot.exists());
    assert_eq!(snapshot.id(), "nope");
    assert!(snapshot
        .data::<serde_json::Map<String, serde_json::Value>>()
        .unwrap()
        .is_none());
    assert_eq!(snapshot.get_field::<String>("text").unwrap(), None);
    mock.assert();
}

#[tokio::test]
async fn delete_is_idempotent() {
    let server = MockServer::start();
    let db = test_db(&server);

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/projects/demo/databases/(default):commit")
            .json_body(json!({
                "writes": [{
                    "delete": "projects/demo/databases/(default)/documents/todos/gone"
                }]
            }));
        then.status(200).json_body(json!({
            "writeResults": [{}],
            "commitTime": "2024-05-02T08:00:00Z"
        }));
    });

    let doc = db.collection("todos").doc("gone");
    let first = doc.delete().await.unwrap();
    let second = doc.delete().await.unwrap();
    assert!(first.update_time.is_some());
    assert!(second.update_time.is_some());
    mock.assert_hits(2);
}

#[tokio::test]
async fn update_missing_document_is_not_found() {
    let server = MockServer::start();
    let db = test_db(&server);

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/projects/demo/databases/(default):commit")
            .json_body(json!({
                "writes": [{
                    "updateMask": { "fieldPaths": ["text"] },
                    "currentDocument": { "exists": true },
                    "update": {
                        "name": "projects/demo/databases/(default)/documents/todos/ghost",
                        "fields": { "text": { "stringValue": "x" } }
                    }
                }]
            }));
        then.status(404).json_body(json!({
            "error": {
                "code": 404,
                "message": "No document to update",
                "status": "NOT_FOUND"
            }
        }));
    });

    let err = db
        .collection("todos")
        .doc("ghost")
        .update(&json!({ "text": "x" }))
        .await
        .unwrap_err();
    assert!(matches!(err, FirestoreError::NotFound(_)));
    mock.assert();
}

#[tokio::test]
async fn add_then_get_round_trips() {
    let server = MockServer::start();
    let db = test_db(&server);

    let commit_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/projects/demo/databases/(default):commit")
            .body_includes("\"exists\":false");
        then.status(200).json_body(json!({
            "writeResults": [{ "updateTime": "2024-05-02T08:00:00Z" }],
            "commitTime": "2024-05-02T08:00:00Z"
        }));
    });

    let doc = db.collection("todos").add(&json!({ "f": 1 })).await.unwrap();
    assert_eq!(doc.id().len(), 20);
    commit_mock.assert();

    let name = format!(
        "projects/demo/databases/(default)/documents/todos/{}",
        doc.id()
    );
    let get_mock = server.mock(|when, then| {
        when.method(GET)
            .path(format!("{}/todos/{}", BASE_PATH, doc.id()));
        then.status(200).json_body(json!({
            "name": name,
            "fields": { "f": { "integerValue": "1" } },
            "createTime": "2024-05-02T08:00:00Z",
            "updateTime": "2024-05-02T08:00:00Z"
        }));
    });

    let snapshot = doc.get().await.unwrap();
    assert!(snapshot.exists());
    assert_eq!(snapshot.get_field::<i64>("f").unwrap(), Some(1));
    get_mock.assert();
}

#[tokio::test]
async fn merge_set_masks_only_the_given_fields() {
    let server = MockServer::start();
    let db = test_db(&server);

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/projects/demo/databases/(default):commit")
            .json_body(json!({
                "writes": [{
                    "updateMask": { "fieldPaths": ["status"] },
                    "update": {
                        "name": "projects/demo/databases/(default)/documents/jobs/j1",
                        "fields": { "status": { "stringValue": "done" } }
                    }
                }]
            }));
        then.status(200).json_body(json!({
            "writeResults": [{ "updateTime": "2024-05-02T08:00:00Z" }],
            "commitTime": "2024-05-02T08:00:00Z"
        }));
    });

    db.collection("jobs")
        .doc("j1")
        .set_with_options(&json!({ "status": "done" }), SetOptions::merge())
        .await
        .unwrap();
    mock.assert();
}

#[tokio::test]
async fn field_value_helpers_become_transforms() {
    let server = MockServer::start();
    let db = test_db(&server);

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/projects/demo/databases/(default):commit")
            .json_body(json!({
                "writes": [{
                    "updateMask": { "fieldPaths": [] },
                    "updateTransforms": [
                        {
                            "fieldPath": "updatedAt",
                            "setToServerValue": "REQUEST_TIME"
                        },
                        {
                            "fieldPath": "visits",
                            "increment": { "integerValue": "1" }
                        }
                    ],
                    "currentDocument": { "exists": true },
                    "update": {
                        "name": "projects/demo/databases/(default)/documents/todos/wash"
                    }
                }]
            }));
        then.status(200).json_body(json!({
            "writeResults": [{
                "updateTime": "2024-05-02T08:00:00Z",
                "transformResults": [
                    { "timestampValue": "2024-05-02T08:00:00Z" },
                    { "integerValue": "5" }
                ]
            }],
            "commitTime": "2024-05-02T08:00:00Z"
        }));
    });

    let result = db
        .collection("todos")
        .doc("wash")
        .update(&json!({
            "updatedAt": FieldValue::server_timestamp(),
            "visits": FieldValue::increment(1),
        }))
        .await
        .unwrap();
    assert!(result.update_time.is_some());
    mock.assert();
}

#[test]
fn nested_transform_sentinels_are_rejected() {
    let err = encode_write_payload(&json!({
        "meta": { "updatedAt": FieldValue::server_timestamp() }
    }))
    .unwrap_err();
    assert!(matches!(err, FirestoreError::Validation(_)));

    let err = encode_write_payload(&json!("not an object")).unwrap_err();
    assert!(matches!(err, FirestoreError::Validation(_)));
}

#[test]
fn legacy_operator_tokens_parse() {
    assert_eq!("==".parse::<FieldOperator>().unwrap(), FieldOperator::Equal);
    assert_eq!("!=".parse::<FieldOperator>().unwrap(), FieldOperator::NotEqual);
    assert_eq!("<".parse::<FieldOperator>().unwrap(), FieldOperator::LessThan);
    assert_eq!(
        ">=".parse::<FieldOperator>().unwrap(),
        FieldOperator::GreaterThanOrEqual
    );
    assert_eq!(
        "array-contains".parse::<FieldOperator>().unwrap(),
        FieldOperator::ArrayContains
    );
    assert!("~".parse::<FieldOperator>().is_err());

    assert_eq!("asc".parse::<Direction>().unwrap(), Direction::Ascending);
    assert_eq!("desc".parse::<Direction>().unwrap(), Direction::Descending);
    assert!("sideways".parse::<Direction>().is_err());
}

#[test]
fn auto_ids_are_twenty_alphanumeric_chars() {
    let id = auto_id();
    assert_eq!(id.len(), 20);
    assert!(id.bytes().all(|b| b.is_ascii_alphanumeric()));
    assert_ne!(auto_id(), id);
}

#[test]
fn snapshot_reads_nested_and_fallback_fields() {
    let db = offline_db();
    let reference = db.collection("customers").doc("c1");

    let mut fields = HashMap::new();
    fields.insert(
        "customer".to_string(),
        Value {
            value_type: ValueType::StringValue("Dana".to_string()),
        },
    );
    let mut address = HashMap::new();
    address.insert(
        "city".to_string(),
        Value {
            value_type: ValueType::StringValue("Reno".to_string()),
        },
    );
    fields.insert(
        "address".to_string(),
        Value {
            value_type: ValueType::MapValue(MapValue { fields: address }),
        },
    );

    let snapshot = DocumentSnapshot {
        id: "c1".to_string(),
        reference,
        document: Some(Document {
            name: "projects/demo/databases/(default)/documents/customers/c1".to_string(),
            fields,
            create_time: None,
            update_time: None,
        }),
        read_time: None,
    };

    // The stored name moved between field names over time; readers try every
    // observed variant.
    assert_eq!(
        snapshot
            .get_any::<String>(&["customerName", "customer", "fullName"])
            .unwrap()
            .as_deref(),
        Some("Dana")
    );
    assert_eq!(
        snapshot.get_field::<String>("address.city").unwrap().as_deref(),
        Some("Reno")
    );
    assert_eq!(snapshot.get_field::<String>("address.zip").unwrap(), None);
}
