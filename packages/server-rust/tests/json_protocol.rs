//! JSON protocol dispatch against the `dynamodb` fixture.

mod common;

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use http::{HeaderName, HeaderValue, Method, StatusCode};
use mockstack_core::Value;
use mockstack_server::register_operations;
use mockstack_server::service::{HandlerRegistryBuilder, RegistryError, ServiceRequest};
use mockstack_server::{OperationError, RequestContext, ServiceException, ServiceHandler, Skeleton};
use serde_json::{json, Value as Json};

use common::{client_request, error_code, parse, request_id};

struct Tables;

impl Tables {
    async fn describe_table(&self, _ctx: RequestContext, input: Value) -> Result<Value, OperationError> {
        let name = input.get("TableName").and_then(Value::as_str).unwrap_or_default();
        if name != "orders" {
            return Err(ServiceException::new(
                "ResourceNotFoundException",
                format!("Requested resource not found: Table: {name} not found"),
            )
            .into());
        }
        let created = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        Ok(Value::structure([(
            "Table",
            Value::structure([
                ("TableName", Value::from("orders")),
                ("TableStatus", Value::from("ACTIVE")),
                ("CreationDateTime", Value::from(created)),
                ("ItemCount", Value::from(42_i64)),
            ]),
        )]))
    }

    async fn put_item(&self, _ctx: RequestContext, input: Value) -> Result<Value, OperationError> {
        let item = input.get("Item").cloned().unwrap_or_else(|| Value::map::<String, _>([]));
        Ok(Value::structure([
            ("Attributes", item),
            ("ConsumedCapacityUnits", Value::from(1.5)),
        ]))
    }
}

impl ServiceHandler for Tables {
    fn register(self: Arc<Self>, builder: &mut HandlerRegistryBuilder) -> Result<(), RegistryError> {
        register_operations!(self, builder, {
            "DescribeTable" => describe_table,
            "PutItem" => put_item,
        })
    }
}

fn dynamodb() -> Arc<Skeleton> {
    let mut router = common::router();
    router.register("dynamodb", Arc::new(Tables)).unwrap();
    router.skeleton("dynamodb").unwrap()
}

fn call(target: &'static str, body: &str) -> ServiceRequest {
    ServiceRequest::new(Method::POST, "/")
        .with_header(
            HeaderName::from_static("x-amz-target"),
            HeaderValue::from_static(target),
        )
        .with_header(
            HeaderName::from_static("content-type"),
            HeaderValue::from_static("application/x-amz-json-1.0"),
        )
        .with_body(body.to_string())
}

fn body(response: &mockstack_server::service::ServiceResponse) -> Json {
    serde_json::from_slice(&response.body).unwrap()
}

#[tokio::test]
async fn describe_table_encodes_epoch_timestamps() {
    let skeleton = dynamodb();
    let response = skeleton
        .invoke(call("DynamoDB_20120810.DescribeTable", r#"{"TableName": "orders"}"#))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("application/x-amz-json-1.0"));
    assert_eq!(
        body(&response),
        json!({"Table": {
            "TableName": "orders",
            "TableStatus": "ACTIVE",
            "CreationDateTime": 1_704_164_645,
            "ItemCount": 42
        }})
    );
}

#[tokio::test]
async fn declared_error_uses_type_field() {
    let skeleton = dynamodb();
    let response = skeleton
        .invoke(call("DynamoDB_20120810.DescribeTable", r#"{"TableName": "missing"}"#))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let json = body(&response);
    assert_eq!(json["__type"], "ResourceNotFoundException");
    assert_eq!(
        json["message"],
        "Requested resource not found: Table: missing not found"
    );

    let parsed = parse(&skeleton, "DescribeTable", &response);
    assert_eq!(error_code(&parsed), "ResourceNotFoundException");
}

#[tokio::test]
async fn nested_maps_and_blobs_round_trip() {
    let skeleton = dynamodb();
    let input = Value::structure([
        ("TableName", Value::from("orders")),
        (
            "Item",
            Value::map([
                ("pk", Value::structure([("S", Value::from("order#1"))])),
                ("payload", Value::structure([("B", Value::from(vec![0_u8, 159, 255]))])),
                ("paid", Value::structure([("BOOL", Value::from(true))])),
            ]),
        ),
    ]);

    let response = skeleton.invoke(client_request(&skeleton, "PutItem", &input)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(body(&response)["Attributes"]["payload"]["B"], "AJ//");

    let parsed = parse(&skeleton, "PutItem", &response);
    assert_eq!(parsed.get("Attributes"), input.get("Item"));
    assert_eq!(parsed.get("ConsumedCapacityUnits"), Some(&Value::from(1.5)));
    assert_eq!(request_id(&parsed), response.header("x-amzn-requestid").unwrap());
}

#[tokio::test]
async fn missing_required_member_is_400() {
    let skeleton = dynamodb();
    let response = skeleton
        .invoke(call("DynamoDB_20120810.PutItem", r#"{"TableName": "orders"}"#))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(body(&response)["__type"], "MissingParameter");
}

#[tokio::test]
async fn type_mismatch_and_malformed_bodies_are_serialization_errors() {
    let skeleton = dynamodb();
    for payload in [r#"{"TableName": 7}"#, "{not json"] {
        let response = skeleton
            .invoke(call("DynamoDB_20120810.DescribeTable", payload))
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(body(&response)["__type"], "SerializationException");
    }
}

#[tokio::test]
async fn unknown_target_and_missing_header_are_404() {
    let skeleton = dynamodb();

    let response = skeleton.invoke(call("DynamoDB_20120810.DropEverything", "{}")).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(body(&response)["__type"], "UnknownOperationException");

    let response = skeleton.invoke(call("Kinesis_20131202.ListTables", "{}")).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = skeleton
        .invoke(ServiceRequest::new(Method::POST, "/").with_body("{}"))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn registered_service_without_handler_is_501() {
    let skeleton = dynamodb();
    let response = skeleton.invoke(call("DynamoDB_20120810.ListTables", "")).await;
    assert_eq!(response.status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(
        body(&response)["message"],
        "API action 'ListTables' for service 'dynamodb' not yet implemented"
    );
}
