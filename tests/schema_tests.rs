#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Tests for schema derivation, the schema endpoint and registration checks
//!
//! # Test Coverage
//!
//! - `GET {schemas_path}/{Name}.json` documents and their `$id`
//! - Recursive types rendered with self references
//! - Generated documents accepted by an independent JSON Schema validator
//! - Every registration error surfaced by `Api::register`
//! - Permissive and strict `oneOf` handling
//!
//! # Test Strategy
//!
//! Schemas are produced through `Api::register` exactly as applications do,
//! then inspected as JSON documents.

mod common;

use brrtbind::error::{RegistrationError, SchemaError};
use brrtbind::schema::{Schema, JSON_SCHEMA_DIALECT};
use brrtbind::{Api, BindConfig, Describe, Input, Operation, Output, Reply, RequestParts};
use common::{api, entries, pairs, problem};
use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Serialize, Deserialize, Describe)]
struct Item {
    /// Stable identifier.
    id: String,
    #[bind(max_length = 32)]
    name: String,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Input)]
struct CreateItem {
    body: Item,
}

fn item_api() -> Api {
    let mut api = api();
    api.register(Operation::post("/items"), |_ctx, input: CreateItem| {
        Ok(Reply(input.body))
    })
    .unwrap();
    api
}

#[test]
fn test_schema_endpoint_serves_documents() {
    let api = item_api();
    let response = api.handle(
        RequestParts::new(Method::GET, "/schemas/Item.json").header("host", "api.example.com"),
    );
    assert_eq!(response.status, 200);
    assert_eq!(
        response.get_header("content-type"),
        Some("application/schema+json")
    );
    let doc = response.json().unwrap();
    assert_eq!(doc["$schema"], JSON_SCHEMA_DIALECT);
    assert_eq!(doc["$id"], "https://api.example.com/schemas/Item.json");
    assert_eq!(doc["type"], "object");
    assert_eq!(doc["properties"]["name"]["maxLength"], 32);
    assert_eq!(doc["properties"]["id"]["description"], "Stable identifier.");
    assert_eq!(doc["properties"]["$schema"]["readOnly"], true);
    assert_eq!(doc["required"], json!(["id", "name"]));
}

#[test]
fn test_unknown_schema_is_404() {
    let api = item_api();
    let response = api.handle(RequestParts::new(Method::GET, "/schemas/Nope.json"));
    assert_eq!(response.status, 404);
    assert_eq!(problem(&response)["title"], "Not Found");
}

#[test]
fn test_generated_documents_compile() {
    let api = item_api();
    for name in ["Item", "ErrorModel"] {
        let doc = api.schema_document(name, Some("api.example.com")).unwrap();
        let validator = jsonschema::validator_for(&doc)
            .unwrap_or_else(|err| panic!("{name} does not compile: {err}"));
        if name == "Item" {
            assert!(validator.is_valid(&json!({"id": "a1", "name": "widget"})));
            assert!(!validator.is_valid(&json!({"id": "a1"})));
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Describe)]
struct Node {
    value: String,
    children: Vec<Node>,
}

#[derive(Input)]
struct NodeInput {
    body: Node,
}

#[test]
fn test_recursive_type() {
    let mut api = api();
    api.register(Operation::post("/nodes"), |_ctx, input: NodeInput| {
        Ok(Reply(input.body))
    })
    .unwrap();

    let doc = api.schema_document("Node", None).unwrap();
    assert_eq!(doc["properties"]["children"]["items"], json!({"$ref": "#"}));
    assert!(doc.get("$defs").is_none());
    let validator = jsonschema::validator_for(&doc).unwrap();
    assert!(validator.is_valid(&json!({
        "value": "root",
        "children": [{"value": "leaf", "children": []}],
    })));

    let response = api.handle(RequestParts::new(Method::POST, "/nodes").json(&json!({
        "value": "root",
        "children": [{"value": "leaf", "children": [{"children": []}]}],
    })));
    assert_eq!(response.status, 422);
    let found = entries(&problem(&response));
    assert_eq!(
        pairs(&found),
        vec![("body.children[0].children[0].value", "required property is missing")]
    );
}

mod first {
    use brrtbind::Describe;
    use serde::Serialize;

    #[derive(Serialize, Describe)]
    #[bind(schema_name = "Thing")]
    pub struct Thing {
        pub a: String,
    }
}

mod second {
    use brrtbind::Describe;
    use serde::Serialize;

    #[derive(Serialize, Describe)]
    #[bind(schema_name = "Thing")]
    pub struct Thing {
        pub b: i64,
    }
}

#[test]
fn test_schema_name_conflict() {
    let mut api = api();
    api.register(Operation::get("/first"), |_ctx, (): ()| {
        Ok(Reply(first::Thing { a: "a".into() }))
    })
    .unwrap();
    let err = api
        .register(Operation::get("/second"), |_ctx, (): ()| {
            Ok(Reply(second::Thing { b: 1 }))
        })
        .unwrap_err();
    assert!(
        matches!(
            err,
            RegistrationError::Schema(SchemaError::SchemaNameConflict { ref name, .. }) if name == "Thing"
        ),
        "unexpected error {err}"
    );
    assert_eq!(api.operations().len(), 1);
}

#[derive(Output)]
struct BadHeaders {
    #[output(body(headers = "X-Missing"))]
    body: Item,
}

#[derive(Input)]
struct JobInput {
    #[bind(path = "id")]
    id: String,
}

#[derive(Input)]
struct BadDefault {
    #[bind(query = "limit", maximum = 100, default = 500)]
    limit: i64,
}

#[derive(Input)]
struct BadParam {
    #[bind(query = "filter")]
    filter: Item,
}

fn item() -> Item {
    Item {
        id: "a1".into(),
        name: "widget".into(),
        tags: Vec::new(),
    }
}

#[test]
fn test_registration_errors() {
    let mut api = api();

    let err = api
        .register(Operation::get("/bad-headers"), |_ctx, (): ()| {
            Ok(BadHeaders { body: item() })
        })
        .unwrap_err();
    assert!(matches!(err, RegistrationError::UndeclaredHeader { shape: 0, ref header } if header == "X-Missing"));

    let err = api
        .register(Operation::get("/jobs/{id}"), |_ctx, (): ()| Ok(()))
        .unwrap_err();
    assert!(matches!(err, RegistrationError::UnboundPathParameter { ref name, .. } if name == "id"));

    let err = api
        .register(Operation::get("jobs"), |_ctx, (): ()| Ok(()))
        .unwrap_err();
    assert!(matches!(err, RegistrationError::InvalidPath { .. }));

    let err = api
        .register(Operation::get("/limited"), |_ctx, _input: BadDefault| Ok(()))
        .unwrap_err();
    match err {
        RegistrationError::InvalidDefault {
            location, message, ..
        } => {
            assert_eq!(location, "query.limit");
            assert_eq!(message, "expected number <= 100");
        }
        other => panic!("unexpected error {other}"),
    }

    let err = api
        .register(Operation::get("/filtered"), |_ctx, _input: BadParam| Ok(()))
        .unwrap_err();
    assert!(matches!(err, RegistrationError::UnsupportedParameter { ref location, .. } if location == "query.filter"));

    api.register(
        Operation::get("/jobs/{id}").operation_id("get-job"),
        |_ctx, _input: JobInput| Ok(()),
    )
    .unwrap();
    let err = api
        .register(
            Operation::get("/jobs/{key}").operation_id("get-job-by-key"),
            |_ctx, _input: JobInput| Ok(()),
        )
        .unwrap_err();
    assert!(matches!(err, RegistrationError::UnboundPathParameter { .. }));
    let err = api
        .register(
            Operation::get("/jobs/{id}").operation_id("get-job-again"),
            |_ctx, _input: JobInput| Ok(()),
        )
        .unwrap_err();
    assert!(matches!(err, RegistrationError::DuplicateRoute { .. }));
    let err = api
        .register(
            Operation::delete("/jobs/{id}").operation_id("get-job"),
            |_ctx, _input: JobInput| Ok(()),
        )
        .unwrap_err();
    assert!(matches!(err, RegistrationError::DuplicateOperationId(ref id) if id == "get-job"));

    assert_eq!(api.operations().len(), 1);
}

#[derive(Input)]
struct AmountInput {
    raw_body: Vec<u8>,
}

fn amount_api(strict: bool) -> Api {
    let mut api = Api::new(BindConfig {
        strict_one_of: strict,
        ..BindConfig::default()
    });
    api.register(
        Operation::post("/amounts").body_schema(Schema::one_of([Schema::integer(), Schema::number()])),
        |_ctx, input: AmountInput| Ok(Reply(input.raw_body.len())),
    )
    .unwrap();
    api
}

#[test]
fn test_unknown_reference_rejected_at_registration() {
    let mut api = api();
    let err = api
        .register(
            Operation::post("/amounts").body_schema(Schema::reference("Missing", false)),
            |_ctx, input: AmountInput| Ok(Reply(input.raw_body.len())),
        )
        .unwrap_err();
    assert!(
        matches!(
            err,
            RegistrationError::Schema(SchemaError::UnresolvedReference { ref name }) if name == "Missing"
        ),
        "unexpected error {err}"
    );
    assert!(api.operations().is_empty());
}

#[test]
fn test_one_of_permissive_and_strict() {
    let request = || RequestParts::new(Method::POST, "/amounts").json(&json!(3));

    let response = amount_api(false).handle(request());
    assert_eq!(response.status, 200, "{}", response.body_str());

    let response = amount_api(true).handle(request());
    assert_eq!(response.status, 422);
    let found = entries(&problem(&response));
    assert_eq!(
        pairs(&found),
        vec![("body", "expected value to match exactly one schema but matched 2")]
    );

    let response = amount_api(true).handle(
        RequestParts::new(Method::POST, "/amounts").json(&json!(2.5)),
    );
    assert_eq!(response.status, 200, "{}", response.body_str());
}
