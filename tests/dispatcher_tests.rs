#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Tests for response dispatch
//!
//! # Test Coverage
//!
//! - Header-only outputs and HTTP-date rendering
//! - `$schema` links on structured bodies
//! - Conditional shapes with per-shape header allowlists
//! - Dynamic status fields, raw bodies and handler errors
//! - Transformers and late failures after the status is committed
//! - JSON/YAML content negotiation for bodies and problems
//!
//! # Test Strategy
//!
//! Each test registers a small operation on a fresh `Api` and inspects the
//! `WireResponse` produced by `Api::handle`.

mod common;

use brrtbind::{ApiError, Describe, Input, Operation, Output, Reply, RequestParts, StatusError};
use chrono::{TimeZone, Utc};
use common::{api, problem};
use http::Method;
use serde::{Serialize, Serializer};
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize, Describe)]
struct Item {
    id: String,
    name: String,
}

fn item(id: &str) -> Item {
    Item {
        id: id.to_string(),
        name: "widget".to_string(),
    }
}

#[derive(Output)]
struct Touched {
    #[output(header = "ETag")]
    etag: String,
    #[output(header = "Last-Modified")]
    last_modified: chrono::DateTime<Utc>,
}

#[test]
fn test_header_only_output_is_204() {
    let mut api = api();
    api.register(Operation::post("/touch"), |_ctx, (): ()| {
        Ok(Touched {
            etag: "\"abc\"".to_string(),
            last_modified: Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap(),
        })
    })
    .unwrap();

    let response = api.handle(RequestParts::new(Method::POST, "/touch"));
    assert_eq!(response.status, 204);
    assert!(response.body.is_empty());
    assert_eq!(response.get_header("etag"), Some("\"abc\""));
    assert_eq!(
        response.get_header("last-modified"),
        Some("Sun, 06 Nov 1994 08:49:37 GMT")
    );
}

#[test]
fn test_structured_body_links_schema_first() {
    let mut api = api();
    api.register(Operation::get("/items"), |_ctx, (): ()| Ok(Reply(item("a1"))))
        .unwrap();

    let response =
        api.handle(RequestParts::new(Method::GET, "/items").header("host", "api.example.com"));
    assert_eq!(response.status, 200);
    assert_eq!(response.get_header("content-type"), Some("application/json"));
    let body = response.json().unwrap();
    let keys: Vec<&str> = body.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["$schema", "id", "name"]);
    assert_eq!(body["$schema"], "https://api.example.com/schemas/Item.json");
}

#[derive(Output)]
struct Fetched {
    #[output(header = "ETag")]
    etag: Option<String>,
    #[output(header = "Retry-After")]
    retry_after: Option<u32>,
    #[output(body(status = 200, headers = "ETag"))]
    found: Option<Item>,
    #[output(body(status = 202, headers = "Retry-After"))]
    pending: Option<()>,
}

#[derive(Input)]
struct JobInput {
    #[bind(path = "id")]
    id: String,
}

fn jobs_api() -> brrtbind::Api {
    let mut api = api();
    api.register(Operation::get("/jobs/{id}"), |_ctx, input: JobInput| {
        let etag = Some(format!("\"{}\"", input.id));
        Ok(match input.id.as_str() {
            "done" => Fetched {
                etag,
                retry_after: Some(30),
                found: Some(item("done")),
                pending: None,
            },
            "queued" => Fetched {
                etag,
                retry_after: Some(30),
                found: None,
                pending: Some(()),
            },
            _ => Fetched {
                etag,
                retry_after: None,
                found: None,
                pending: None,
            },
        })
    })
    .unwrap();
    api
}

#[test]
fn test_first_present_shape_selects_status_and_headers() {
    let api = jobs_api();

    let response = api.handle(RequestParts::new(Method::GET, "/jobs/done"));
    assert_eq!(response.status, 200);
    assert_eq!(response.get_header("etag"), Some("\"done\""));
    assert_eq!(response.get_header("retry-after"), None);
    assert_eq!(response.json().unwrap()["id"], "done");

    let response = api.handle(RequestParts::new(Method::GET, "/jobs/queued"));
    assert_eq!(response.status, 202);
    assert_eq!(response.get_header("etag"), None);
    assert_eq!(response.get_header("retry-after"), Some("30"));
    assert!(response.body.is_empty());

    let response = api.handle(RequestParts::new(Method::GET, "/jobs/gone"));
    assert_eq!(response.status, 204);
    assert_eq!(response.get_header("etag"), Some("\"gone\""));
}

#[derive(Output)]
struct Created {
    status: u16,
    #[output(header = "Location")]
    location: String,
    body: Item,
}

#[test]
fn test_dynamic_status_overrides_shape_status() {
    let mut api = api();
    api.register(Operation::post("/items"), |ctx, (): ()| {
        let status = match ctx.query_param("async") {
            Some("1") => 202,
            _ => 0,
        };
        Ok(Created {
            status,
            location: "/items/a1".to_string(),
            body: item("a1"),
        })
    })
    .unwrap();

    let response = api.handle(RequestParts::new(Method::POST, "/items?async=1"));
    assert_eq!(response.status, 202);
    assert_eq!(response.get_header("location"), Some("/items/a1"));

    let response = api.handle(RequestParts::new(Method::POST, "/items"));
    assert_eq!(response.status, 200);
    assert_eq!(response.json().unwrap()["name"], "widget");
}

#[derive(Output)]
struct Export {
    #[output(header = "Content-Disposition")]
    disposition: String,
    #[output(body(content_type = "text/csv"))]
    csv: Vec<u8>,
}

#[test]
fn test_raw_body_is_written_verbatim() {
    let mut api = api();
    api.register(Operation::get("/export"), |_ctx, (): ()| {
        Ok(Export {
            disposition: "attachment; filename=items.csv".to_string(),
            csv: b"id,name\na1,widget\n".to_vec(),
        })
    })
    .unwrap();

    let response = api.handle(RequestParts::new(Method::GET, "/export"));
    assert_eq!(response.status, 200);
    assert_eq!(response.get_header("content-type"), Some("text/csv"));
    assert_eq!(response.body_str(), "id,name\na1,widget\n");
}

#[test]
fn test_handler_error_uses_its_status() {
    let mut api = api();
    api.register(Operation::get("/secret"), |_ctx, (): ()| -> Result<Reply<Item>, ApiError> {
        Err(StatusError::forbidden("not allowed").into())
    })
    .unwrap();

    let response = api.handle(RequestParts::new(Method::GET, "/secret"));
    assert_eq!(response.status, 403);
    let body = problem(&response);
    assert_eq!(body["title"], "Forbidden");
    assert_eq!(body["status"], 403);
    assert_eq!(body["detail"], "not allowed");
}

#[test]
fn test_transformers_run_in_order_with_context() {
    let mut api = api();
    api.register(Operation::get("/items"), |_ctx, (): ()| Ok(Reply(item("a1"))))
        .unwrap();
    api.add_transformer(|cx, mut value| {
        value["links"] = json!({"describedby": cx.schema_url});
        Ok(value)
    });
    api.add_transformer(|cx, mut value| {
        value["meta"] = json!({"status": cx.status, "schema": cx.schema_name});
        Ok(value)
    });

    let response = api.handle(RequestParts::new(Method::GET, "/items"));
    assert_eq!(response.status, 200);
    let body = response.json().unwrap();
    assert_eq!(body["links"]["describedby"], "/schemas/Item.json");
    assert_eq!(body["meta"], json!({"status": 200, "schema": "Item"}));
}

#[test]
fn test_transformer_failure_keeps_committed_status() {
    let mut api = api();
    api.register(Operation::get("/items"), |_ctx, (): ()| Ok(Reply(item("a1"))))
        .unwrap();
    api.add_transformer(|_cx, _value| anyhow::bail!("cannot rewrite"));

    let response = api.handle(RequestParts::new(Method::GET, "/items"));
    assert_eq!(response.status, 200);
    assert!(response
        .get_header("content-type")
        .unwrap()
        .starts_with("text/plain"));
    assert_eq!(response.body_str(), "error transforming response");
}

#[derive(Describe)]
struct Unserializable {
    value: String,
}

impl Serialize for Unserializable {
    fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
        Err(serde::ser::Error::custom(format!(
            "cannot serialize {}",
            self.value
        )))
    }
}

#[test]
fn test_marshal_failure_keeps_committed_status() {
    let mut api = api();
    api.register(Operation::get("/broken"), |_ctx, (): ()| {
        Ok(Reply(Unserializable {
            value: "x".to_string(),
        }))
    })
    .unwrap();

    let response = api.handle(RequestParts::new(Method::GET, "/broken"));
    assert_eq!(response.status, 200);
    assert_eq!(response.body_str(), "error marshaling response");
}

#[test]
fn test_yaml_negotiation() {
    let mut api = api();
    api.register(Operation::get("/items"), |_ctx, (): ()| Ok(Reply(item("a1"))))
        .unwrap();

    let response = api.handle(
        RequestParts::new(Method::GET, "/items")
            .header("accept", "application/json;q=0.4, application/yaml"),
    );
    assert_eq!(response.status, 200);
    assert_eq!(response.get_header("content-type"), Some("application/yaml"));
    let body: Value = serde_yaml::from_slice(&response.body).unwrap();
    assert_eq!(body["id"], "a1");

    let response =
        api.handle(RequestParts::new(Method::GET, "/missing").header("accept", "text/yaml"));
    assert_eq!(response.status, 404);
    assert_eq!(
        response.get_header("content-type"),
        Some("application/problem+yaml")
    );
    let body: Value = serde_yaml::from_slice(&response.body).unwrap();
    assert_eq!(body["title"], "Not Found");
}
