#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Tests for routing and host router adapters
//!
//! # Test Coverage
//!
//! - Mounting operations on a host router with colon and regex paths
//! - `Api::paths` grouping and generated operation ids
//! - Percent-decoded path parameters and method mismatches
//!
//! # Test Strategy
//!
//! A recording `RouteAdapter` stands in for the host framework's router.

mod common;

use brrtbind::error::RegistrationError;
use brrtbind::router::to_regex_pattern;
use brrtbind::{Input, Operation, Reply, RequestParts, RouteAdapter};
use common::api;
use http::Method;
use serde_json::json;

#[derive(Input)]
struct FileInput {
    #[bind(path = "name")]
    name: String,
}

#[derive(Input)]
struct ErrorInput {
    #[bind(path = "id")]
    id: String,
}

fn file_api() -> brrtbind::Api {
    let mut api = api();
    api.register(Operation::get("/files/{name}"), |_ctx, input: FileInput| {
        Ok(Reply(json!({"name": input.name})))
    })
    .unwrap();
    api.register(Operation::put("/errors/{id}"), |_ctx, input: ErrorInput| {
        Ok(Reply(json!({"id": input.id})))
    })
    .unwrap();
    api.register(
        Operation::delete("/errors/{id}").operation_id("remove-error"),
        |_ctx, _input: ErrorInput| Ok(()),
    )
    .unwrap();
    api
}

#[derive(Default)]
struct Recorder {
    routes: Vec<(Method, String, String)>,
}

impl RouteAdapter for Recorder {
    fn add_route(&mut self, method: &Method, path: &str, operation_id: &str) {
        self.routes
            .push((method.clone(), path.to_string(), operation_id.to_string()));
    }
}

struct RegexRecorder(Recorder);

impl RouteAdapter for RegexRecorder {
    fn add_route(&mut self, method: &Method, path: &str, operation_id: &str) {
        self.0.add_route(method, path, operation_id);
    }

    fn native_path(&self, path: &str) -> Result<String, RegistrationError> {
        to_regex_pattern(path)
    }
}

#[test]
fn test_mount_with_colon_paths() {
    let api = file_api();
    let mut recorder = Recorder::default();
    api.mount(&mut recorder).unwrap();
    assert_eq!(
        recorder.routes,
        vec![
            (Method::GET, "/files/:name".to_string(), "get-files-by-name".to_string()),
            (Method::PUT, "/errors/:id".to_string(), "put-errors-by-id".to_string()),
            (Method::DELETE, "/errors/:id".to_string(), "remove-error".to_string()),
        ]
    );
}

#[test]
fn test_mount_with_native_path_override() {
    let api = file_api();
    let mut recorder = RegexRecorder(Recorder::default());
    api.mount(&mut recorder).unwrap();
    assert_eq!(recorder.0.routes[0].1, "^/files/([^/]+)$");
}

#[test]
fn test_paths_group_by_pattern_and_method() {
    let api = file_api();
    let paths = api.paths();
    assert_eq!(
        paths.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["/errors/{id}", "/files/{name}"]
    );
    let errors = &paths["/errors/{id}"];
    assert_eq!(errors["PUT"].operation_id, "put-errors-by-id");
    assert_eq!(errors["DELETE"].operation_id, "remove-error");
}

#[test]
fn test_path_parameters_are_decoded() {
    let api = file_api();
    let response = api.handle(RequestParts::new(Method::GET, "/files/hello%20world.txt"));
    assert_eq!(response.status, 200, "{}", response.body_str());
    assert_eq!(response.json().unwrap()["name"], "hello world.txt");
}

#[test]
fn test_method_mismatch_is_not_found() {
    let api = file_api();
    let response = api.handle(RequestParts::new(Method::POST, "/files/a"));
    assert_eq!(response.status, 404);
    let response = api.handle(RequestParts::new(Method::GET, "/files/a/b"));
    assert_eq!(response.status, 404);
}
