//! Validation of the endpoint manifest (manifest/endpoints.toml).
//!
//! These tests keep the manifest syntactically valid as endpoints are added
//! or modified, and check that it agrees with the paths the library uses.

use serde::Deserialize;

use eaactl::auth::ApiGeneration;
use eaactl::eventlog::LogType;

/// Top-level manifest structure matching the TOML schema.
#[derive(Debug, Deserialize)]
struct Manifest {
    meta: Meta,
    endpoints: Vec<Endpoint>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Meta {
    schema_version: u32,
    last_validated: String,
}

/// A single endpoint entry in the manifest.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Endpoint {
    family: String,
    name: String,
    method: String,
    generation: String,
    path: String,
    #[serde(default)]
    query: Vec<String>,
    response_status: u16,
    implemented: bool,
    #[serde(default)]
    notes: String,
}

fn load() -> Manifest {
    let content = std::fs::read_to_string("manifest/endpoints.toml")
        .expect("manifest/endpoints.toml should exist and be readable");
    toml::from_str(&content).expect("manifest/endpoints.toml should be valid TOML")
}

fn find<'a>(manifest: &'a Manifest, name: &str) -> &'a Endpoint {
    manifest
        .endpoints
        .iter()
        .find(|ep| ep.name == name)
        .unwrap_or_else(|| panic!("endpoint '{name}' missing from manifest"))
}

#[test]
fn manifest_endpoints_toml_is_valid() {
    let manifest = load();

    assert!(
        manifest.meta.schema_version >= 1,
        "schema_version must be at least 1"
    );
    assert!(
        !manifest.endpoints.is_empty(),
        "manifest should contain at least one endpoint"
    );

    for ep in &manifest.endpoints {
        assert!(!ep.family.is_empty(), "endpoint family must not be empty");
        assert!(!ep.name.is_empty(), "endpoint name must not be empty");
        assert!(!ep.method.is_empty(), "endpoint method must not be empty");
        assert!(!ep.path.is_empty(), "endpoint path must not be empty");
        assert!(
            !ep.path.starts_with('/'),
            "endpoint '{}' path must be relative to the generation base",
            ep.name
        );
    }
}

#[test]
fn manifest_endpoint_methods_and_generations_are_valid() {
    let manifest = load();

    let valid_methods = ["GET", "POST", "PUT", "PATCH", "DELETE"];
    for ep in &manifest.endpoints {
        assert!(
            valid_methods.contains(&ep.method.as_str()),
            "endpoint '{}' has invalid method '{}', expected one of {:?}",
            ep.name,
            ep.method,
            valid_methods
        );
        assert!(
            ["legacy", "current"].contains(&ep.generation.as_str()),
            "endpoint '{}' has unknown generation '{}'",
            ep.name,
            ep.generation
        );
    }
}

#[test]
fn manifest_log_endpoints_match_library() {
    let manifest = load();

    for (name, log_type) in [("access_logs", LogType::Access), ("admin_logs", LogType::Admin)] {
        let ep = find(&manifest, name);
        let endpoint = log_type.endpoint();
        assert!(ep.implemented, "'{name}' should be marked as implemented");
        assert_eq!(ep.path, endpoint.path);
        assert_eq!(endpoint.generation, ApiGeneration::Legacy);
        assert_eq!(ep.generation, "legacy");
        for param in ["sts", "ets", "limit"] {
            assert!(
                ep.query.iter().any(|q| q == param),
                "'{name}' should document the '{param}' parameter"
            );
        }
    }
}

#[test]
fn manifest_has_implemented_listing_endpoints() {
    let manifest = load();

    for name in ["list_idps", "list_connectors"] {
        let ep = find(&manifest, name);
        assert!(ep.implemented, "'{name}' should be marked as implemented");
        assert_eq!(ep.generation, "current");
        assert_eq!(ep.method, "GET");
    }
}
