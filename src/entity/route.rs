//! Route resource.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{BaseInfo, Entity, HubKey};
use crate::store::StoreOptions;

/// HTTP methods a route may match on.
const ALLOWED_METHODS: &[&str] = &[
    "GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS", "CONNECT", "TRACE", "PURGE",
];

const MAX_NAME_LENGTH: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(flatten)]
    pub base: BaseInfo,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uris: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_id: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub plugins: HashMap<String, serde_json::Value>,
    #[serde(default = "default_status")]
    pub status: u8,
}

fn default_status() -> u8 {
    1
}

impl Route {
    pub fn new(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            base: BaseInfo::default(),
            name: name.into(),
            desc: None,
            uri: Some(uri.into()),
            uris: Vec::new(),
            methods: Vec::new(),
            host: None,
            upstream_id: None,
            plugins: HashMap::new(),
            status: default_status(),
        }
    }

    /// Store options for routes under `prefix`, keyed by id.
    pub fn store_options(prefix: &str) -> StoreOptions<Route> {
        StoreOptions::new(format!("{}/routes", prefix), HubKey::Route)
            .key_func(|route: &Route| route.base.id.clone().unwrap_or_default())
            .validator(validate_route)
            .stock_check(unique_route_name)
    }
}

impl Entity for Route {
    fn base_info(&self) -> Option<&BaseInfo> {
        Some(&self.base)
    }

    fn base_info_mut(&mut self) -> Option<&mut BaseInfo> {
        Some(&mut self.base)
    }
}

fn validate_route(route: &Route) -> Result<(), String> {
    if route.name.is_empty() {
        return Err("name is required".to_string());
    }
    if route.name.len() > MAX_NAME_LENGTH {
        return Err(format!(
            "name exceeds maximum length of {} characters",
            MAX_NAME_LENGTH
        ));
    }

    match (&route.uri, route.uris.is_empty()) {
        (None, true) => return Err("one of uri or uris is required".to_string()),
        (Some(_), false) => return Err("only one of uri or uris is allowed".to_string()),
        _ => {}
    }
    if let Some(bad) = route
        .uri
        .iter()
        .chain(route.uris.iter())
        .find(|uri| !uri.starts_with('/'))
    {
        return Err(format!("uri {} must start with '/'", bad));
    }

    if let Some(bad) = route
        .methods
        .iter()
        .find(|m| !ALLOWED_METHODS.contains(&m.as_str()))
    {
        return Err(format!("method {} is not supported", bad));
    }

    if route.status > 1 {
        return Err(format!("status {} must be 0 or 1", route.status));
    }

    Ok(())
}

fn unique_route_name(candidate: &Route, existing: &Route) -> Result<(), String> {
    if candidate.name == existing.name {
        return Err(format!("route name `{}` is already used", candidate.name));
    }
    Ok(())
}
