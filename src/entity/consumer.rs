//! Consumer resource.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{BaseInfo, Entity, HubKey};
use crate::store::StoreOptions;

const KEY_AUTH_PLUGIN: &str = "key-auth";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consumer {
    #[serde(flatten)]
    pub base: BaseInfo,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub plugins: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

impl Consumer {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            base: BaseInfo::default(),
            username: username.into(),
            desc: None,
            plugins: HashMap::new(),
            labels: HashMap::new(),
        }
    }

    /// Adds a key-auth credential.
    pub fn with_key_auth(mut self, key: impl Into<String>) -> Self {
        self.plugins.insert(
            KEY_AUTH_PLUGIN.to_string(),
            serde_json::json!({ "key": key.into() }),
        );
        self
    }

    /// The key-auth credential, if configured.
    pub fn key_auth(&self) -> Option<&str> {
        self.plugins
            .get(KEY_AUTH_PLUGIN)
            .and_then(|conf| conf.get("key"))
            .and_then(|key| key.as_str())
    }

    /// Store options for consumers under `prefix`, keyed by username.
    pub fn store_options(prefix: &str) -> StoreOptions<Consumer> {
        StoreOptions::new(format!("{}/consumers", prefix), HubKey::Consumer)
            .key_func(|consumer: &Consumer| consumer.username.clone())
            .validator(validate_consumer)
            .stock_check(unique_credential)
    }
}

impl Entity for Consumer {
    fn base_info(&self) -> Option<&BaseInfo> {
        Some(&self.base)
    }

    fn base_info_mut(&mut self) -> Option<&mut BaseInfo> {
        Some(&mut self.base)
    }
}

fn validate_consumer(consumer: &Consumer) -> Result<(), String> {
    if consumer.username.is_empty() {
        return Err("username is required".to_string());
    }
    if !consumer
        .username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(format!(
            "username {} may only contain letters, digits and '_'",
            consumer.username
        ));
    }
    if consumer.plugins.contains_key(KEY_AUTH_PLUGIN) && consumer.key_auth().is_none() {
        return Err("key-auth requires a string key".to_string());
    }
    Ok(())
}

/// No two consumers may share a key-auth credential.
fn unique_credential(candidate: &Consumer, existing: &Consumer) -> Result<(), String> {
    match (candidate.key_auth(), existing.key_auth()) {
        (Some(a), Some(b)) if a == b => Err(format!(
            "key-auth credential is already used by consumer {}",
            existing.username
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username() {
        assert!(validate_consumer(&Consumer::new("jack_1")).is_ok());
        assert!(validate_consumer(&Consumer::new("")).is_err());
        assert!(validate_consumer(&Consumer::new("jack-1")).is_err());
    }

    #[test]
    fn test_validate_key_auth_shape() {
        let mut consumer = Consumer::new("jack");
        consumer
            .plugins
            .insert(KEY_AUTH_PLUGIN.to_string(), serde_json::json!({ "key": 7 }));
        assert!(validate_consumer(&consumer).is_err());
    }

    #[test]
    fn test_unique_credential() {
        let jack = Consumer::new("jack").with_key_auth("secret");
        let rose = Consumer::new("rose").with_key_auth("secret");
        let tom = Consumer::new("tom").with_key_auth("other");
        let bare = Consumer::new("bare");

        assert!(unique_credential(&rose, &jack).is_err());
        assert!(unique_credential(&tom, &jack).is_ok());
        assert!(unique_credential(&bare, &jack).is_ok());
    }
}
