//! Dashboard user resource.

use serde::{Deserialize, Serialize};

use super::{BaseInfo, Entity, HubKey};
use crate::store::StoreOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(flatten)]
    pub base: BaseInfo,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teams_id: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: BaseInfo::default(),
            name: name.into(),
            teams_id: None,
            desc: None,
        }
    }

    /// Store options for users under `prefix`, keyed by id.
    pub fn store_options(prefix: &str) -> StoreOptions<User> {
        StoreOptions::new(format!("{}/users", prefix), HubKey::User)
            .key_func(|user: &User| user.base.id.clone().unwrap_or_default())
            .validator(|user: &User| {
                if user.name.trim().is_empty() {
                    Err("name is required".to_string())
                } else {
                    Ok(())
                }
            })
            .stock_check(|candidate: &User, existing: &User| {
                if candidate.name == existing.name {
                    Err(format!("user name `{}` is already used", candidate.name))
                } else {
                    Ok(())
                }
            })
    }
}

impl Entity for User {
    fn base_info(&self) -> Option<&BaseInfo> {
        Some(&self.base)
    }

    fn base_info_mut(&mut self) -> Option<&mut BaseInfo> {
        Some(&mut self.base)
    }
}
