//! Entity Module
//!
//! The capability traits every cached object implements, the shared
//! `BaseInfo` metadata record, and the sample resources served by the API.

mod consumer;
mod route;
mod user;

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

pub use consumer::Consumer;
pub use route::Route;
pub use user::User;

// == Entity ==
/// An object that can live in a [`GenericStore`](crate::store::GenericStore).
///
/// Objects that carry creation/update metadata expose it through
/// `base_info`/`base_info_mut`; the defaults report no such capability.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn base_info(&self) -> Option<&BaseInfo> {
        None
    }

    fn base_info_mut(&mut self) -> Option<&mut BaseInfo> {
        None
    }
}

// == Base Info ==
/// Identity and timestamps shared by most resources.
///
/// Timestamps are seconds since the Unix epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseInfo {
    #[serde(
        default,
        deserialize_with = "id_from_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    #[serde(default)]
    pub create_time: i64,
    #[serde(default)]
    pub update_time: i64,
}

impl BaseInfo {
    /// Stamps a new object: generates an id when absent, sets both timestamps.
    pub fn creating(&mut self, now: i64) {
        if self.id.as_deref().map_or(true, str::is_empty) {
            self.id = Some(uuid::Uuid::new_v4().simple().to_string());
        }
        self.create_time = now;
        self.update_time = now;
    }

    /// Carries identity and creation time over from the stored version.
    ///
    /// `update_time` never moves backwards, even if the clock does.
    pub fn updating(&mut self, stored: &BaseInfo, now: i64) {
        self.id = stored.id.clone();
        self.create_time = stored.create_time;
        self.update_time = now.max(stored.update_time);
    }

    /// Fills a missing id from the key the object was stored under.
    pub fn key_compat(&mut self, key: &str) {
        if self.id.is_none() && !key.is_empty() {
            self.id = Some(key.to_string());
        }
    }
}

fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Str(String),
        Int(i64),
        Uint(u64),
        Float(f64),
    }

    Ok(Option::<RawId>::deserialize(deserializer)?.map(|raw| match raw {
        RawId::Str(s) => s,
        RawId::Int(n) => n.to_string(),
        RawId::Uint(n) => n.to_string(),
        // Whole floats inside the i64 range print without a fraction
        RawId::Float(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
            (f as i64).to_string()
        }
        RawId::Float(f) => f.to_string(),
    }))
}

// == Hub Key ==
/// Identifies the resource type a store serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HubKey {
    Route,
    Consumer,
    User,
}

impl HubKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            HubKey::Route => "route",
            HubKey::Consumer => "consumer",
            HubKey::User => "user",
        }
    }
}

impl fmt::Display for HubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
