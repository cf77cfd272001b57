//! Request DTOs for the admin API
//!
//! Defines the structure of incoming query strings.

use serde::Deserialize;

/// Query string of the list endpoints (`GET /apisix/admin/{resource}`)
///
/// # Fields
/// - `page`: 1-based page number (pagination is off when absent or 0)
/// - `page_size`: Rows per page
/// - `name`: Optional substring filter on the resource's name
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub page: usize,
    #[serde(default)]
    pub page_size: usize,
    #[serde(default)]
    pub name: Option<String>,
}

impl ListQuery {
    /// Validates the query
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.page > 0 && self.page_size == 0 {
            return Some("page_size is required when page is set".to_string());
        }
        None
    }
}
