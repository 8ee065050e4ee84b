//! Request handlers — thin extract → service → JSON delegation.

pub mod assessments;
pub mod drafts;
pub mod evidence;
pub mod exports;
pub mod files;
pub mod health;
pub mod ingest;
pub mod logging;
pub mod mappings;
pub mod organizations;
pub mod sections;
pub mod systems;
pub mod users;
pub mod versions;

use serde::{Deserialize, Serialize};

/// Shared pagination query parameters.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    100
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn clamped(self, max: i64) -> Self {
        Self {
            limit: self.limit.clamp(1, max),
            offset: self.offset.max(0),
        }
    }
}

/// Standard list envelope.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}
