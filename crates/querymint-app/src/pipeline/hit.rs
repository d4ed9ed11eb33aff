//! Input hits and their enriched counterparts.

use serde::{Deserialize, Serialize};

use crate::pipeline::query_set::QuerySet;

/// One unit of input content. Fields other than these three are ignored when
/// reading a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hit {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub content: String,
}

impl Hit {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let id = id.into();
        debug_assert!(!id.is_empty());
        Self {
            id,
            display_name: display_name.into(),
            content: content.into(),
        }
    }
}

/// Durable work product for one hit. Created once and never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedHit {
    pub id: String,
    pub display_name: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_set: Option<QuerySet>,
}

impl EnrichedHit {
    #[must_use]
    pub fn from_hit(hit: &Hit, query_set: QuerySet) -> Self {
        Self {
            id: hit.id.clone(),
            display_name: hit.display_name.clone(),
            content: hit.content.clone(),
            query_set: Some(query_set),
        }
    }
}
