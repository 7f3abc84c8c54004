//! Data-access operation kinds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::QueryCacheError;

/// An operation the data-access layer can run against a model.
///
/// Serializes as the camelCase operation name (e.g. `"findMany"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    FindUnique,
    FindUniqueOrThrow,
    FindFirst,
    FindFirstOrThrow,
    FindMany,
    Count,
    GroupBy,
    Aggregate,
    Create,
    CreateMany,
    Update,
    UpdateMany,
    Upsert,
    Delete,
    DeleteMany,
}

impl Operation {
    /// Every operation kind, reads first.
    pub const ALL: [Operation; 15] = [
        Self::FindUnique,
        Self::FindUniqueOrThrow,
        Self::FindFirst,
        Self::FindFirstOrThrow,
        Self::FindMany,
        Self::Count,
        Self::GroupBy,
        Self::Aggregate,
        Self::Create,
        Self::CreateMany,
        Self::Update,
        Self::UpdateMany,
        Self::Upsert,
        Self::Delete,
        Self::DeleteMany,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FindUnique => "findUnique",
            Self::FindUniqueOrThrow => "findUniqueOrThrow",
            Self::FindFirst => "findFirst",
            Self::FindFirstOrThrow => "findFirstOrThrow",
            Self::FindMany => "findMany",
            Self::Count => "count",
            Self::GroupBy => "groupBy",
            Self::Aggregate => "aggregate",
            Self::Create => "create",
            Self::CreateMany => "createMany",
            Self::Update => "update",
            Self::UpdateMany => "updateMany",
            Self::Upsert => "upsert",
            Self::Delete => "delete",
            Self::DeleteMany => "deleteMany",
        }
    }

    /// Whether a `cache` directive on this operation is honoured.
    ///
    /// Lookups, listings and counting/grouping only. `aggregate` and all
    /// writes always pass through.
    pub fn is_cacheable(&self) -> bool {
        matches!(
            self,
            Self::FindUnique
                | Self::FindUniqueOrThrow
                | Self::GroupBy
                | Self::FindMany
                | Self::FindFirst
                | Self::FindFirstOrThrow
                | Self::Count
        )
    }

    /// Read operations that cannot be issued without an argument set.
    pub fn requires_args(&self) -> bool {
        matches!(self, Self::FindUnique | Self::FindUniqueOrThrow | Self::GroupBy)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = QueryCacheError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| QueryCacheError::Configuration(format!("unknown operation: {s}")))
    }
}
