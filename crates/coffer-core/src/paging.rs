//! Paging descriptors for listing calls.
//!
//! `PagingQuery` is additive: every field is serde-defaulted so older
//! payloads (no `sortBy`, no `queryAsJson`, `sortOrder` as a raw string)
//! still deserialize. `version` records which field set the caller meant.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, TransferError};

/// Newest query layout this crate understands.
///   1 — skip, limit, sortOrder, lastId
///   2 — adds sortBy, queryAsJson
pub const PAGING_QUERY_VERSION: u16 = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(TransferError::invalid(format!("unknown sort order: {other}"))),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        })
    }
}

/// Field a listing is ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    CreateDate,
    Size,
}

impl FromStr for SortKey {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "createDate" => Ok(Self::CreateDate),
            "size" => Ok(Self::Size),
            other => Err(TransferError::invalid(format!("unknown sortBy field: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
#[non_exhaustive]
pub struct PagingQuery {
    pub version: u16,
    pub skip: u64,
    pub limit: u64,
    pub sort_order: SortOrder,
    pub last_id: Option<String>,
    pub sort_by: Option<String>,
    pub query_as_json: Option<String>,
}

impl Default for PagingQuery {
    fn default() -> Self {
        Self {
            version: PAGING_QUERY_VERSION,
            skip: 0,
            limit: 10,
            sort_order: SortOrder::Desc,
            last_id: None,
            sort_by: None,
            query_as_json: None,
        }
    }
}

impl PagingQuery {
    pub fn new(skip: u64, limit: u64, sort_order: SortOrder) -> Self {
        Self {
            skip,
            limit,
            sort_order,
            ..Self::default()
        }
    }

    pub fn with_last_id(mut self, last_id: impl Into<String>) -> Self {
        self.last_id = Some(last_id.into());
        self
    }

    pub fn with_sort_by(mut self, field: impl Into<String>) -> Self {
        self.sort_by = Some(field.into());
        self
    }

    pub fn with_query_json(mut self, query: impl Into<String>) -> Self {
        self.query_as_json = Some(query.into());
        self
    }

    /// Reject queries this build cannot honour instead of silently
    /// ignoring fields.
    pub fn validate(&self) -> Result<()> {
        if self.version == 0 || self.version > PAGING_QUERY_VERSION {
            return Err(TransferError::invalid(format!(
                "unsupported paging query version {}",
                self.version
            )));
        }
        if self.version < 2 && (self.sort_by.is_some() || self.query_as_json.is_some()) {
            return Err(TransferError::invalid(
                "sortBy and queryAsJson require paging query version 2",
            ));
        }
        if self.limit == 0 {
            return Err(TransferError::invalid("limit must be at least 1"));
        }
        self.sort_key()?;
        self.filter()?;
        Ok(())
    }

    pub fn sort_key(&self) -> Result<SortKey> {
        self.sort_by
            .as_deref()
            .map(SortKey::from_str)
            .transpose()
            .map(Option::unwrap_or_default)
    }

    /// Parsed `queryAsJson`. Must be a JSON object when present.
    pub fn filter(&self) -> Result<Option<Map<String, Value>>> {
        let Some(raw) = self.query_as_json.as_deref() else {
            return Ok(None);
        };
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Ok(Some(map)),
            Ok(_) => Err(TransferError::invalid("queryAsJson must be a JSON object")),
            Err(e) => Err(TransferError::invalid(format!("queryAsJson: {e}"))),
        }
    }

    /// Page through `items`, which must already be in ascending order of the
    /// sort key. `total_count` counts every item, independent of the cursor.
    pub fn apply<T>(&self, mut items: Vec<T>, id_of: impl Fn(&T) -> &str) -> Result<PagingList<T>> {
        if self.sort_order == SortOrder::Desc {
            items.reverse();
        }
        let total_count = items.len() as u64;

        let start = match self.last_id.as_deref() {
            Some(last) => items
                .iter()
                .position(|item| id_of(item) == last)
                .map(|pos| pos + 1)
                .ok_or_else(|| {
                    TransferError::invalid(format!("lastId {last} is not in this listing"))
                })?,
            None => 0,
        };

        let items = items
            .into_iter()
            .skip(start)
            .skip(usize::try_from(self.skip).unwrap_or(usize::MAX))
            .take(usize::try_from(self.limit).unwrap_or(usize::MAX))
            .collect();

        Ok(PagingList { items, total_count })
    }
}

/// True if `public_meta` is a JSON object containing every key/value of `filter`.
pub fn matches_filter(filter: &Map<String, Value>, public_meta: &[u8]) -> bool {
    match serde_json::from_slice::<Value>(public_meta) {
        Ok(Value::Object(meta)) => filter.iter().all(|(k, v)| meta.get(k) == Some(v)),
        _ => false,
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagingList<T> {
    pub items: Vec<T>,
    pub total_count: u64,
}
