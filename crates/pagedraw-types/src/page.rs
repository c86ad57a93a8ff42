//! Remote page results and fetch requests.

use serde::{Deserialize, Serialize};

use crate::FilterSet;

/// One entry of the remote collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Item {
    pub id: u64,
    pub name: String,
}

impl Item {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A successful remote response. An empty page is still a success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResult {
    pub items: Vec<Item>,
    /// Total reported by the remote. May be absent or wrong.
    pub declared_total: Option<u64>,
}

impl PageResult {
    #[must_use]
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            items,
            declared_total: None,
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_declared_total(mut self, total: u64) -> Self {
        self.declared_total = Some(total);
        self
    }

    #[inline]
    #[must_use]
    pub fn count(&self) -> usize {
        self.items.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A single remote query issued by a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchRequest {
    /// One page of the filtered collection.
    Page { filters: FilterSet, page: u32 },
    /// Direct lookup by id. Returns zero or one items.
    ById { id: u64 },
    /// Most recently published items, newest first.
    Recent,
}

impl FetchRequest {
    /// Page index for paged requests.
    #[must_use]
    pub fn page(&self) -> Option<u32> {
        match self {
            Self::Page { page, .. } => Some(*page),
            Self::ById { .. } | Self::Recent => None,
        }
    }
}

/// How a session selects its item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Random id probing over the whole catalog.
    Chaos,
    /// Boundary discovery over a filtered collection.
    Smart,
}

impl SearchMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chaos => "chaos",
            Self::Smart => "smart",
        }
    }
}
