//! Pagination metadata and next-page bookkeeping for list consumers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The page size used by [`Pagination::page_parameters`] callers that have
/// no opinion.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Pagination metadata as returned inside a paged envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// The current page, 1-based.
    pub page: u64,
    /// Items per page.
    #[serde(default)]
    pub size: u64,
    /// The last page number.
    pub last: u64,
    /// Total number of items.
    #[serde(default)]
    pub total: u64,
}

impl Pagination {
    /// Returns `true` if another page follows this one.
    pub fn has_more(&self) -> bool {
        self.last > self.page
    }

    /// The `page` and `size` request parameters.
    pub fn page_parameters(page: u32, size: u32) -> [(String, Value); 2] {
        [
            ("page".to_string(), Value::from(page)),
            ("size".to_string(), Value::from(size)),
        ]
    }
}

/// The outcome of [`advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageState {
    /// The page to request on the next load-more trigger.
    pub next_page: u64,
    /// Whether a further page exists.
    pub has_more: bool,
}

/// Computes the next page from the current page and a response's pagination.
///
/// # Examples
///
/// ```
/// use stashline::pagination::{advance, Pagination, PageState};
///
/// let p = Pagination { page: 1, size: 20, last: 3, total: 55 };
/// assert_eq!(advance(1, &p), PageState { next_page: 2, has_more: true });
///
/// let p = Pagination { page: 3, size: 20, last: 3, total: 55 };
/// assert_eq!(advance(3, &p), PageState { next_page: 3, has_more: false });
/// ```
pub fn advance(current: u64, pagination: &Pagination) -> PageState {
    if pagination.has_more() {
        PageState {
            next_page: current.saturating_add(1),
            has_more: true,
        }
    } else {
        PageState {
            next_page: pagination.page,
            has_more: false,
        }
    }
}

/// Tracks the page a list screen should request next.
#[derive(Debug, Clone)]
pub struct PageTracker {
    first_page: u64,
    page: u64,
    has_more: bool,
}

impl PageTracker {
    /// Starts at `first_page`.
    pub fn new(first_page: u64) -> Self {
        Self {
            first_page,
            page: first_page,
            has_more: true,
        }
    }

    /// The page to request next.
    pub fn page(&self) -> u64 {
        self.page
    }

    /// Whether another page may be requested.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Whether the next request loads the first page.
    pub fn is_first_page(&self) -> bool {
        self.page == self.first_page
    }

    /// Goes back to the first page, as on pull-to-refresh.
    pub fn reset(&mut self) {
        self.page = self.first_page;
        self.has_more = true;
    }

    /// Applies a response's pagination. A response without pagination
    /// ends the list.
    pub fn apply(&mut self, pagination: Option<&Pagination>) -> PageState {
        let state = match pagination {
            Some(pagination) => advance(self.page, pagination),
            None => PageState {
                next_page: self.page,
                has_more: false,
            },
        };
        self.page = state.next_page;
        self.has_more = state.has_more;
        state
    }
}

impl Default for PageTracker {
    fn default() -> Self {
        Self::new(1)
    }
}
