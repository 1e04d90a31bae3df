//! Listing pagination heuristics
//!
//! Thresholds are fixed usability values and are reproduced exactly.

use serde::{Deserialize, Serialize};

use crate::allocator::{GROUP_SIZE, group_index};

/// How a quota-bounded collection should be paged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationPlan {
    pub use_groups: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_per_group: Option<u32>,
    pub page_size: u32,
}

impl PaginationPlan {
    fn flat(page_size: u32) -> Self {
        Self {
            use_groups: false,
            items_per_group: None,
            page_size,
        }
    }

    /// Row offset of a 1-based page, optionally inside a lettered group
    ///
    /// Page 0 is treated as page 1. Unknown group labels, and labels whose
    /// offset does not fit in `u64`, fall back to the first group.
    pub fn offset(&self, page: u32, group: Option<&str>) -> u64 {
        let page_offset = u64::from(page.max(1) - 1) * u64::from(self.page_size);
        if !self.use_groups {
            return page_offset;
        }
        let per_group = self
            .items_per_group
            .map(u64::from)
            .unwrap_or(GROUP_SIZE);
        group
            .and_then(group_index)
            .and_then(|index| index.checked_mul(per_group))
            .and_then(|offset| offset.checked_add(page_offset))
            .unwrap_or(page_offset)
    }

    /// Pages needed for `count` rows
    pub fn page_count(&self, count: u64) -> u64 {
        count.div_ceil(u64::from(self.page_size.max(1)))
    }
}

/// Choose page size and grouping for a listing
pub fn plan(target_quota: u32, total_count: u64, items_per_group: u32) -> PaginationPlan {
    if total_count >= 100 {
        PaginationPlan {
            use_groups: true,
            items_per_group: Some(items_per_group),
            page_size: 10,
        }
    } else if target_quota <= 100 && total_count <= 50 {
        PaginationPlan::flat(10)
    } else if total_count > 50 && total_count <= 60 {
        PaginationPlan::flat(15)
    } else if total_count > 60 && total_count <= 100 {
        PaginationPlan::flat(20)
    } else {
        PaginationPlan::flat(10)
    }
}
