use super::projection::ProjectedRow;
use serde::Serialize;

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub collection: Vec<ProjectedRow>,
    pub offset: u64,
    pub per_page: u64,
    pub size: u64,
    pub total_pages: u64,
    /// Filter properties that matched no known column.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignored: Vec<String>,
}

impl Page {
    /// `max = 0` means the whole remainder was requested: one page.
    pub fn new(collection: Vec<ProjectedRow>, total: u64, offset: u64, max: u64) -> Self {
        let total_pages = if max == 0 {
            u64::from(total > 0)
        } else {
            total.div_ceil(max)
        };
        Self {
            collection,
            offset,
            per_page: max,
            size: total,
            total_pages,
            ignored: Vec::new(),
        }
    }

    pub fn with_ignored(mut self, ignored: Vec<String>) -> Self {
        self.ignored = ignored;
        self
    }

    pub fn total(&self) -> u64 {
        self.size
    }
}
