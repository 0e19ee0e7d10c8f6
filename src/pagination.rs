//! Page bookkeeping for the trip table.

/// Current page and fixed page size of the Data view.
///
/// Pages are 1-based. Moving past the last page is allowed; the caller finds
/// out there is nothing there from the empty result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationState {
    page: u64,
    page_size: u32,
}

impl PaginationState {
    /// A zero page size is bumped to 1.
    pub fn new(page_size: u32) -> Self {
        Self {
            page: 1,
            page_size: page_size.max(1),
        }
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Row offset of the first record on the current page.
    pub fn offset(&self) -> u64 {
        (self.page - 1) * u64::from(self.page_size)
    }

    pub fn next_page(&mut self) {
        self.page += 1;
    }

    /// Step back one page. Returns `false` when already on the first page.
    pub fn prev_page(&mut self) -> bool {
        if self.page > 1 {
            self.page -= 1;
            true
        } else {
            false
        }
    }

    pub fn set_page(&mut self, page: u64) {
        self.page = page.max(1);
    }
}
