use serde::{Deserialize, Serialize};
use std::num::NonZeroU64;
use thiserror::Error;

/// Default number of posts on one page of a listing.
pub const DEFAULT_PAGE_SIZE: NonZeroU64 = NonZeroU64::new(3).unwrap();

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
#[error("Page {page} does not exist, there are {total_pages} pages")]
pub struct PageOutOfRangeError {
    pub page: u64,
    pub total_pages: u64,
}

/// A 1-based page number and a page size.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct PageRequest {
    page: NonZeroU64,
    size: NonZeroU64,
}

impl PageRequest {
    #[must_use]
    pub fn new(page: NonZeroU64, size: NonZeroU64) -> Self {
        Self { page, size }
    }

    #[must_use]
    pub fn first(size: NonZeroU64) -> Self {
        Self::new(NonZeroU64::MIN, size)
    }

    #[must_use]
    pub fn page(self) -> u64 {
        self.page.get()
    }

    #[must_use]
    pub fn size(self) -> u64 {
        self.size.get()
    }

    #[must_use]
    pub fn offset(self) -> u64 {
        (self.page() - 1).saturating_mul(self.size())
    }

    /// Number of pages for `total_items`; an empty listing still has one page.
    #[must_use]
    pub fn total_pages(self, total_items: u64) -> u64 {
        total_items.div_ceil(self.size()).max(1)
    }

    pub fn check(self, total_items: u64) -> Result<(), PageOutOfRangeError> {
        let total_pages = self.total_pages(total_items);

        if self.page() <= total_pages {
            Ok(())
        } else {
            Err(PageOutOfRangeError {
                page: self.page(),
                total_pages,
            })
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub page_size: u64,
    pub total_items: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(items: Vec<T>, request: PageRequest, total_items: u64) -> Self {
        let total_pages = request.total_pages(total_items);

        Self {
            items,
            page: request.page(),
            page_size: request.size(),
            total_items,
            total_pages,
            has_next: request.page() < total_pages,
            has_previous: request.page() > 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::model::page::{DEFAULT_PAGE_SIZE, Page, PageOutOfRangeError, PageRequest};
    use std::num::NonZeroU64;

    fn request(page: u64) -> PageRequest {
        PageRequest::new(NonZeroU64::new(page).unwrap(), DEFAULT_PAGE_SIZE)
    }

    #[test]
    fn bounds() {
        assert_eq!(request(1).check(0), Ok(()));
        assert_eq!(request(3).check(7), Ok(()));
        assert_eq!(
            request(4).check(9),
            Err(PageOutOfRangeError {
                page: 4,
                total_pages: 3
            })
        );
        assert_eq!(request(2).offset(), 3);
        assert_eq!(PageRequest::first(DEFAULT_PAGE_SIZE), request(1));
    }

    #[test]
    fn page_flags() {
        let page = Page::new(vec![7], request(3), 7);

        assert_eq!(page.total_pages, 3);
        assert!(!page.has_next);
        assert!(page.has_previous);
        assert_eq!(page.items, vec![7]);
    }
}
