use crate::server::{Result, ServerError};
use axum::extract::{FromRequestParts, Query as AxumQuery};
use plaza_common::model::page::PageRequest;
use serde::Deserialize;
use std::num::NonZeroU64;

#[derive(FromRequestParts, Debug, Clone, Copy, Default)]
#[from_request(via(AxumQuery), rejection(ServerError))]
pub struct Query<T>(pub T);

/// `?page=N`, 1-based; absent means the first page.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
}

impl PageQuery {
    pub fn request(self, page_size: NonZeroU64) -> Result<PageRequest> {
        let Some(page) = self.page else {
            return Ok(PageRequest::first(page_size));
        };
        let page = NonZeroU64::new(page).ok_or(ServerError::PageNotFound(page))?;

        Ok(PageRequest::new(page, page_size))
    }
}

#[cfg(test)]
mod tests {
    use crate::server::{ServerError, query::PageQuery};
    use plaza_common::model::page::{DEFAULT_PAGE_SIZE, PageRequest};

    #[test]
    fn page_request_from_query() {
        assert_eq!(
            PageQuery { page: None }.request(DEFAULT_PAGE_SIZE).unwrap(),
            PageRequest::first(DEFAULT_PAGE_SIZE)
        );
        assert_eq!(
            PageQuery { page: Some(2) }
                .request(DEFAULT_PAGE_SIZE)
                .unwrap()
                .page(),
            2
        );
        assert!(matches!(
            PageQuery { page: Some(0) }.request(DEFAULT_PAGE_SIZE),
            Err(ServerError::PageNotFound(0))
        ));
    }
}
