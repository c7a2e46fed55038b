use std::future::Future;

use crate::GitHubError;

/// Page size used for every drained list endpoint.
pub const DEFAULT_PER_PAGE: u32 = 50;

/// Cursor for one page of a list endpoint. GitHub pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn first(per_page: u32) -> Self {
        Self { page: 1, per_page }
    }

    pub fn with_page(self, page: u32) -> Self {
        Self { page, ..self }
    }
}

/// One page of results plus the upstream's next-page cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page: Option<u32>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_page: None,
        }
    }

    pub fn with_next(items: Vec<T>, next_page: u32) -> Self {
        Self {
            items,
            next_page: Some(next_page),
        }
    }
}

/// Drain a paginated endpoint, concatenating items in page order.
///
/// Stops when a page reports no next page. The first failing page aborts
/// the whole collection and its error is returned; nothing partial escapes.
pub async fn collect_pages<T, F, Fut>(per_page: u32, mut fetch: F) -> Result<Vec<T>, GitHubError>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<Page<T>, GitHubError>>,
{
    let mut request = PageRequest::first(per_page);
    let mut all = Vec::new();
    loop {
        let page = fetch(request).await?;
        all.extend(page.items);
        match page.next_page {
            None => return Ok(all),
            Some(next) if next <= request.page => {
                return Err(GitHubError::Pagination(format!(
                    "next page {next} does not advance past page {}",
                    request.page
                )));
            }
            Some(next) => request = request.with_page(next),
        }
    }
}
