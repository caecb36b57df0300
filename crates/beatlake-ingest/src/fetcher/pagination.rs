//! Lazy, bounded pagination over continuation-token APIs
//!
//! Sources describe how to build a page URL and how to read a page back
//! through [`PageQuery`]; the [`Pager`] owns the loop and the
//! [`QueryCursor`].

use super::Fetcher;
use crate::auth::Auth;
use crate::error::ApiError;
use beatlake_common::Record;
use futures::stream::{self, Stream, TryStreamExt};
use tracing::{debug, instrument};

/// One page as understood by a source
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<Record>,
    /// Page token or next-page URL, `None` on the last page
    pub next: Option<String>,
}

/// A logical sub-query whose results span several pages
pub trait PageQuery: Send + Sync {
    /// Human-readable name used in logs and run reports
    fn label(&self) -> String;

    /// URL of the page after `token` (the first page when `None`), asking for
    /// at most `page_size` items
    fn page_url(&self, token: Option<&str>, page_size: usize) -> String;

    fn parse_page(&self, body: &serde_json::Value) -> Result<Page, ApiError>;
}

/// Resumable pagination state of one sub-query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryCursor {
    pub token: Option<String>,
    pub retrieved: usize,
    pub max_items: usize,
    finished: bool,
}

impl QueryCursor {
    pub fn new(max_items: usize) -> Self {
        Self {
            token: None,
            retrieved: 0,
            max_items,
            finished: false,
        }
    }

    pub fn remaining(&self) -> usize {
        self.max_items.saturating_sub(self.retrieved)
    }

    /// No further page will be requested from this cursor
    pub fn is_finished(&self) -> bool {
        self.finished || self.remaining() == 0
    }
}

/// Finite, non-restartable sequence of pages for one [`PageQuery`]
pub struct Pager<'a, Q: PageQuery> {
    fetcher: &'a Fetcher,
    query: &'a Q,
    auth: &'a Auth,
    page_size: usize,
    cursor: QueryCursor,
}

pub fn paginate<'a, Q: PageQuery>(
    fetcher: &'a Fetcher,
    query: &'a Q,
    auth: &'a Auth,
    page_size: usize,
    max_items: usize,
) -> Pager<'a, Q> {
    paginate_from(fetcher, query, auth, page_size, QueryCursor::new(max_items))
}

/// Continue a sub-query from a previously saved cursor
pub fn paginate_from<'a, Q: PageQuery>(
    fetcher: &'a Fetcher,
    query: &'a Q,
    auth: &'a Auth,
    page_size: usize,
    cursor: QueryCursor,
) -> Pager<'a, Q> {
    Pager {
        fetcher,
        query,
        auth,
        page_size: page_size.max(1),
        cursor,
    }
}

impl<'a, Q: PageQuery> Pager<'a, Q> {
    pub fn cursor(&self) -> &QueryCursor {
        &self.cursor
    }

    /// Fetch the next page. `Ok(None)` once the sequence is over.
    ///
    /// A failed request finishes the cursor; records already returned stay
    /// with the caller.
    #[instrument(skip(self), fields(query = %self.query.label(), retrieved = self.cursor.retrieved))]
    pub async fn next_page(&mut self) -> Result<Option<Vec<Record>>, ApiError> {
        if self.cursor.is_finished() {
            return Ok(None);
        }

        let remaining = self.cursor.remaining();
        let url = self
            .query
            .page_url(self.cursor.token.as_deref(), self.page_size.min(remaining));

        let page = match self.fetcher.get(&url, self.auth).await {
            Ok(body) => self.query.parse_page(&body),
            Err(e) => Err(e),
        };
        let page = match page {
            Ok(page) => page,
            Err(e) => {
                self.cursor.finished = true;
                return Err(e);
            },
        };

        let mut records = page.records;
        records.truncate(remaining);
        self.cursor.retrieved += records.len();
        self.cursor.token = page.next;

        if records.is_empty() || self.cursor.token.is_none() {
            self.cursor.finished = true;
        }

        debug!(
            page_items = records.len(),
            total = self.cursor.retrieved,
            more = !self.cursor.is_finished(),
            "Page retrieved"
        );

        if records.is_empty() {
            return Ok(None);
        }
        Ok(Some(records))
    }

    /// The same sequence, flattened into individual records
    pub fn into_stream(self) -> impl Stream<Item = Result<Record, ApiError>> + 'a {
        stream::try_unfold(self, |mut pager| async move {
            Ok::<_, ApiError>(pager.next_page().await?.map(|records| {
                let items = stream::iter(records.into_iter().map(Ok::<Record, ApiError>));
                (items, pager)
            }))
        })
        .try_flatten()
    }
}
