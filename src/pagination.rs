//! Bounded-size, forward-only pagination over list endpoints.
//!
//! List endpoints answer with an envelope:
//!
//! ```json
//! { "meta": { "total_count": 2310, "offset": 0, "limit": 1000, "next": "..." },
//!   "objects": [ ... ] }
//! ```
//!
//! Log endpoints may instead hand out a `scroll_id` in `meta` which must be
//! echoed back to read the next page.
//!
//! [`pages`] returns a [`Paginator`], a one-shot stream of [`Page`]s. It
//! requests page N+1 only after page N has been received and its `has_more`
//! computed, and it cannot be rewound: once exhausted (or failed) it yields
//! nothing more. Starting over means calling [`pages`] again.

use std::marker::PhantomData;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::auth::Endpoint;
use crate::client::EaaClient;
use crate::error::Result;

/// Server-imposed cap on items per request for log scans.
pub const MAX_PAGE_LIMIT: u32 = 1000;

/// Pagination metadata returned alongside a page of items.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageMeta {
    /// Total number of items matching the query, when reported.
    #[serde(default)]
    pub total_count: Option<u64>,
    /// Offset of the first item of this page.
    #[serde(default)]
    pub offset: Option<u64>,
    /// Page size the server applied.
    #[serde(default)]
    pub limit: Option<u64>,
    /// Link to the next page, `null` on the last one.
    #[serde(default)]
    pub next: Option<String>,
    /// Scroll continuation token used by log endpoints.
    #[serde(default)]
    pub scroll_id: Option<String>,
}

/// Envelope of every list response.
#[derive(Debug, Deserialize)]
pub struct ListEnvelope<T> {
    /// Pagination metadata. Missing metadata means a single page.
    #[serde(default)]
    pub meta: PageMeta,
    /// Items of this page, in server order.
    pub objects: Vec<T>,
}

/// One page of results.
#[derive(Debug)]
pub struct Page<T> {
    /// Items in the order the server returned them.
    pub items: Vec<T>,
    /// Whether the server reported more items after this page.
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Continuation {
    Offset(u64),
    Token(String),
}

/// Page size plus the continuation for the next request.
///
/// Owned and mutated by a single [`Paginator`]; never shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    /// Maximum number of items requested per page.
    pub limit: u32,
    continuation: Continuation,
}

impl PageCursor {
    /// Cursor positioned at the first page.
    pub fn first(limit: u32) -> Self {
        PageCursor {
            limit,
            continuation: Continuation::Offset(0),
        }
    }

    fn query(&self) -> Vec<(String, String)> {
        let mut query = vec![("limit".to_string(), self.limit.to_string())];
        match &self.continuation {
            Continuation::Offset(offset) => query.push(("offset".to_string(), offset.to_string())),
            Continuation::Token(token) => query.push(("scroll_id".to_string(), token.clone())),
        }
        query
    }

    /// Computes the cursor for the page after one with `received` items and
    /// the given metadata, or `None` if that page was the last.
    fn advance(&self, meta: &PageMeta, received: usize) -> Option<PageCursor> {
        if received == 0 {
            return None;
        }

        if let Some(token) = meta.scroll_id.as_deref().filter(|t| !t.is_empty()) {
            return Some(PageCursor {
                limit: self.limit,
                continuation: Continuation::Token(token.to_string()),
            });
        }

        let offset = match self.continuation {
            Continuation::Offset(offset) => meta.offset.unwrap_or(offset),
            Continuation::Token(_) => meta.offset.unwrap_or(0),
        };
        let next_offset = offset + received as u64;

        let more = match (&meta.next, meta.total_count) {
            (Some(next), _) if !next.is_empty() => true,
            (_, Some(total)) => next_offset < total,
            _ => false,
        };

        more.then(|| PageCursor {
            limit: self.limit,
            continuation: Continuation::Offset(next_offset),
        })
    }
}

/// Lazy, forward-only, non-restartable sequence of pages.
#[derive(Debug)]
pub struct Paginator<'a, T> {
    client: &'a EaaClient,
    endpoint: Endpoint,
    params: Vec<(String, String)>,
    cursor: Option<PageCursor>,
    pages_read: u32,
    _items: PhantomData<fn() -> T>,
}

/// Starts a fresh pagination over `endpoint` with the caller's `params`.
///
/// No request is made until [`Paginator::next_page`] is awaited.
pub fn pages<'a, T: DeserializeOwned>(
    client: &'a EaaClient,
    endpoint: Endpoint,
    params: Vec<(String, String)>,
    limit: u32,
) -> Paginator<'a, T> {
    Paginator {
        client,
        endpoint,
        params,
        cursor: Some(PageCursor::first(limit)),
        pages_read: 0,
        _items: PhantomData,
    }
}

impl<T: DeserializeOwned> Paginator<'_, T> {
    /// Fetches the next page, or returns `None` once the sequence is
    /// exhausted.
    ///
    /// An error also exhausts the sequence: the paginator does not know
    /// whether retrying the same page is meaningful.
    ///
    /// # Errors
    ///
    /// `EaaError::Api` if the page request returns a non-2xx status, plus
    /// the transport and parse errors of [`EaaClient::get_json`].
    pub async fn next_page(&mut self) -> Option<Result<Page<T>>> {
        let cursor = self.cursor.take()?;

        let mut query = self.params.clone();
        query.extend(cursor.query());

        let envelope: ListEnvelope<T> = match self.client.get_json(&self.endpoint, &query).await {
            Ok(envelope) => envelope,
            Err(e) => return Some(Err(e)),
        };

        self.pages_read += 1;
        let received = envelope.objects.len();
        self.cursor = cursor.advance(&envelope.meta, received);

        if received == 0 && (envelope.meta.next.is_some() || envelope.meta.scroll_id.is_some()) {
            warn!(
                endpoint = %self.endpoint.path,
                page = self.pages_read,
                "server announced more items on an empty page, stopping pagination"
            );
        }
        debug!(
            endpoint = %self.endpoint.path,
            page = self.pages_read,
            items = received,
            has_more = self.cursor.is_some(),
            "page received"
        );

        Some(Ok(Page {
            items: envelope.objects,
            has_more: self.cursor.is_some(),
        }))
    }

    /// Drains every remaining page into one vector.
    ///
    /// # Errors
    ///
    /// The first error returned by [`Paginator::next_page`].
    pub async fn collect(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await {
            items.extend(page?.items);
        }
        Ok(items)
    }

    /// Returns `true` once no further page will be requested.
    pub fn is_exhausted(&self) -> bool {
        self.cursor.is_none()
    }

    /// Number of pages received so far.
    pub fn pages_read(&self) -> u32 {
        self.pages_read
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(total: Option<u64>, offset: Option<u64>, next: Option<&str>) -> PageMeta {
        PageMeta {
            total_count: total,
            offset,
            limit: Some(2),
            next: next.map(str::to_string),
            scroll_id: None,
        }
    }

    #[test]
    fn first_cursor_requests_offset_zero() {
        let cursor = PageCursor::first(1000);
        assert_eq!(
            cursor.query(),
            vec![
                ("limit".to_string(), "1000".to_string()),
                ("offset".to_string(), "0".to_string())
            ]
        );
    }

    #[test]
    fn total_count_drives_has_more() {
        let cursor = PageCursor::first(2);
        let next = cursor.advance(&meta(Some(5), Some(0), None), 2).unwrap();
        assert_eq!(next.continuation, Continuation::Offset(2));
        let next = next.advance(&meta(Some(5), Some(2), None), 2).unwrap();
        assert_eq!(next.continuation, Continuation::Offset(4));
        assert!(next.advance(&meta(Some(5), Some(4), None), 1).is_none());
    }

    #[test]
    fn next_link_means_more_even_without_total() {
        let cursor = PageCursor::first(2);
        assert!(
            cursor
                .advance(&meta(None, None, Some("/crux/v1/x?offset=2")), 2)
                .is_some()
        );
        assert!(cursor.advance(&meta(None, None, None), 2).is_none());
    }

    #[test]
    fn scroll_id_becomes_token_continuation() {
        let cursor = PageCursor::first(1000);
        let m = PageMeta {
            scroll_id: Some("abc".to_string()),
            ..PageMeta::default()
        };
        let next = cursor.advance(&m, 10).unwrap();
        assert_eq!(next.continuation, Continuation::Token("abc".to_string()));
        assert!(next.query().contains(&("scroll_id".to_string(), "abc".to_string())));
    }

    #[test]
    fn empty_page_ends_pagination_whatever_meta_says() {
        let cursor = PageCursor::first(2);
        let m = PageMeta {
            total_count: Some(100),
            scroll_id: Some("abc".to_string()),
            next: Some("more".to_string()),
            ..PageMeta::default()
        };
        assert!(cursor.advance(&m, 0).is_none());
    }

    #[test]
    fn envelope_without_meta_is_single_page() {
        let env: ListEnvelope<serde_json::Value> =
            serde_json::from_str(r#"{"objects":[{"a":1}]}"#).unwrap();
        assert_eq!(env.objects.len(), 1);
        assert!(PageCursor::first(10).advance(&env.meta, 1).is_none());
    }
}
