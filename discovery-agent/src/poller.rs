//! Paginated listing of one resource kind.
//!
//! Fetching (transport), parsing (envelope decode) and terminal-page
//! detection are separate so the poller can be driven by any
//! [`PageFetcher`], including canned pages in tests.

use apigee_discovery::{RecordKind, RemoteRecord, SyncError, SyncResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Maps one listing item onto a catalog record.
pub trait ResourceKind: Send + Sync + 'static {
    const KIND: RecordKind;

    /// Item shape inside the envelope's `data` array.
    type Raw: DeserializeOwned + Send;

    /// The endpoint may answer with a bare JSON array of items instead of
    /// the envelope (management API listings).
    const BARE_LISTING: bool = false;

    fn into_record(raw: Self::Raw) -> SyncResult<RemoteRecord>;
}

/// Query parameters of one page request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PageRequest {
    pub count: usize,
    #[serde(rename = "startKey", skip_serializing_if = "Option::is_none")]
    pub start_key: Option<String>,
}

/// Transport seam: fetches the raw body of one listing page.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, token: &str, endpoint: &str, request: &PageRequest)
        -> SyncResult<String>;
}

/// Response envelope shared by every listing endpoint.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default, alias = "errorCode")]
    pub error_code: Option<String>,
    #[serde(default, alias = "requestId")]
    pub request_id: Option<String>,
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(rename = "nextPageToken", default)]
    pub next_page_token: Option<String>,
}

impl<T> Page<T> {
    /// Page holding a whole bare-array listing, with no cursor.
    fn bare(data: Vec<T>) -> Self {
        Self {
            status: None,
            message: None,
            code: None,
            error_code: None,
            request_id: None,
            data,
            next_page_token: None,
        }
    }

    /// Cursor for the following page, `None` when this page is the last.
    ///
    /// The listing ends on an empty page or an absent/empty cursor.
    pub fn next_cursor(&self) -> Option<&str> {
        if self.data.is_empty() {
            return None;
        }
        self.next_page_token
            .as_deref()
            .map(str::trim)
            .filter(|cursor| !cursor.is_empty())
    }

    pub fn is_terminal(&self) -> bool {
        self.next_cursor().is_none()
    }
}

/// Decodes one page body.
///
/// The body must be an envelope object, or a bare array of items when
/// `bare_listing` is set; a bare array is a single, final page. Any other
/// top-level shape is malformed. An envelope whose `status` is `error` is
/// reported as a failed fetch.
pub fn parse_page<T: DeserializeOwned>(body: &str, bare_listing: bool) -> SyncResult<Page<T>> {
    let page: Page<T> = match serde_json::from_str::<Value>(body)? {
        envelope @ Value::Object(_) => serde_json::from_value(envelope)?,
        items @ Value::Array(_) if bare_listing => Page::bare(serde_json::from_value(items)?),
        other => {
            return Err(SyncError::MalformedResponse(format!(
                "expected a listing envelope, got {}",
                json_type(&other)
            )))
        }
    };

    if page
        .status
        .as_deref()
        .is_some_and(|s| s.eq_ignore_ascii_case("error"))
    {
        return Err(SyncError::TransientFetchFailure(format!(
            "listing returned error {}: {}",
            page.error_code.as_deref().or(page.code.as_deref()).unwrap_or("unknown"),
            page.message.as_deref().unwrap_or(""),
        )));
    }

    Ok(page)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Generic paginated poller for resource kind `K`.
pub struct Poller<K: ResourceKind> {
    fetcher: Arc<dyn PageFetcher>,
    page_size: usize,
    _kind: PhantomData<fn() -> K>,
}

impl<K: ResourceKind> Poller<K> {
    pub fn new(fetcher: Arc<dyn PageFetcher>, page_size: usize) -> Self {
        Self {
            fetcher,
            page_size: page_size.max(1),
            _kind: PhantomData,
        }
    }

    /// Fetches every page of `endpoint`.
    ///
    /// Any failing page aborts the whole listing; nothing is returned for
    /// the pages already read.
    pub async fn poll(
        &self,
        token: &str,
        endpoint: &str,
        cancel: &CancellationToken,
    ) -> SyncResult<Vec<RemoteRecord>> {
        let mut records = Vec::new();
        let mut seen_cursors = HashSet::new();
        let mut request = PageRequest {
            count: self.page_size,
            start_key: None,
        };
        let mut pages = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let body = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                body = self.fetcher.fetch_page(token, endpoint, &request) => body?,
            };
            let page = parse_page::<K::Raw>(&body, K::BARE_LISTING)?;
            pages += 1;

            let next = page.next_cursor().map(str::to_string);
            for raw in page.data {
                records.push(K::into_record(raw)?);
            }

            match next {
                None => break,
                Some(cursor) => {
                    if !seen_cursors.insert(cursor.clone()) {
                        return Err(SyncError::MalformedResponse(format!(
                            "cursor '{}' repeated while listing {}",
                            cursor, endpoint
                        )));
                    }
                    request.start_key = Some(cursor);
                }
            }
        }

        debug!(
            kind = %K::KIND,
            endpoint = %endpoint,
            pages = pages,
            count = records.len(),
            "Listing complete"
        );

        Ok(records)
    }
}
