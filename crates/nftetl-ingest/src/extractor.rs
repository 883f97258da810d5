//! Marketplace API client
//!
//! Reads `GET {base}/collections` page by page, following the `next` cursor
//! until it is absent or `limit` records have been returned. Requests are
//! issued one at a time and paced by a client-side [`Throttle`].

use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::{EtlConfig, RateLimit};
use crate::error::{EtlError, Result};

const API_KEY_HEADER: &str = "x-api-key";

/// At most `max_calls` requests per `window`
#[derive(Debug)]
pub struct Throttle {
    limit: RateLimit,
    calls: u32,
    window_start: Instant,
}

impl Throttle {
    pub fn new(limit: RateLimit) -> Self {
        Self {
            limit,
            calls: 0,
            window_start: Instant::now(),
        }
    }

    /// Wait until another request is allowed; returns the time spent waiting
    pub async fn acquire(&mut self) -> Duration {
        if !self.limit.is_enabled() {
            return Duration::ZERO;
        }

        let now = Instant::now();
        if now.duration_since(self.window_start) >= self.limit.window {
            self.calls = 0;
            self.window_start = now;
        }

        let mut waited = Duration::ZERO;
        if self.calls >= self.limit.max_calls {
            let wait = self.limit.window.saturating_sub(now.duration_since(self.window_start));
            if !wait.is_zero() {
                info!(wait_secs = wait.as_secs_f64(), "Request budget exhausted, pausing");
                tokio::time::sleep(wait).await;
                waited = wait;
            }
            self.calls = 0;
            self.window_start = Instant::now();
        }

        self.calls += 1;
        waited
    }
}

/// One response of the collections endpoint
#[derive(Debug, Clone)]
pub struct CollectionPage {
    /// 1-based position within the run
    pub index: u32,
    /// Response body, byte for byte
    pub body: String,
    pub collections: Vec<Value>,
    pub next: Option<String>,
}

pub struct OpenSeaClient {
    client: Client,
    collections_url: String,
    api_key: String,
    page_size: u32,
    throttle: Throttle,
}

impl OpenSeaClient {
    pub fn new(config: &EtlConfig) -> Result<Self> {
        config.validate_api()?;

        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("nftetl/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            collections_url: config.collections_url(),
            api_key: config.api_key.clone(),
            page_size: config.page_size,
            throttle: Throttle::new(config.rate_limit),
        })
    }

    /// Start a single pass over the collections of `chain`
    pub fn pager(&mut self, chain: &str, limit: usize) -> CollectionPager<'_> {
        CollectionPager {
            client: self,
            chain: chain.to_string(),
            limit,
            fetched: 0,
            next_index: 1,
            cursor: None,
            finished: limit == 0,
        }
    }

    /// Raw collection objects of `chain`, at most `limit` of them
    pub fn fetch_collections(&mut self, chain: &str, limit: usize) -> BoxStream<'_, Result<Value>> {
        self.pager(chain, limit).into_stream()
    }

    async fn fetch_page(&mut self, chain: &str, limit: usize, cursor: Option<&str>) -> Result<String> {
        self.throttle.acquire().await;

        let limit = limit.to_string();
        let mut request = self
            .client
            .get(&self.collections_url)
            .header(ACCEPT, "application/json")
            .header(API_KEY_HEADER, &self.api_key)
            .query(&[("chain", chain), ("limit", limit.as_str())]);
        if let Some(cursor) = cursor {
            request = request.query(&[("next", cursor)]);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(EtlError::RateLimited { body });
        }
        if !status.is_success() {
            return Err(EtlError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }
}

/// Cursor state of one pass; finished pagers keep returning `None`
pub struct CollectionPager<'a> {
    client: &'a mut OpenSeaClient,
    chain: String,
    limit: usize,
    fetched: usize,
    next_index: u32,
    cursor: Option<String>,
    finished: bool,
}

impl<'a> CollectionPager<'a> {
    /// Records returned so far
    pub fn fetched(&self) -> usize {
        self.fetched
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub async fn next_page(&mut self) -> Result<Option<CollectionPage>> {
        if self.finished {
            return Ok(None);
        }

        let remaining = self.limit - self.fetched;
        let request_size = remaining.min(self.client.page_size as usize);

        let body = match self
            .client
            .fetch_page(&self.chain, request_size, self.cursor.as_deref())
            .await
        {
            Ok(body) => body,
            Err(e) => {
                self.finished = true;
                return Err(e);
            },
        };

        let (mut collections, next) = match parse_page(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.finished = true;
                return Err(e);
            },
        };
        collections.truncate(remaining);

        let index = self.next_index;
        self.next_index += 1;
        self.fetched += collections.len();
        self.cursor = next.clone();
        self.finished = next.is_none() || collections.is_empty() || self.fetched >= self.limit;

        debug!(
            chain = %self.chain,
            page = index,
            records = collections.len(),
            fetched = self.fetched,
            has_next = next.is_some(),
            "Fetched collections page"
        );

        Ok(Some(CollectionPage {
            index,
            body,
            collections,
            next,
        }))
    }

    /// Flatten the remaining pages into individual collection objects
    pub fn into_stream(self) -> BoxStream<'a, Result<Value>> {
        stream::try_unfold(self, |mut pager| async move {
            let page = pager.next_page().await?;
            Ok::<_, EtlError>(page.map(|page| (page.collections, pager)))
        })
        .map_ok(|collections| stream::iter(collections.into_iter().map(Ok)))
        .try_flatten()
        .boxed()
    }
}

/// Split a response body into its collections and the next cursor
fn parse_page(body: &str) -> Result<(Vec<Value>, Option<String>)> {
    let mut value: Value = serde_json::from_str(body)
        .map_err(|e| EtlError::invalid_response(format!("body is not JSON: {}", e)))?;

    let collections = match value.get_mut("collections").map(Value::take) {
        Some(Value::Array(items)) => items,
        _ => return Err(EtlError::invalid_response("missing 'collections' array")),
    };

    let next = value
        .get("next")
        .and_then(Value::as_str)
        .filter(|cursor| !cursor.is_empty())
        .map(str::to_string);

    Ok((collections, next))
}
