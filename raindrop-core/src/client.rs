use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use url::Url;

use crate::backoff::{Backoff, retry_after_hint};
use crate::pacer::RequestPacer;

const DEFAULT_BASE_URL: &str = "https://api.raindrop.io";
const COLLECTIONS_ROOT_PATH: &str = "/rest/v1/collections";
const COLLECTIONS_CHILDREN_PATH: &str = "/rest/v1/collections/childrens";
const RAINDROPS_PATH: &str = "/rest/v1/raindrops";

/// Published API ceiling. Requests are spaced at least
/// ceil(60_000 ms / limit) apart.
const REQUESTS_PER_MINUTE: u64 = 120;
const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(1000);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

/// Items per page on the raindrops endpoint.
pub const PAGE_SIZE: u32 = 50;

/// Sort directive for the service's manual ordering field. Pagination across
/// successive requests is only deterministic under a stable sort.
pub const SORT_BY_ORDER: &str = "-sort";

fn min_request_interval() -> Duration {
    Duration::from_millis(60_000u64.div_ceil(REQUESTS_PER_MINUTE))
}

#[derive(Debug, Error)]
pub enum RaindropError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status} for {endpoint}: {body}")]
    Api {
        endpoint: String,
        status: StatusCode,
        body: String,
    },
}

/// Pagination inputs for one raindrops request.
#[derive(Debug, Clone, Copy)]
pub struct PageQuery<'a> {
    pub page: u32,
    pub per_page: u32,
    pub search: Option<&'a str>,
}

#[derive(Clone)]
pub struct RaindropClient {
    http: Client,
    base_url: Url,
    token: String,
    pacer: Arc<RequestPacer>,
    backoff: Backoff,
}

impl RaindropClient {
    pub fn new(token: impl Into<String>) -> Result<Self, RaindropError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, RaindropError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            token: token.into(),
            pacer: Arc::new(RequestPacer::new(min_request_interval())),
            backoff: Backoff::new(RETRY_BASE_DELAY, RETRY_MAX_DELAY),
        })
    }

    pub async fn root_collections(&self) -> Result<Vec<Collection>, RaindropError> {
        let url = self.base_url.join(COLLECTIONS_ROOT_PATH)?;
        let list: CollectionList = self.get_json(COLLECTIONS_ROOT_PATH, url).await?;
        Ok(list.items)
    }

    pub async fn child_collections(&self) -> Result<Vec<Collection>, RaindropError> {
        let url = self.base_url.join(COLLECTIONS_CHILDREN_PATH)?;
        let list: CollectionList = self.get_json(COLLECTIONS_CHILDREN_PATH, url).await?;
        Ok(list.items)
    }

    /// One page of items from a collection (or everything, scope `"0"`),
    /// sorted by the manual order field.
    pub async fn raindrops_page(
        &self,
        collection_id: &str,
        query: &PageQuery<'_>,
    ) -> Result<RaindropPage, RaindropError> {
        let (endpoint, mut url) = self.raindrops_url(collection_id)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("page", &query.page.to_string());
            pairs.append_pair("perpage", &query.per_page.to_string());
            pairs.append_pair("sort", SORT_BY_ORDER);
            if let Some(search) = query.search {
                pairs.append_pair("search", search);
            }
        }
        self.get_json(&endpoint, url).await
    }

    /// Zero-result count query (`perpage=0`): returns only the total number
    /// of items matching the scope and search.
    pub async fn raindrop_count(
        &self,
        collection_id: &str,
        search: Option<&str>,
    ) -> Result<u64, RaindropError> {
        let (endpoint, mut url) = self.raindrops_url(collection_id)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("page", "0");
            pairs.append_pair("perpage", "0");
            if let Some(search) = search {
                pairs.append_pair("search", search);
            }
        }
        let page: RaindropPage = self.get_json(&endpoint, url).await?;
        Ok(page.count.unwrap_or(0))
    }

    fn raindrops_url(&self, collection_id: &str) -> Result<(String, Url), RaindropError> {
        let endpoint = format!("{RAINDROPS_PATH}/{collection_id}");
        let url = self.base_url.join(&endpoint)?;
        Ok((endpoint, url))
    }

    fn auth_header_value(&self) -> String {
        format!("Bearer {}", self.token)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        url: Url,
    ) -> Result<T, RaindropError> {
        let response = self.get_with_retry(url).await?;
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(RaindropError::Api {
                endpoint: endpoint.to_string(),
                status,
                body,
            })
        }
    }

    /// One paced dispatch with bounded retries. Throttling responses honor
    /// the server's Retry-After hint when present, otherwise back off
    /// exponentially; transport failures back off likewise. The final
    /// attempt's throttling response goes back to the caller as-is, as does
    /// any other non-success status.
    async fn get_with_retry(&self, url: Url) -> Result<reqwest::Response, RaindropError> {
        self.pacer.pace().await;
        let mut attempt = 0u32;
        loop {
            let sent = self
                .http
                .get(url.clone())
                .header("Authorization", self.auth_header_value())
                .send()
                .await;
            let last_attempt = attempt + 1 >= MAX_ATTEMPTS;
            match sent {
                Ok(response)
                    if response.status() == StatusCode::TOO_MANY_REQUESTS && !last_attempt =>
                {
                    let delay = retry_after_hint(response.headers())
                        .unwrap_or_else(|| self.backoff.delay(attempt));
                    tokio::time::sleep(delay).await;
                }
                Ok(response) => return Ok(response),
                Err(err) => {
                    if last_attempt {
                        return Err(RaindropError::Request(err));
                    }
                    tokio::time::sleep(self.backoff.delay(attempt)).await;
                }
            }
            attempt += 1;
        }
    }
}

/// Collection and item identifiers arrive as JSON numbers but are opaque;
/// they are normalized to strings at the wire boundary so lookups never mix
/// numeric and string forms.
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct IdVisitor;

    impl Visitor<'_> for IdVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a numeric or string identifier")
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<String, E> {
            Ok(value.to_string())
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<String, E> {
            Ok(value.to_string())
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<String, E> {
            Ok(value.to_string())
        }
    }

    deserializer.deserialize_any(IdVisitor)
}

/// Reference to another record, e.g. `parent.$id` or `collection.$id`.
#[derive(Debug, Clone, Deserialize)]
pub struct IdRef {
    #[serde(rename = "$id", deserialize_with = "id_string")]
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Collection {
    #[serde(rename = "_id", deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub parent: Option<IdRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Raindrop {
    #[serde(rename = "_id", deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub collection: Option<IdRef>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RaindropPage {
    #[serde(default)]
    pub items: Vec<Raindrop>,
    #[serde(default)]
    pub count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CollectionList {
    #[serde(default)]
    items: Vec<Collection>,
}
