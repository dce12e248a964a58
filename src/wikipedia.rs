//! Encyclopedia lookup through the MediaWiki action API.
//!
//! A topic is resolved with a full-text search (`list=search`), then each
//! hit's plain-text extract is loaded (`prop=extracts&explaintext`), one
//! request per article since the API only returns whole-article extracts
//! one page at a time. Each article becomes one [`Document`] whose source is
//! the article URL.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::WikipediaConfig;
use crate::error::{Error, Result};
use crate::extract::truncate_chars;
use crate::models::{Document, SourceKind, META_TITLE};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    query: Option<SearchQuery>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
    pageid: u64,
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    query: Option<PageQuery>,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    title: String,
    #[serde(default)]
    extract: Option<String>,
    #[serde(default)]
    fullurl: Option<String>,
}

pub struct WikipediaClient {
    client: Client,
    api_root: String,
    max_docs: usize,
    max_chars: usize,
}

impl WikipediaClient {
    pub fn new(config: &WikipediaConfig, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(user_agent.to_string())
            .build()
            .map_err(|e| Error::Lookup(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_root: config.api_root(),
            max_docs: config.max_docs,
            max_chars: config.max_chars,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/w/api.php", self.api_root)
    }

    /// Load up to `max_docs` articles matching `topic`, in search rank order.
    pub async fn lookup(&self, topic: &str) -> Result<Vec<Document>> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(Error::Lookup("empty topic".into()));
        }

        let hits = self.search(topic).await?;
        if hits.is_empty() {
            return Err(Error::Lookup(format!("no article matches '{}'", topic)));
        }
        debug!(topic, hits = hits.len(), "wikipedia search");

        let mut documents = Vec::with_capacity(hits.len());
        for hit in &hits {
            let page = self.page(hit.pageid).await?;
            let Some(page) = page else {
                warn!(title = %hit.title, "article vanished between search and fetch");
                continue;
            };
            let text = page.extract.as_deref().unwrap_or("").trim();
            if text.is_empty() {
                continue;
            }
            let url = page
                .fullurl
                .clone()
                .unwrap_or_else(|| self.article_url(&page.title));
            documents.push(
                Document::new(truncate_chars(text, self.max_chars), SourceKind::Encyclopedia, url)
                    .with_meta(META_TITLE, page.title),
            );
        }

        if documents.is_empty() {
            return Err(Error::Lookup(format!(
                "articles matching '{}' have no text",
                topic
            )));
        }
        info!(topic, articles = documents.len(), "loaded encyclopedia articles");
        Ok(documents)
    }

    async fn search(&self, topic: &str) -> Result<Vec<SearchHit>> {
        let limit = self.max_docs.to_string();
        let response: SearchResponse = self
            .get_json(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", topic),
                ("srlimit", limit.as_str()),
                ("srprop", ""),
                ("format", "json"),
                ("formatversion", "2"),
            ])
            .await?;
        let mut hits = response.query.map(|q| q.search).unwrap_or_default();
        hits.truncate(self.max_docs);
        Ok(hits)
    }

    async fn page(&self, pageid: u64) -> Result<Option<Page>> {
        let id = pageid.to_string();
        let response: PageResponse = self
            .get_json(&[
                ("action", "query"),
                ("prop", "extracts|info"),
                ("inprop", "url"),
                ("explaintext", "1"),
                ("redirects", "1"),
                ("pageids", id.as_str()),
                ("format", "json"),
                ("formatversion", "2"),
            ])
            .await?;
        Ok(response.query.and_then(|q| q.pages.into_iter().next()))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, params: &[(&str, &str)]) -> Result<T> {
        let response = self
            .client
            .get(self.endpoint())
            .query(params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Lookup("encyclopedia request timed out".into())
                } else {
                    Error::Lookup(format!("encyclopedia request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Lookup(format!("encyclopedia API returned HTTP {}", status)));
        }
        response
            .json()
            .await
            .map_err(|e| Error::Lookup(format!("invalid encyclopedia response: {}", e)))
    }

    fn article_url(&self, title: &str) -> String {
        format!("{}/wiki/{}", self.api_root, title.replace(' ', "_"))
    }
}
