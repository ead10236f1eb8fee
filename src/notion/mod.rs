// Notion page source
// Loads pages from a Notion database and flattens their blocks into plain text


use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;
use crate::documents::{Document, DocumentMetadata, notion_source_id};
use crate::http::{RetryPolicy, build_agent, request_with_retry, run_blocking};

const PAGE_SIZE: u32 = 100;
const UNTITLED: &str = "Untitled";

/// Supplies externally authored pages as documents
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Load a single page by id
    async fn load_page(&self, page_id: &str) -> Result<Document>;

    /// Load every page the source knows about
    async fn load_all(&self) -> Result<Vec<Document>>;
}

/// Client for the Notion REST API
#[derive(Debug, Clone)]
pub struct NotionClient {
    base_url: Url,
    api_key: String,
    api_version: String,
    database_id: Option<String>,
    agent: ureq::Agent,
    retry: RetryPolicy,
}

/// A page object as returned by the pages and database query endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct NotionPage {
    pub id: String,
    pub created_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// A content block; the payload lives under the key named by `type`
#[derive(Debug, Clone, Deserialize)]
pub struct Block {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct PaginatedList<T> {
    results: Vec<T>,
    #[serde(default)]
    has_more: bool,
    next_cursor: Option<String>,
}

impl NotionClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config
            .notion_url()
            .context("Failed to generate Notion URL from config")?;
        let settings = &config.notion;
        let api_key = settings
            .api_key
            .clone()
            .ok_or_else(|| anyhow!("Notion API key is not configured (set NOTION_API_KEY)"))?;

        Ok(Self {
            base_url,
            api_key,
            api_version: settings.api_version.clone(),
            database_id: settings.database_id.clone(),
            agent: build_agent(Duration::from_secs(settings.timeout_seconds)),
            retry: RetryPolicy::new(settings.retry_attempts),
        })
    }

    #[inline]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    #[inline]
    pub fn with_database_id(mut self, database_id: impl Into<String>) -> Self {
        self.database_id = Some(database_id.into());
        self
    }

    /// Fetch one page and its top-level blocks, blocking the calling thread
    #[inline]
    pub fn fetch_page(&self, page_id: &str) -> Result<Document> {
        validate_page_id(page_id)?;
        debug!("Loading Notion page {}", page_id);

        let url = self.endpoint(&format!("/v1/pages/{}", page_id))?;
        let response_text = self
            .get(&url)
            .with_context(|| format!("Failed to retrieve Notion page {}", page_id))?;
        let page: NotionPage = serde_json::from_str(&response_text)
            .with_context(|| format!("Failed to parse Notion page {}", page_id))?;

        let blocks = self.fetch_blocks(page_id)?;
        Ok(page_document(page_id, &page, &blocks))
    }

    /// Fetch every page of the configured database, blocking the calling thread
    #[inline]
    pub fn fetch_database(&self) -> Result<Vec<Document>> {
        let database_id = self
            .database_id
            .as_deref()
            .ok_or_else(|| anyhow!("Notion database id is not configured (set NOTION_DATABASE_ID)"))?;

        let pages = self.query_database(database_id)?;
        info!(
            "Notion database {} returned {} pages",
            database_id,
            pages.len()
        );

        pages
            .iter()
            .map(|page| {
                let blocks = self.fetch_blocks(&page.id)?;
                Ok(page_document(&page.id, page, &blocks))
            })
            .collect()
    }

    fn query_database(&self, database_id: &str) -> Result<Vec<NotionPage>> {
        validate_page_id(database_id)?;
        let url = self.endpoint(&format!("/v1/databases/{}/query", database_id))?;

        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut body = json!({ "page_size": PAGE_SIZE });
            if let Some(start) = &cursor {
                body["start_cursor"] = Value::String(start.clone());
            }

            let response_text = self
                .post(&url, &body.to_string())
                .with_context(|| format!("Failed to query Notion database {}", database_id))?;
            let list: PaginatedList<NotionPage> = serde_json::from_str(&response_text)
                .context("Failed to parse Notion database query response")?;

            pages.extend(list.results);
            match next_cursor(list.has_more, list.next_cursor) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(pages)
    }

    fn fetch_blocks(&self, block_id: &str) -> Result<Vec<Block>> {
        let mut blocks = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut url = self.endpoint(&format!("/v1/blocks/{}/children", block_id))?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("page_size", &PAGE_SIZE.to_string());
                if let Some(start) = &cursor {
                    query.append_pair("start_cursor", start);
                }
            }

            let response_text = self
                .get(&url)
                .with_context(|| format!("Failed to list blocks of {}", block_id))?;
            let list: PaginatedList<Block> = serde_json::from_str(&response_text)
                .context("Failed to parse Notion block list")?;

            blocks.extend(list.results);
            match next_cursor(list.has_more, list.next_cursor) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!("Fetched {} blocks for {}", blocks.len(), block_id);
        Ok(blocks)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Failed to build Notion URL for {}", path))
    }

    fn get(&self, url: &Url) -> Result<String> {
        request_with_retry(url.as_str(), self.retry, || {
            self.agent
                .get(url.as_str())
                .header("Authorization", &format!("Bearer {}", self.api_key))
                .header("Notion-Version", &self.api_version)
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    fn post(&self, url: &Url, body: &str) -> Result<String> {
        request_with_retry(url.as_str(), self.retry, || {
            self.agent
                .post(url.as_str())
                .header("Authorization", &format!("Bearer {}", self.api_key))
                .header("Notion-Version", &self.api_version)
                .header("Content-Type", "application/json")
                .send(body)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }
}

#[async_trait]
impl PageSource for NotionClient {
    async fn load_page(&self, page_id: &str) -> Result<Document> {
        let client = self.clone();
        let page_id = page_id.to_string();
        run_blocking(move || client.fetch_page(&page_id)).await
    }

    async fn load_all(&self) -> Result<Vec<Document>> {
        let client = self.clone();
        run_blocking(move || client.fetch_database()).await
    }
}

fn next_cursor(has_more: bool, cursor: Option<String>) -> Option<String> {
    if !has_more {
        return None;
    }
    if cursor.is_none() {
        warn!("Notion reported more results without a cursor; stopping pagination");
    }
    cursor
}

/// Notion ids are UUIDs, with or without dashes
#[inline]
pub fn validate_page_id(page_id: &str) -> Result<()> {
    if !page_id.is_empty() && page_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        Ok(())
    } else {
        Err(anyhow!("Invalid Notion page id: {:?}", page_id))
    }
}

fn page_document(page_id: &str, page: &NotionPage, blocks: &[Block]) -> Document {
    Document::new(
        blocks_to_text(blocks),
        DocumentMetadata {
            source: notion_source_id(page_id),
            title: page_title(page),
            created_time: page.created_time,
            page_id: Some(page_id.to_string()),
        },
    )
}

/// Flatten paragraphs and headings into text; headings keep one `#` per level
#[inline]
pub fn blocks_to_text(blocks: &[Block]) -> String {
    blocks
        .iter()
        .filter_map(|block| {
            let prefix = match block.kind.as_str() {
                "paragraph" => "",
                "heading_1" => "# ",
                "heading_2" => "## ",
                "heading_3" => "### ",
                _ => return None,
            };
            let fragments = block
                .payload
                .get(&block.kind)
                .and_then(|content| content.get("rich_text"))
                .and_then(Value::as_array)
                .filter(|fragments| !fragments.is_empty())?;
            Some(format!("{}{}", prefix, rich_text_to_string(fragments)))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// The page's title property, or any property of type `title`
#[inline]
pub fn page_title(page: &NotionPage) -> String {
    let title_fragments = |property: &Value| {
        property
            .get("title")
            .and_then(Value::as_array)
            .filter(|fragments| !fragments.is_empty())
            .map(|fragments| rich_text_to_string(fragments))
    };

    page.properties
        .get("title")
        .and_then(title_fragments)
        .or_else(|| {
            page.properties
                .values()
                .filter(|property| property.get("type").and_then(Value::as_str) == Some("title"))
                .find_map(title_fragments)
        })
        .unwrap_or_else(|| UNTITLED.to_string())
}

fn rich_text_to_string(fragments: &[Value]) -> String {
    fragments
        .iter()
        .filter_map(|fragment| fragment.get("plain_text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}
