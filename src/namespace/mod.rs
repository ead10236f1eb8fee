// Namespace routing
// Every partition of the knowledge base maps to exactly one vector store namespace


use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespace shared by every page synced from the Notion database
pub const NOTION_SHARED_NAMESPACE: &str = "notion_content";

const CHAT_PREFIX: &str = "chat_";
const NOTION_PAGE_PREFIX: &str = "notion_page_";

/// Which slice of the knowledge base an operation targets
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartitionKey {
    /// Documents uploaded into one conversation
    Chat(i64),
    /// Content synced from the whole Notion database
    NotionShared,
    /// A single synced Notion page
    NotionPage(String),
}

impl fmt::Display for PartitionKey {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chat(chat_id) => write!(f, "chat {}", chat_id),
            Self::NotionShared => write!(f, "shared Notion content"),
            Self::NotionPage(page_id) => write!(f, "Notion page {}", page_id),
        }
    }
}

/// Name of an isolated partition inside the vector store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace(String);

impl Namespace {
    /// Wrap an existing namespace name, e.g. one listed by the vector store
    #[inline]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Table names may only contain ASCII alphanumerics, `_`, `-` and `.`
    #[inline]
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    }

    /// Recover the partition a namespace name was derived from
    #[inline]
    pub fn partition_key(&self) -> Option<PartitionKey> {
        if self.0 == NOTION_SHARED_NAMESPACE {
            return Some(PartitionKey::NotionShared);
        }
        if let Some(chat_id) = self.0.strip_prefix(CHAT_PREFIX) {
            return chat_id.parse().ok().map(PartitionKey::Chat);
        }
        self.0
            .strip_prefix(NOTION_PAGE_PREFIX)
            .filter(|page_id| !page_id.is_empty())
            .map(|page_id| PartitionKey::NotionPage(page_id.to_string()))
    }
}

impl fmt::Display for Namespace {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Namespace {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Resolve the namespace for a partition
#[inline]
pub fn namespace_for(key: &PartitionKey) -> Namespace {
    match key {
        PartitionKey::Chat(chat_id) => Namespace(format!("{}{}", CHAT_PREFIX, chat_id)),
        PartitionKey::NotionShared => Namespace(NOTION_SHARED_NAMESPACE.to_string()),
        PartitionKey::NotionPage(page_id) => {
            Namespace(format!("{}{}", NOTION_PAGE_PREFIX, page_id))
        }
    }
}
