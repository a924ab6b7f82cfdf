use serde::{Deserialize, Serialize};

/// One remembered fact. Entries are append-only; there is no update path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEntry {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
}

/// A search result: the entry plus its score and a short snippet around the
/// first matching token.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub entry: MemoryEntry,
    pub score: usize,
    pub snippet: String,
}
