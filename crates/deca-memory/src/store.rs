//! Append-only memory with token-substring search.
//!
//! Entries append to `memory/log.jsonl` and the full set is mirrored into
//! `memory/index.json` via temp-file + rename, so a crash mid-write never
//! corrupts the index. Writes are serialized through an internal mutex;
//! reads take a snapshot of the in-memory entries.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{MemoryEntry, SearchHit};

/// Characters of context around the first match in a snippet.
const SNIPPET_RADIUS: usize = 40;

pub struct MemoryStore {
    dir: PathBuf,
    entries: Mutex<Vec<MemoryEntry>>,
}

impl MemoryStore {
    /// Open (or start) the store under `dir` (normally `<state_dir>/memory`).
    /// A corrupt index is logged and the store starts from the append log.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let entries = load_entries(&dir);
        debug!(count = entries.len(), dir = %dir.display(), "memory store opened");
        Self {
            dir,
            entries: Mutex::new(entries),
        }
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join("index.json")
    }

    fn log_path(&self) -> PathBuf {
        self.dir.join("log.jsonl")
    }

    /// Append one entry. Returns the stored entry with its assigned id.
    pub fn add(&self, content: impl Into<String>, tags: Vec<String>) -> Result<MemoryEntry> {
        let entry = MemoryEntry {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            tags,
            created_at: deca_core::types::now_ms(),
        };

        // Mutex scope doubles as the write serialization point.
        let mut entries = self.entries.lock().unwrap();
        fs::create_dir_all(&self.dir)?;

        let line = serde_json::to_string(&entry)?;
        let mut log = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())?;
        log.write_all(line.as_bytes())?;
        log.write_all(b"\n")?;
        log.flush()?;

        entries.push(entry.clone());
        write_index(&self.index_path(), &entries)?;
        Ok(entry)
    }

    /// Score = number of distinct query tokens occurring (case-insensitively)
    /// in the entry content or tags. Ties break newest-first.
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let tokens: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();
        if tokens.is_empty() {
            return Vec::new();
        }

        let entries = self.entries.lock().unwrap().clone();
        let mut hits: Vec<SearchHit> = entries
            .into_iter()
            .filter_map(|entry| {
                let haystack =
                    format!("{} {}", entry.content, entry.tags.join(" ")).to_lowercase();
                let score = tokens.iter().filter(|t| haystack.contains(t.as_str())).count();
                if score == 0 {
                    return None;
                }
                let snippet = snippet_around_first(&entry.content, &tokens);
                Some(SearchHit {
                    entry,
                    score,
                    snippet,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(b.entry.created_at.cmp(&a.entry.created_at))
        });
        hits.truncate(limit);
        hits
    }

    /// Full entry by id, or `None`.
    pub fn get(&self, id: &str) -> Option<MemoryEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Window of content around the first token occurrence.
fn snippet_around_first(content: &str, tokens: &[String]) -> String {
    let lower = content.to_lowercase();
    let pos = tokens.iter().filter_map(|t| lower.find(t.as_str())).min();
    let Some(pos) = pos else {
        return truncate_chars(content, SNIPPET_RADIUS * 2);
    };

    let chars: Vec<char> = content.chars().collect();
    // `pos` is a byte offset into the lowercased string; map it to a char
    // index conservatively by counting chars in the lowered prefix.
    let char_pos = lower[..pos].chars().count().min(chars.len());
    let start = char_pos.saturating_sub(SNIPPET_RADIUS);
    let end = (char_pos + SNIPPET_RADIUS).min(chars.len());
    let mut out: String = chars[start..end].iter().collect();
    if start > 0 {
        out = format!("…{out}");
    }
    if end < chars.len() {
        out.push('…');
    }
    out
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn write_index(path: &PathBuf, entries: &[MemoryEntry]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(entries)?;
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Prefer the index; fall back to replaying the append log.
fn load_entries(dir: &PathBuf) -> Vec<MemoryEntry> {
    let index = dir.join("index.json");
    if let Ok(content) = fs::read_to_string(&index) {
        match serde_json::from_str::<Vec<MemoryEntry>>(&content) {
            Ok(entries) => return entries,
            Err(e) => warn!(error = %e, "memory index unreadable, replaying log"),
        }
    }

    let Ok(content) = fs::read_to_string(dir.join("log.jsonl")) else {
        return Vec::new();
    };
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect()
}
