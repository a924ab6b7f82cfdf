//! Line-delimited JSON session persistence.
//!
//! One `sessions/<url-encoded-key>.jsonl` file per session key, one JSON
//! [`Message`] per line. Files are loaded lazily into an in-memory cache and
//! flushed on every append so a crash can lose at most a trailing partial
//! line, which the loader tolerates and discards.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use deca_core::types::Message;

use crate::error::Result;

pub struct SessionStore {
    dir: PathBuf,
    cache: Mutex<HashMap<String, Vec<Message>>>,
}

impl SessionStore {
    /// `dir` is the sessions directory (normally `<state_dir>/sessions`).
    /// Created on first append.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.jsonl", urlencoding::encode(key)))
    }

    /// Append one message and flush it to disk.
    pub fn append(&self, key: &str, msg: &Message) -> Result<()> {
        let mut cache = self.cache.lock().unwrap();
        if !cache.contains_key(key) {
            cache.insert(key.to_string(), load_file(&self.path_for(key))?);
        }
        cache.get_mut(key).unwrap().push(msg.clone());
        drop(cache);

        fs::create_dir_all(&self.dir)?;
        let line = serde_json::to_string(msg)?;
        // Transient write failures (editor locks, AV scanners) get one retry.
        if let Err(first) = self.write_line(key, &line) {
            warn!(key, error = %first, "session append failed, retrying once");
            self.write_line(key, &line)?;
        }
        Ok(())
    }

    fn write_line(&self, key: &str, line: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(key))?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()
    }

    /// Full history for a key. Empty for unknown keys.
    pub fn history(&self, key: &str) -> Result<Vec<Message>> {
        let mut cache = self.cache.lock().unwrap();
        if let Some(messages) = cache.get(key) {
            return Ok(messages.clone());
        }
        let messages = load_file(&self.path_for(key))?;
        cache.insert(key.to_string(), messages.clone());
        Ok(messages)
    }

    /// Number of persisted messages for a key without cloning the history.
    pub fn message_count(&self, key: &str) -> usize {
        self.history(key).map(|m| m.len()).unwrap_or(0)
    }

    /// Delete the session file and drop the cached history.
    pub fn reset(&self, key: &str) -> Result<()> {
        self.cache.lock().unwrap().remove(key);
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// All session keys with a file on disk, decoded from their filenames.
    pub fn list(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut keys: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                let stem = name.strip_suffix(".jsonl")?.to_string();
                urlencoding::decode(&stem).ok().map(|s| s.into_owned())
            })
            .collect();
        keys.sort();
        keys
    }
}

/// Read a session file, discarding unparseable lines (a crash can leave a
/// trailing partial line).
fn load_file(path: &Path) -> Result<Vec<Message>> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut messages = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Message>(line) {
            Ok(msg) => messages.push(msg),
            Err(e) => {
                warn!(path = %path.display(), line = idx + 1, error = %e,
                      "discarding unparseable session line");
            }
        }
    }
    debug!(path = %path.display(), count = messages.len(), "session loaded");
    Ok(messages)
}
