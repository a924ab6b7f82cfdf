//! HEARTBEAT.md task parsing and atomic rewrites.
//!
//! The task file is plain Markdown. Bullets (`-`, `*`, `+`) are tasks; an
//! optional `[ ]`/`[x]`/`[X]` checkbox carries completion state, and a bullet
//! without a checkbox counts as pending. Headings and blank lines are
//! ignored. A missing file means no tasks, not an error.

use std::fs;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeartbeatTask {
    /// The raw source line, used as the task's identity for rewrites.
    pub line: String,
    pub description: String,
    pub completed: bool,
}

/// Parse task bullets out of Markdown content.
pub fn parse_tasks(content: &str) -> Vec<HeartbeatTask> {
    content
        .lines()
        .filter_map(|raw| {
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                return None;
            }
            let rest = trimmed
                .strip_prefix("- ")
                .or_else(|| trimmed.strip_prefix("* "))
                .or_else(|| trimmed.strip_prefix("+ "))?;

            let (completed, description) = if let Some(body) = rest.strip_prefix("[ ]") {
                (false, body.trim())
            } else if let Some(body) = rest
                .strip_prefix("[x]")
                .or_else(|| rest.strip_prefix("[X]"))
            {
                (true, body.trim())
            } else {
                (false, rest.trim())
            };

            if description.is_empty() {
                return None;
            }
            Some(HeartbeatTask {
                line: raw.to_string(),
                description: description.to_string(),
                completed,
            })
        })
        .collect()
}

/// Handle on the task file with atomic mutation helpers.
#[derive(Debug, Clone)]
pub struct TaskFile {
    path: PathBuf,
}

impl TaskFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// All tasks currently in the file. Missing file reads as empty.
    pub fn load(&self) -> Vec<HeartbeatTask> {
        match fs::read_to_string(&self.path) {
            Ok(content) => parse_tasks(&content),
            Err(_) => Vec::new(),
        }
    }

    /// Tasks not yet completed.
    pub fn pending(&self) -> Vec<HeartbeatTask> {
        self.load().into_iter().filter(|t| !t.completed).collect()
    }

    /// Mark the task identified by its raw `line` as completed. Returns
    /// whether a line was changed. The whole file is rewritten atomically.
    pub fn mark_completed(&self, line: &str) -> Result<bool> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let mut changed = false;
        let rewritten: Vec<String> = content
            .lines()
            .map(|raw| {
                if !changed && raw == line {
                    changed = true;
                    complete_line(raw)
                } else {
                    raw.to_string()
                }
            })
            .collect();

        if changed {
            self.write_atomic(&rewritten.join("\n"))?;
        }
        Ok(changed)
    }

    /// Append a new pending task bullet.
    pub fn add_task(&self, text: &str) -> Result<()> {
        let mut content = fs::read_to_string(&self.path).unwrap_or_default();
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&format!("- [ ] {}\n", text.trim()));
        self.write_atomic(&content)
    }

    fn write_atomic(&self, content: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("md.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Rewrite one bullet line as completed, inserting a checkbox if absent.
fn complete_line(raw: &str) -> String {
    if let Some(pos) = raw.find("[ ]") {
        let mut out = raw.to_string();
        out.replace_range(pos..pos + 3, "[x]");
        return out;
    }
    // No checkbox: insert one after the bullet marker.
    let indent_len = raw.len() - raw.trim_start().len();
    let (indent, rest) = raw.split_at(indent_len);
    for marker in ["- ", "* ", "+ "] {
        if let Some(body) = rest.strip_prefix(marker) {
            return format!("{indent}{marker}[x] {body}");
        }
    }
    raw.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# Tasks

- [ ] water the plants
- [x] file the report
* no checkbox here
+ [X] shouted checkbox

some prose that is not a task
";

    #[test]
    fn parses_bullets_and_checkboxes() {
        let tasks = parse_tasks(SAMPLE);
        assert_eq!(tasks.len(), 4);
        assert_eq!(tasks[0].description, "water the plants");
        assert!(!tasks[0].completed);
        assert!(tasks[1].completed);
        assert_eq!(tasks[2].description, "no checkbox here");
        assert!(!tasks[2].completed, "missing checkbox means pending");
        assert!(tasks[3].completed, "[X] counts as done");
    }

    #[test]
    fn ignores_headings_blanks_and_prose() {
        let tasks = parse_tasks("# only a heading\n\nplain prose\n");
        assert!(tasks.is_empty());
    }

    #[test]
    fn missing_file_is_no_tasks() {
        let file = TaskFile::new("/nonexistent/HEARTBEAT.md");
        assert!(file.load().is_empty());
        assert!(file.pending().is_empty());
    }

    #[test]
    fn mark_completed_rewrites_checkbox() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("HEARTBEAT.md");
        fs::write(&path, SAMPLE).unwrap();
        let file = TaskFile::new(&path);

        let changed = file.mark_completed("- [ ] water the plants").unwrap();
        assert!(changed);
        let pending = file.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].description, "no checkbox here");
    }

    #[test]
    fn mark_completed_inserts_missing_checkbox() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("HEARTBEAT.md");
        fs::write(&path, "* no checkbox here\n").unwrap();
        let file = TaskFile::new(&path);

        assert!(file.mark_completed("* no checkbox here").unwrap());
        let tasks = file.load();
        assert!(tasks[0].completed);
        assert_eq!(tasks[0].description, "no checkbox here");
    }

    #[test]
    fn mark_completed_unknown_line_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("HEARTBEAT.md");
        fs::write(&path, SAMPLE).unwrap();
        let file = TaskFile::new(&path);
        assert!(!file.mark_completed("- [ ] not present").unwrap());
    }

    #[test]
    fn add_task_appends_pending_bullet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("HEARTBEAT.md");
        let file = TaskFile::new(&path);

        file.add_task("new chore").unwrap();
        file.add_task("second chore").unwrap();
        let pending = file.pending();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[1].description, "second chore");
    }
}
