//! Workspace bootstrap files.
//!
//! A closed set of Markdown files contributes to the system prompt. They are
//! re-read on every agent run (no file watching). Subagent scopes get only
//! the operational files (AGENTS/TOOLS); main scopes see everything.

use std::fs;
use std::path::{Path, PathBuf};

/// The closed filename set, in prompt order.
pub const BOOTSTRAP_FILES: &[&str] = &[
    "AGENTS.md",
    "SOUL.md",
    "TOOLS.md",
    "IDENTITY.md",
    "USER.md",
    "HEARTBEAT.md",
    "BOOTSTRAP.md",
    "MEMORY.md",
    "memory.md",
];

/// The reduced set visible to subagent scopes.
const SUBAGENT_FILES: &[&str] = &["AGENTS.md", "TOOLS.md"];

#[derive(Debug, Clone)]
pub struct BootstrapFile {
    pub name: String,
    pub path: PathBuf,
    pub content: Option<String>,
    pub missing: bool,
}

/// Resolve the directory the bootstrap set is read from: `workspace_dir`
/// itself, or `workspace_dir/workspace` when that subdirectory holds any of
/// SOUL/AGENTS/IDENTITY.
pub fn resolve_workspace_root(workspace_dir: &Path) -> PathBuf {
    let nested = workspace_dir.join("workspace");
    for probe in ["SOUL.md", "AGENTS.md", "IDENTITY.md"] {
        if nested.join(probe).is_file() {
            return nested;
        }
    }
    workspace_dir.to_path_buf()
}

/// Load the bootstrap set for a scope, truncating oversized files.
pub fn load_bootstrap_files(
    workspace_dir: &Path,
    subagent_scope: bool,
    max_chars: usize,
) -> Vec<BootstrapFile> {
    let root = resolve_workspace_root(workspace_dir);
    let names: &[&str] = if subagent_scope {
        SUBAGENT_FILES
    } else {
        BOOTSTRAP_FILES
    };

    names
        .iter()
        .map(|name| {
            let path = root.join(name);
            match fs::read_to_string(&path) {
                Ok(content) => BootstrapFile {
                    name: name.to_string(),
                    path,
                    content: Some(truncate_head_tail(&content, max_chars)),
                    missing: false,
                },
                Err(_) => BootstrapFile {
                    name: name.to_string(),
                    path,
                    content: None,
                    missing: true,
                },
            }
        })
        .collect()
}

/// Keep 70% head and 20% tail of `max_chars`, joined by a marker line, when
/// the content exceeds the limit. Cuts on char boundaries.
pub fn truncate_head_tail(content: &str, max_chars: usize) -> String {
    let total = content.chars().count();
    if max_chars == 0 || total <= max_chars {
        return content.to_string();
    }

    let head_chars = max_chars * 7 / 10;
    let tail_chars = max_chars / 5;
    let head: String = content.chars().take(head_chars).collect();
    let tail: String = content
        .chars()
        .skip(total.saturating_sub(tail_chars))
        .collect();
    format!(
        "{head}\n\n[... file trimmed: {} of {} chars omitted ...]\n\n{tail}",
        total - head_chars - tail_chars,
        total
    )
}
