//! Trigger-matched skills.
//!
//! A skill is a Markdown file under `<workspace>/skills/` with YAML
//! frontmatter declaring its trigger words. When a user message contains a
//! trigger (case-insensitive substring), the message is rewritten to the
//! skill prompt followed by the remaining request text.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct Skill {
    pub id: String,
    pub triggers: Vec<String>,
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
struct Frontmatter {
    id: Option<String>,
    #[serde(default)]
    triggers: Vec<String>,
}

/// Load every `*.md` skill under `<workspace>/skills/`. Files without
/// parseable frontmatter are skipped with a warning.
pub fn load_skills(workspace_dir: &Path) -> Vec<Skill> {
    let dir = workspace_dir.join("skills");
    let Ok(entries) = fs::read_dir(&dir) else {
        return Vec::new();
    };

    let mut skills = Vec::new();
    let mut paths: Vec<_> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "md"))
        .collect();
    paths.sort();

    for path in paths {
        let Ok(raw) = fs::read_to_string(&path) else {
            continue;
        };
        match parse_skill(&path, &raw) {
            Some(skill) => {
                debug!(id = %skill.id, triggers = ?skill.triggers, "skill loaded");
                skills.push(skill);
            }
            None => warn!(path = %path.display(), "skill file missing frontmatter, skipped"),
        }
    }
    skills
}

fn parse_skill(path: &Path, raw: &str) -> Option<Skill> {
    let rest = raw.strip_prefix("---")?;
    let (front, body) = rest.split_once("\n---")?;
    let meta: Frontmatter = serde_yaml::from_str(front).ok()?;
    if meta.triggers.is_empty() {
        return None;
    }

    let id = meta.id.unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    Some(Skill {
        id,
        triggers: meta.triggers,
        prompt: body.trim().to_string(),
    })
}

/// First skill whose trigger occurs in `text` (case-insensitive substring),
/// plus the request remainder with the trigger removed.
pub fn match_skill<'a>(skills: &'a [Skill], text: &str) -> Option<(&'a Skill, String)> {
    let lower = text.to_lowercase();
    for skill in skills {
        for trigger in &skill.triggers {
            let needle = trigger.to_lowercase();
            if needle.is_empty() {
                continue;
            }
            if let Some(pos) = lower.find(&needle) {
                // Offsets come from the lowercased copy; fall back to empty
                // slices if case folding shifted a boundary.
                let before = text.get(..pos).unwrap_or("").trim_end();
                let after = text.get(pos + needle.len()..).unwrap_or("").trim_start();
                let mut remainder = String::from(before);
                if !remainder.is_empty() && !after.is_empty() {
                    remainder.push(' ');
                }
                remainder.push_str(after);
                return Some((skill, remainder.trim().to_string()));
            }
        }
    }
    None
}

/// The rewritten user message injected in place of the original text.
pub fn rewrite_with_skill(skill: &Skill, remainder: &str) -> String {
    format!("{}\n\n用户请求: {}", skill.prompt, remainder)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skill(id: &str, triggers: &[&str], prompt: &str) -> Skill {
        Skill {
            id: id.into(),
            triggers: triggers.iter().map(|s| s.to_string()).collect(),
            prompt: prompt.into(),
        }
    }

    #[test]
    fn loads_frontmatter_skills() {
        let dir = tempfile::tempdir().unwrap();
        let skills_dir = dir.path().join("skills");
        fs::create_dir_all(&skills_dir).unwrap();
        fs::write(
            skills_dir.join("deploy.md"),
            "---\nid: skill-1\ntriggers: [\"deploy\", \"ship\"]\n---\nDEPLOY PROMPT\n",
        )
        .unwrap();
        fs::write(skills_dir.join("broken.md"), "no frontmatter here").unwrap();

        let skills = load_skills(dir.path());
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].id, "skill-1");
        assert_eq!(skills[0].triggers, vec!["deploy", "ship"]);
        assert_eq!(skills[0].prompt, "DEPLOY PROMPT");
    }

    #[test]
    fn file_stem_is_fallback_id() {
        let dir = tempfile::tempdir().unwrap();
        let skills_dir = dir.path().join("skills");
        fs::create_dir_all(&skills_dir).unwrap();
        fs::write(
            skills_dir.join("review.md"),
            "---\ntriggers: [\"review\"]\n---\nREVIEW\n",
        )
        .unwrap();
        assert_eq!(load_skills(dir.path())[0].id, "review");
    }

    #[test]
    fn trigger_match_strips_trigger_from_remainder() {
        let skills = vec![skill("skill-1", &["do"], "SKILL PROMPT")];
        let (matched, remainder) = match_skill(&skills, "do something").unwrap();
        assert_eq!(matched.id, "skill-1");
        assert_eq!(remainder, "something");
        assert_eq!(
            rewrite_with_skill(matched, &remainder),
            "SKILL PROMPT\n\n用户请求: something"
        );
    }

    #[test]
    fn match_is_case_insensitive() {
        let skills = vec![skill("s", &["Deploy"], "P")];
        let (_, remainder) = match_skill(&skills, "please DEPLOY the api").unwrap();
        assert_eq!(remainder, "please the api");
    }

    #[test]
    fn no_trigger_no_match() {
        let skills = vec![skill("s", &["deploy"], "P")];
        assert!(match_skill(&skills, "hello there").is_none());
    }
}
