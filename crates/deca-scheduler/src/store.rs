//! Crash-safe job persistence: `cron.json` written via temp-file + rename.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::types::CronJob;

#[derive(Debug, Serialize, Deserialize, Default)]
struct JobsFile {
    jobs: Vec<CronJob>,
}

/// Load all jobs. A missing file is an empty set; a corrupt file is logged
/// and treated as empty so storage damage never takes down the gateway.
pub fn load_jobs(path: &Path) -> Vec<CronJob> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cron storage unreadable, starting empty");
            return Vec::new();
        }
    };
    match serde_json::from_str::<JobsFile>(&content) {
        Ok(file) => file.jobs,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cron storage corrupt, starting empty");
            Vec::new()
        }
    }
}

/// Atomically replace the storage file.
pub fn save_jobs(path: &Path, jobs: &[CronJob]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = JobsFile {
        jobs: jobs.to_vec(),
    };
    let json = serde_json::to_string_pretty(&file)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Schedule;

    fn job(id: &str) -> CronJob {
        CronJob {
            id: id.into(),
            name: "n".into(),
            instruction: "do".into(),
            schedule: Schedule::Every { every_ms: 1000 },
            enabled: true,
            created_at_ms: 1,
            last_run_at_ms: None,
            next_run_at_ms: None,
        }
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cron.json");
        save_jobs(&path, &[job("a"), job("b")]).unwrap();
        let loaded = load_jobs(&path);
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, "a");
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_jobs(&dir.path().join("cron.json")).is_empty());
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cron.json");
        fs::write(&path, "{{{ nope").unwrap();
        assert!(load_jobs(&path).is_empty());
    }

    #[test]
    fn wire_format_has_jobs_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cron.json");
        save_jobs(&path, &[job("a")]).unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw["jobs"].is_array());
        assert_eq!(raw["jobs"][0]["createdAtMs"], 1);
    }
}
