use serde::{Deserialize, Serialize};

/// When a job fires. The serialized shape (`kind` + per-variant field names)
/// is part of the persisted `cron.json` format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Schedule {
    /// One-shot at an absolute instant. Disabled after firing.
    At {
        #[serde(rename = "atMs")]
        at_ms: i64,
    },
    /// Fixed interval, measured from each fire.
    Every {
        #[serde(rename = "everyMs")]
        every_ms: i64,
    },
    /// Five-field cron expression (minute hour day-of-month month day-of-week).
    Cron { expr: String },
}

/// A persisted scheduler job. Field names are wire-stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronJob {
    pub id: String,
    pub name: String,
    /// Instruction text injected into the agent when the job fires.
    pub instruction: String,
    pub schedule: Schedule,
    pub enabled: bool,
    pub created_at_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_at_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run_at_ms: Option<i64>,
}

/// Input for [`CronScheduler::add_job`](crate::engine::CronScheduler::add_job).
#[derive(Debug, Clone, Deserialize)]
pub struct JobSpec {
    pub name: String,
    pub instruction: String,
    pub schedule: Schedule,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub job_count: usize,
    pub next_trigger_ms: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_wire_shape_is_stable() {
        let every = Schedule::Every { every_ms: 60_000 };
        let json = serde_json::to_value(&every).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "every", "everyMs": 60000}));

        let at = Schedule::At { at_ms: 123 };
        assert_eq!(
            serde_json::to_value(&at).unwrap(),
            serde_json::json!({"kind": "at", "atMs": 123})
        );
    }

    #[test]
    fn job_fields_are_camel_case() {
        let job = CronJob {
            id: "j1".into(),
            name: "n".into(),
            instruction: "do".into(),
            schedule: Schedule::Cron {
                expr: "0 9 * * *".into(),
            },
            enabled: true,
            created_at_ms: 1,
            last_run_at_ms: None,
            next_run_at_ms: Some(2),
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["createdAtMs"], 1);
        assert_eq!(json["nextRunAtMs"], 2);
        assert!(json.get("lastRunAtMs").is_none());
    }
}
