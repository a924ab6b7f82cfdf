//! Tool: cron — manage scheduler jobs from inside a conversation.

use async_trait::async_trait;

use deca_scheduler::{JobSpec, Schedule, SchedulerError};

use super::{require_str, Tool, ToolContext};

pub struct CronTool;

#[async_trait]
impl Tool for CronTool {
    fn name(&self) -> &str {
        "cron"
    }

    fn description(&self) -> &str {
        "Manage scheduled jobs. Actions: add (with name, instruction, and one of \
         at_ms/every_ms/cron_expr), remove (id), list, run (id)."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ["add", "remove", "list", "run"] },
                "name": { "type": "string" },
                "instruction": { "type": "string" },
                "at_ms": { "type": "integer", "description": "One-shot: Unix ms." },
                "every_ms": { "type": "integer", "description": "Interval in ms." },
                "cron_expr": { "type": "string", "description": "Five-field cron expression." },
                "id": { "type": "string" }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, input: serde_json::Value, ctx: &ToolContext) -> String {
        let Some(scheduler) = &ctx.scheduler else {
            return "错误: scheduler not available".to_string();
        };
        let action = match require_str(&input, "action") {
            Ok(a) => a,
            Err(e) => return e,
        };

        match action {
            "add" => {
                let name = match require_str(&input, "name") {
                    Ok(n) => n,
                    Err(e) => return e,
                };
                let instruction = match require_str(&input, "instruction") {
                    Ok(i) => i,
                    Err(e) => return e,
                };
                let schedule = if let Some(at) = input.get("at_ms").and_then(|v| v.as_i64()) {
                    Schedule::At { at_ms: at }
                } else if let Some(every) = input.get("every_ms").and_then(|v| v.as_i64()) {
                    Schedule::Every { every_ms: every }
                } else if let Some(expr) = input.get("cron_expr").and_then(|v| v.as_str()) {
                    Schedule::Cron {
                        expr: expr.to_string(),
                    }
                } else {
                    return "错误: add requires one of at_ms, every_ms, cron_expr".to_string();
                };

                match scheduler.add_job(JobSpec {
                    name: name.to_string(),
                    instruction: instruction.to_string(),
                    schedule,
                }) {
                    Ok(job) => format!("added job '{}' id={}", job.name, job.id),
                    Err(SchedulerError::InvalidCron) => "错误: Invalid cron expression".to_string(),
                    Err(e) => format!("错误: {e}"),
                }
            }
            "remove" => {
                let id = match require_str(&input, "id") {
                    Ok(i) => i,
                    Err(e) => return e,
                };
                if scheduler.remove_job(id) {
                    format!("removed job {id}")
                } else {
                    format!("错误: no job with id '{id}'")
                }
            }
            "list" => {
                let jobs = scheduler.list_jobs();
                if jobs.is_empty() {
                    return "no scheduled jobs".to_string();
                }
                jobs.iter()
                    .map(|j| {
                        format!(
                            "{} [{}] enabled={} next={:?}",
                            j.id, j.name, j.enabled, j.next_run_at_ms
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            "run" => {
                let id = match require_str(&input, "id") {
                    Ok(i) => i,
                    Err(e) => return e,
                };
                match scheduler.run_job(id) {
                    Ok(()) => format!("job {id} fired"),
                    Err(e) => format!("错误: {e}"),
                }
            }
            other => format!("错误: unknown action '{other}'"),
        }
    }
}
