pub mod error;
pub mod hours;
pub mod manager;
pub mod tasks;

pub use error::{HeartbeatError, Result};
pub use hours::ActiveWindow;
pub use manager::{
    HeartbeatCallback, HeartbeatManager, HeartbeatSettings, TriggerOutcome, TriggerReason,
    TriggerRequest, TriggerStatus,
};
pub use tasks::{parse_tasks, HeartbeatTask, TaskFile};
