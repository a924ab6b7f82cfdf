//! Inbound routing and outbound delivery.
//!
//! Every piece of work (platform messages, HTTP chat, cron instructions,
//! heartbeat prompts) funnels into the per-session lanes and comes back out
//! through the [`Dispatcher`], which runs the agent and pushes chunked
//! replies to the registered channel adapters.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use deca_agent::{Agent, AgentEvents, NullEvents};
use deca_channels::{
    chunk_message, is_allowed, strip_heartbeat_token, Channel, ChannelKind, MessageRequest,
    OutboundMessage, ReplyQueue,
};
use deca_core::config::DecaConfig;
use deca_core::key::{build_session_key, SessionScope};
use deca_heartbeat::{HeartbeatCallback, HeartbeatManager, TriggerRequest};
use deca_scheduler::{CronScheduler, TriggerFn};
use deca_sessions::{LaneConsumer, LaneRouter, SessionError};

/// Sent when a run fails before producing any output.
const GENERIC_ERROR_REPLY: &str = "Something went wrong while handling your message.";

pub struct Dispatcher {
    agent: Arc<Agent>,
    channels: DashMap<String, Arc<dyn Channel>>,
    max_chunk_chars: usize,
    reply_flush_ms: u64,
}

impl Dispatcher {
    pub fn new(agent: Arc<Agent>, max_chunk_chars: usize, reply_flush_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            agent,
            channels: DashMap::new(),
            max_chunk_chars,
            reply_flush_ms,
        })
    }

    /// Register a platform adapter for outbound delivery.
    pub fn register_channel(&self, channel: Arc<dyn Channel>) {
        info!(channel = channel.name(), "channel registered");
        self.channels.insert(channel.name().to_string(), channel);
    }

    /// Chunk and deliver text to every registered adapter. Each chunk gets
    /// one retry before being dropped with an error log.
    pub async fn deliver(&self, session_key: &str, text: &str) {
        let chunks = chunk_message(text, self.max_chunk_chars);
        let channels: Vec<Arc<dyn Channel>> =
            self.channels.iter().map(|e| Arc::clone(e.value())).collect();
        for channel in &channels {
            for chunk in &chunks {
                let msg = OutboundMessage {
                    session_key: session_key.to_string(),
                    text: chunk.clone(),
                };
                if let Err(first) = channel.send(&msg).await {
                    warn!(channel = channel.name(), error = %first, "send failed, retrying chunk");
                    if let Err(second) = channel.send(&msg).await {
                        error!(channel = channel.name(), error = %second, "chunk dropped");
                    }
                }
            }
        }
    }

    /// Run the agent on lane-delivered text and route the reply back out.
    async fn run_and_reply(&self, key: &str, text: String) {
        let (tx, mut rx) = mpsc::channel::<String>(16);
        let queue = ReplyQueue::new(tx, self.reply_flush_ms);

        // Forward emitted strings to the adapters; awaited before the lane
        // slot frees so per-session delivery stays ordered.
        let key_owned = key.to_string();
        let channels: Vec<Arc<dyn Channel>> =
            self.channels.iter().map(|e| Arc::clone(e.value())).collect();
        let max_chunk = self.max_chunk_chars;
        let forwarder = tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                for chunk in chunk_message(&text, max_chunk) {
                    for channel in &channels {
                        let msg = OutboundMessage {
                            session_key: key_owned.clone(),
                            text: chunk.clone(),
                        };
                        if let Err(first) = channel.send(&msg).await {
                            warn!(channel = channel.name(), error = %first, "send failed, retrying chunk");
                            if let Err(second) = channel.send(&msg).await {
                                error!(channel = channel.name(), error = %second, "chunk dropped");
                            }
                        }
                    }
                }
            }
        });

        let events = ProgressEvents { queue: &queue };
        let ok = match self.agent.run(key, &text, &events).await {
            Ok(result) => {
                if result.text.trim().is_empty() {
                    debug!(key, "run produced no text, nothing to deliver");
                } else {
                    queue.finalize(result.text).await;
                }
                true
            }
            Err(e) => {
                error!(key, error = %e, "agent run failed");
                queue.finalize(GENERIC_ERROR_REPLY).await;
                false
            }
        };

        drop(queue);
        let _ = forwarder.await;

        let channels: Vec<Arc<dyn Channel>> =
            self.channels.iter().map(|e| Arc::clone(e.value())).collect();
        for channel in &channels {
            if let Err(e) = channel.react(key, ok).await {
                warn!(channel = channel.name(), error = %e, "ack reaction failed");
            }
        }
    }
}

/// Progress lines batched between flushes; the final text arrives via
/// `finalize`.
struct ProgressEvents<'a> {
    queue: &'a ReplyQueue,
}

impl AgentEvents for ProgressEvents<'_> {
    fn on_tool_start(&self, name: &str, _input: &serde_json::Value) {
        self.queue.progress(format!("⚙️ {name}"));
    }
}

#[async_trait]
impl LaneConsumer for Dispatcher {
    async fn process(&self, key: &str, text: String) {
        self.run_and_reply(key, text).await;
    }
}

/// Map an inbound message to its session scope. The configured main channel
/// overrides to `main` so operator traffic shares the cron/heartbeat
/// session.
pub fn route_scope(config: &DecaConfig, req: &MessageRequest) -> SessionScope {
    let guild = req.channel.guild_id.clone();
    if let (Some(main_guild), Some(main_chan)) = (
        &config.channels.main_guild_id,
        &config.channels.main_channel_id,
    ) {
        if guild.as_deref() == Some(main_guild.as_str()) && req.channel.id == *main_chan {
            return SessionScope::Main;
        }
    }

    match (req.channel.kind, guild) {
        (ChannelKind::Thread, Some(guild_id)) => SessionScope::Thread {
            guild_id,
            thread_id: req
                .channel
                .thread_id
                .clone()
                .unwrap_or_else(|| req.channel.id.clone()),
        },
        (ChannelKind::Guild, Some(guild_id)) => SessionScope::Channel {
            guild_id,
            channel_id: req.channel.id.clone(),
        },
        _ => SessionScope::User {
            user_id: req.sender.id.clone(),
        },
    }
}

/// Outcome of [`inbound`].
#[derive(Debug, PartialEq, Eq)]
pub enum InboundOutcome {
    Queued { session_key: String },
    Denied,
}

/// Allowlist, route, and enqueue one platform message.
pub fn inbound(
    config: &DecaConfig,
    lanes: &LaneRouter,
    mut req: MessageRequest,
) -> Result<InboundOutcome, SessionError> {
    if !is_allowed(&config.allow, &req) {
        debug!(user = %req.sender.id, channel = %req.channel.id, "message denied by allowlist");
        return Ok(InboundOutcome::Denied);
    }

    let scope = route_scope(config, &req);
    let key = build_session_key(&config.agent.agent_id, &scope);
    req.session_key = Some(key.clone());
    lanes.submit_text(&key, req.content)?;
    Ok(InboundOutcome::Queued { session_key: key })
}

/// Run `prompt` through the session lane and hand back the final text.
/// Used by cron, heartbeat, and `POST /chat`, which all need the reply.
pub async fn run_in_lane(
    agent: Arc<Agent>,
    lanes: &LaneRouter,
    key: &str,
    prompt: String,
) -> Result<String, String> {
    let (tx, rx) = oneshot::channel();
    let key_owned = key.to_string();
    lanes
        .submit_task(key, async move {
            let outcome = agent
                .run(&key_owned, &prompt, &NullEvents)
                .await
                .map(|r| r.text)
                .map_err(|e| e.to_string());
            let _ = tx.send(outcome);
        })
        .map_err(|e| e.to_string())?;
    rx.await.map_err(|_| "lane dropped the task".to_string())?
}

/// Install the cron dispatch callback: instructions run through the main
/// lane and results deliver verbatim (no HEARTBEAT_OK filtering).
pub fn wire_cron(
    scheduler: &CronScheduler,
    agent: Arc<Agent>,
    lanes: Arc<LaneRouter>,
    dispatcher: Arc<Dispatcher>,
    agent_id: &str,
) {
    let main_key = build_session_key(agent_id, &SessionScope::Main);
    let cb: TriggerFn = Arc::new(move |job| {
        let agent = Arc::clone(&agent);
        let lanes = Arc::clone(&lanes);
        let dispatcher = Arc::clone(&dispatcher);
        let key = main_key.clone();
        Box::pin(async move {
            info!(job_id = %job.id, name = %job.name, "cron instruction dispatched");
            let text = run_in_lane(agent, &lanes, &key, job.instruction.clone()).await?;
            if !text.trim().is_empty() {
                dispatcher.deliver(&key, &text).await;
            }
            Ok(())
        })
    });
    scheduler.set_on_trigger(cb);
}

/// Install the heartbeat callback: pending tasks become a prompt for the
/// main session; `HEARTBEAT_OK` responses are suppressed or stripped before
/// delivery. The raw response text is returned so the manager can suppress
/// duplicates.
pub fn wire_heartbeat(
    heartbeat: &HeartbeatManager,
    agent: Arc<Agent>,
    lanes: Arc<LaneRouter>,
    dispatcher: Arc<Dispatcher>,
    agent_id: &str,
) {
    let main_key = build_session_key(agent_id, &SessionScope::Main);
    let cb: HeartbeatCallback = Arc::new(move |tasks, request: TriggerRequest| {
        let agent = Arc::clone(&agent);
        let lanes = Arc::clone(&lanes);
        let dispatcher = Arc::clone(&dispatcher);
        let key = main_key.clone();
        Box::pin(async move {
            let bullets = tasks
                .iter()
                .map(|t| format!("- {}", t.description))
                .collect::<Vec<_>>()
                .join("\n");
            let prompt = format!(
                "Heartbeat ({} via {}). Pending tasks:\n{}\n\nWork on what you can right now. \
                 Reply with HEARTBEAT_OK if there is nothing worth reporting.",
                request.reason, request.source, bullets
            );

            let text = run_in_lane(agent, &lanes, &key, prompt).await?;
            match strip_heartbeat_token(&text) {
                Some(delivered) if !delivered.trim().is_empty() => {
                    dispatcher.deliver(&key, &delivered).await;
                }
                _ => debug!("heartbeat response suppressed"),
            }
            Ok(text)
        })
    });
    heartbeat.on_trigger(cb);
}

/// Spawns detached subagent runs on their own lanes.
///
/// Holds the agent weakly: the agent owns this host through its tool
/// context, and a strong reference back would pin both forever.
pub struct SubagentSpawner {
    agent: std::sync::Weak<Agent>,
    lanes: Arc<LaneRouter>,
    agent_id: String,
}

impl SubagentSpawner {
    pub fn new(agent: &Arc<Agent>, lanes: Arc<LaneRouter>, agent_id: &str) -> Arc<Self> {
        Arc::new(Self {
            agent: Arc::downgrade(agent),
            lanes,
            agent_id: agent_id.to_string(),
        })
    }
}

#[async_trait]
impl deca_agent::SubagentHost for SubagentSpawner {
    async fn spawn(
        &self,
        spec: deca_agent::SpawnSpec,
    ) -> Result<deca_agent::SpawnReceipt, String> {
        let agent = self.agent.upgrade().ok_or("agent is shutting down")?;
        let run_id = uuid::Uuid::new_v4().to_string();
        let label = spec
            .label
            .clone()
            .unwrap_or_else(|| run_id.chars().take(8).collect());
        let key = build_session_key(&self.agent_id, &SessionScope::Subagent { id: label });

        let task = spec.task;
        let cleanup = spec.cleanup;
        let key_owned = key.clone();
        self.lanes
            .submit_task(&key, async move {
                match agent.run(&key_owned, &task, &NullEvents).await {
                    Ok(result) => {
                        info!(key = %key_owned, turns = result.turns, "subagent run finished")
                    }
                    Err(e) => warn!(key = %key_owned, error = %e, "subagent run failed"),
                }
                if cleanup {
                    let _ = agent.reset(&key_owned);
                }
            })
            .map_err(|e| e.to_string())?;

        Ok(deca_agent::SpawnReceipt {
            run_id,
            session_key: key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deca_agent::llm::{FinalMessage, LlmError, LlmProvider, Usage};
    use deca_agent::{AgentSettings, ChatRequest};
    use deca_channels::{ChannelError, ChannelInfo, Sender};
    use deca_core::types::ContentBlock;
    use deca_heartbeat::{HeartbeatSettings, TaskFile, TriggerReason, TriggerStatus};
    use deca_sessions::{LaneSettings, SessionStore};
    use std::sync::Mutex;

    struct FixedLlm {
        reply: String,
    }

    #[async_trait]
    impl LlmProvider for FixedLlm {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn send(&self, _req: &ChatRequest) -> Result<FinalMessage, LlmError> {
            Ok(FinalMessage {
                content: vec![ContentBlock::Text {
                    text: self.reply.clone(),
                }],
                usage: Usage::default(),
                stop_reason: "end_turn".into(),
            })
        }
    }

    struct RecordingChannel {
        sent: Mutex<Vec<OutboundMessage>>,
    }

    impl RecordingChannel {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }
        fn texts(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|m| m.text.clone()).collect()
        }
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        fn name(&self) -> &str {
            "recording"
        }
        async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push(msg.clone());
            Ok(())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        agent: Arc<Agent>,
        dispatcher: Arc<Dispatcher>,
        lanes: Arc<LaneRouter>,
        channel: Arc<RecordingChannel>,
    }

    fn fixture(reply: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let agent = Arc::new(Agent::new(
            Arc::new(FixedLlm {
                reply: reply.to_string(),
            }),
            Arc::new(SessionStore::new(dir.path().join("sessions"))),
            None,
            None,
            AgentSettings {
                workspace_dir: dir.path().to_path_buf(),
                memory_enabled: false,
                ..AgentSettings::default()
            },
        ));
        let dispatcher = Dispatcher::new(Arc::clone(&agent), 2000, 50);
        let channel = RecordingChannel::new();
        dispatcher.register_channel(channel.clone());
        let lanes = Arc::new(LaneRouter::new(
            LaneSettings {
                debounce_ms: 10,
                max_merged_chars: 10_000,
                mailbox_cap: 64,
            },
            dispatcher.clone(),
        ));
        Fixture {
            _dir: dir,
            agent,
            dispatcher,
            lanes,
            channel,
        }
    }

    fn dm(user: &str, content: &str) -> MessageRequest {
        MessageRequest {
            content: content.into(),
            sender: Sender {
                id: user.into(),
                username: user.into(),
            },
            channel: ChannelInfo {
                id: format!("dm-{user}"),
                kind: ChannelKind::Dm,
                guild_id: None,
                thread_id: None,
            },
            session_key: None,
        }
    }

    #[test]
    fn scope_routing_covers_all_shapes() {
        let mut config = DecaConfig::default();
        config.channels.main_guild_id = Some("g-main".into());
        config.channels.main_channel_id = Some("c-main".into());

        let dm_req = dm("alice", "hi");
        assert_eq!(
            route_scope(&config, &dm_req),
            SessionScope::User {
                user_id: "alice".into()
            }
        );

        let mut guild_req = dm("alice", "hi");
        guild_req.channel.kind = ChannelKind::Guild;
        guild_req.channel.guild_id = Some("g1".into());
        guild_req.channel.id = "c1".into();
        assert_eq!(
            route_scope(&config, &guild_req),
            SessionScope::Channel {
                guild_id: "g1".into(),
                channel_id: "c1".into()
            }
        );

        let mut thread_req = guild_req.clone();
        thread_req.channel.kind = ChannelKind::Thread;
        thread_req.channel.thread_id = Some("t1".into());
        assert_eq!(
            route_scope(&config, &thread_req),
            SessionScope::Thread {
                guild_id: "g1".into(),
                thread_id: "t1".into()
            }
        );

        // The main-channel override wins over channel scope.
        let mut main_req = guild_req;
        main_req.channel.guild_id = Some("g-main".into());
        main_req.channel.id = "c-main".into();
        assert_eq!(route_scope(&config, &main_req), SessionScope::Main);
    }

    #[tokio::test]
    async fn inbound_message_reaches_channel_reply() {
        let f = fixture("the reply");
        let config = DecaConfig::default();

        let outcome = inbound(&config, &f.lanes, dm("alice", "hello")).unwrap();
        let InboundOutcome::Queued { session_key } = outcome else {
            panic!("expected queued");
        };
        assert_eq!(session_key, "agent:main:user:alice");

        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        assert_eq!(f.channel.texts(), vec!["the reply"]);
        // The conversation landed in the right session.
        assert_eq!(f.agent.get_history(&session_key).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn denied_sender_is_dropped() {
        let f = fixture("nope");
        let mut config = DecaConfig::default();
        config.allow.deny_users = vec!["mallory".into()];

        let outcome = inbound(&config, &f.lanes, dm("mallory", "let me in")).unwrap();
        assert_eq!(outcome, InboundOutcome::Denied);

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(f.channel.texts().is_empty());
    }

    #[tokio::test]
    async fn cron_delivers_without_heartbeat_filtering() {
        let f = fixture("HEARTBEAT_OK");
        let dir = tempfile::tempdir().unwrap();
        let scheduler = Arc::new(CronScheduler::new(dir.path().join("cron.json")));
        scheduler.initialize().unwrap();
        wire_cron(
            &scheduler,
            Arc::clone(&f.agent),
            Arc::clone(&f.lanes),
            Arc::clone(&f.dispatcher),
            "main",
        );

        let job = scheduler
            .add_job(deca_scheduler::JobSpec {
                name: "status".into(),
                instruction: "report status".into(),
                schedule: deca_scheduler::Schedule::At { at_ms: 1 },
            })
            .unwrap();
        scheduler.run_job(&job.id).unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        // Cron never strips the sentinel: the literal text is delivered.
        assert_eq!(f.channel.texts(), vec!["HEARTBEAT_OK"]);
        scheduler.shutdown();
    }

    #[tokio::test]
    async fn heartbeat_suppresses_sentinel_reply() {
        let f = fixture("HEARTBEAT_OK");
        let dir = tempfile::tempdir().unwrap();
        let task_path = dir.path().join("HEARTBEAT.md");
        std::fs::write(&task_path, "- [ ] check the backlog\n").unwrap();
        let heartbeat = Arc::new(HeartbeatManager::new(
            HeartbeatSettings {
                coalesce_ms: 10,
                ..HeartbeatSettings::default()
            },
            TaskFile::new(&task_path),
        ));
        wire_heartbeat(
            &heartbeat,
            Arc::clone(&f.agent),
            Arc::clone(&f.lanes),
            Arc::clone(&f.dispatcher),
            "main",
        );

        let outcome = heartbeat
            .trigger(TriggerRequest {
                reason: TriggerReason::Requested,
                source: "test".into(),
                requested_at_ms: 0,
            })
            .await;
        assert_eq!(outcome.status, TriggerStatus::Completed);
        assert_eq!(outcome.response.as_deref(), Some("HEARTBEAT_OK"));
        // Sentinel suppressed: nothing delivered.
        assert!(f.channel.texts().is_empty());
    }

    #[tokio::test]
    async fn subagent_spawn_runs_on_its_own_lane() {
        let f = fixture("subagent done");
        let spawner = SubagentSpawner::new(&f.agent, Arc::clone(&f.lanes), "main");
        f.agent.set_subagent_host(spawner.clone());

        let receipt = deca_agent::SubagentHost::spawn(
            spawner.as_ref(),
            deca_agent::SpawnSpec {
                task: "collect logs".into(),
                label: Some("logs".into()),
                cleanup: false,
            },
        )
        .await
        .unwrap();
        assert_eq!(receipt.session_key, "agent:main:subagent:logs");

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        let history = f.agent.get_history(&receipt.session_key).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content.text(), "subagent done");
    }

    #[tokio::test]
    async fn heartbeat_delivers_real_report() {
        let f = fixture("report: backlog shrinking");
        let dir = tempfile::tempdir().unwrap();
        let task_path = dir.path().join("HEARTBEAT.md");
        std::fs::write(&task_path, "- [ ] check the backlog\n").unwrap();
        let heartbeat = Arc::new(HeartbeatManager::new(
            HeartbeatSettings::default(),
            TaskFile::new(&task_path),
        ));
        wire_heartbeat(
            &heartbeat,
            Arc::clone(&f.agent),
            Arc::clone(&f.lanes),
            Arc::clone(&f.dispatcher),
            "main",
        );

        heartbeat
            .trigger(TriggerRequest {
                reason: TriggerReason::Interval,
                source: "interval".into(),
                requested_at_ms: 0,
            })
            .await;
        assert_eq!(f.channel.texts(), vec!["report: backlog shrinking"]);
    }
}
