//! The `deca-gateway` binary: load config, assemble the core, serve HTTP,
//! and drive the background loops. Platform adapters and a concrete LLM
//! client are wired by deployment-specific launchers; without one the
//! gateway still serves health, provider, and exec endpoints.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use clap::Parser;
use tracing::{info, warn};

use deca_agent::llm::{ChatRequest, FinalMessage, LlmError, LlmProvider};
use deca_agent::{Agent, AgentSettings, ToolPolicy};
use deca_core::config::{DecaConfig, SHUTDOWN_GRACE_MS};
use deca_heartbeat::{ActiveWindow, HeartbeatManager, HeartbeatSettings, TaskFile};
use deca_memory::MemoryStore;
use deca_providers::{AppleScriptProvider, CliProvider, NativeProvider, Provider, ProviderRouter};
use deca_scheduler::CronScheduler;
use deca_sessions::{LaneRouter, LaneSettings, SessionStore};

mod app;
mod dispatch;
mod http;

#[derive(Parser)]
#[command(name = "deca-gateway", about = "Multi-channel agent gateway")]
struct Cli {
    /// Path to deca.toml (default: ./deca.toml, then DECA_CONFIG).
    #[arg(long)]
    config: Option<String>,
}

/// Placeholder provider used when no LLM client has been wired in. Chat
/// paths surface a clear error; everything else keeps working.
struct UnconfiguredLlm;

#[async_trait]
impl LlmProvider for UnconfiguredLlm {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn send(&self, _req: &ChatRequest) -> Result<FinalMessage, LlmError> {
        Err(LlmError::Unavailable(
            "no LLM provider wired; launch through a configured CLI".to_string(),
        ))
    }
}

fn build_providers(config: &DecaConfig) -> Arc<ProviderRouter> {
    let mut providers: Vec<Arc<dyn Provider>> = Vec::new();
    for name in &config.providers.priority {
        let provider: Option<Arc<dyn Provider>> = match name.as_str() {
            "codex" => Some(Arc::new(CliProvider::codex())),
            "claude" => Some(Arc::new(CliProvider::claude())),
            "opencode" => Some(Arc::new(CliProvider::opencode())),
            "native" => Some(Arc::new(NativeProvider)),
            "applescript" => Some(Arc::new(AppleScriptProvider)),
            other => {
                warn!(provider = other, "unknown provider in priority list, skipping");
                None
            }
        };
        if let Some(p) = provider {
            providers.push(p);
        }
    }
    Arc::new(ProviderRouter::new(
        providers,
        config.providers.priority.clone(),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deca_gateway=info,tower_http=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = DecaConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({e}), using defaults");
        DecaConfig::default()
    });

    let state_dir = PathBuf::from(&config.state_dir);
    let workspace_dir = config
        .agent
        .workspace_dir
        .clone()
        .map(PathBuf::from)
        .unwrap_or(std::env::current_dir()?);

    // Storage subsystems.
    let store = Arc::new(SessionStore::new(state_dir.join("sessions")));
    let memory = config
        .agent
        .memory_enabled
        .then(|| Arc::new(MemoryStore::open(state_dir.join("memory"))));
    let scheduler = Arc::new(CronScheduler::new(state_dir.join("cron.json")));
    scheduler.initialize()?;

    // The agent.
    let agent_settings = AgentSettings {
        agent_id: config.agent.agent_id.clone(),
        model: config.agent.model.clone(),
        workspace_dir: workspace_dir.clone(),
        max_turns: config.agent.max_turns,
        max_tokens: config.agent.max_tokens,
        context_window_tokens: config.agent.context_window_tokens,
        bootstrap_max_chars: config.agent.bootstrap_max_chars,
        memory_enabled: config.agent.memory_enabled,
        skills_enabled: config.agent.skills_enabled,
        policy: ToolPolicy {
            allow_exec: config.agent.allow_exec,
            allow_write: config.agent.allow_write,
            sandbox: config.agent.sandbox,
        },
        search_api_key: config.search.api_key.clone(),
        search_base_url: config.search.base_url.clone(),
    };
    let agent = Arc::new(Agent::new(
        Arc::new(UnconfiguredLlm),
        store,
        memory,
        Some(Arc::clone(&scheduler)),
        agent_settings,
    ));

    // Lanes and dispatch.
    let dispatcher = dispatch::Dispatcher::new(
        Arc::clone(&agent),
        config.channels.max_chunk_chars,
        config.channels.reply_flush_ms,
    );
    let lanes = Arc::new(LaneRouter::new(
        LaneSettings {
            debounce_ms: config.session.debounce_ms,
            max_merged_chars: config.session.max_merged_chars,
            mailbox_cap: config.session.mailbox_cap,
        },
        Arc::clone(&dispatcher) as Arc<dyn deca_sessions::LaneConsumer>,
    ));
    agent.set_subagent_host(dispatch::SubagentSpawner::new(
        &agent,
        Arc::clone(&lanes),
        &config.agent.agent_id,
    ));

    // Background loops.
    dispatch::wire_cron(
        &scheduler,
        Arc::clone(&agent),
        Arc::clone(&lanes),
        Arc::clone(&dispatcher),
        &config.agent.agent_id,
    );

    let active_hours = config.heartbeat.active_hours.as_ref().and_then(|h| {
        ActiveWindow::parse(&h.start, &h.end)
            .map_err(|e| warn!("invalid active hours ({e}), ignoring"))
            .ok()
    });
    let heartbeat = Arc::new(HeartbeatManager::new(
        HeartbeatSettings {
            interval_ms: config.heartbeat.interval_ms,
            active_hours,
            coalesce_ms: config.heartbeat.coalesce_ms,
            duplicate_window_ms: config.heartbeat.duplicate_window_ms,
        },
        TaskFile::new(
            deca_agent::bootstrap::resolve_workspace_root(&workspace_dir).join("HEARTBEAT.md"),
        ),
    ));
    dispatch::wire_heartbeat(
        &heartbeat,
        Arc::clone(&agent),
        Arc::clone(&lanes),
        Arc::clone(&dispatcher),
        &config.agent.agent_id,
    );
    if config.heartbeat.enabled {
        heartbeat.start();
    }

    let providers = build_providers(&config);

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;
    let state = Arc::new(app::AppState {
        config,
        agent,
        lanes: Arc::clone(&lanes),
        dispatcher,
        providers,
        scheduler: Arc::clone(&scheduler),
        heartbeat: Arc::clone(&heartbeat),
        started_at: Instant::now(),
    });
    let router = app::build_router(Arc::clone(&state));

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!(
        %addr,
        agent_id = %state.config.agent.agent_id,
        model = %state.config.agent.model,
        state_dir = %state.config.state_dir,
        "deca gateway listening"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down: draining lanes");
    lanes.shutdown(Duration::from_millis(SHUTDOWN_GRACE_MS)).await;
    scheduler.shutdown();
    heartbeat.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("interrupt received, stopping inbound");
}
