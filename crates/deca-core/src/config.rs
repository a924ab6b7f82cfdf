use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Gateway constants
pub const DEFAULT_PORT: u16 = 8710;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Shared-secret header checked by every authenticated endpoint.
pub const AUTH_HEADER: &str = "x-deca-key";
/// Default persisted-state directory, resolved under the working directory.
pub const DEFAULT_STATE_DIR: &str = ".deca";
/// Hard cap on buffered subprocess output (stdout + stderr).
pub const MAX_EXEC_BUFFER_BYTES: usize = 1024 * 1024;
/// How long shutdown waits for lanes to drain before force-terminating.
pub const SHUTDOWN_GRACE_MS: u64 = 10_000;
/// Availability probes (provider version checks) time out after this.
pub const PROBE_TIMEOUT_MS: u64 = 5_000;

/// Top-level config (deca.toml + DECA_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecaConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub allow: AllowConfig,
    #[serde(default)]
    pub search: SearchConfig,
    /// Root for sessions/, memory/, cron.json, credentials/.
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
}

impl Default for DecaConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            agent: AgentConfig::default(),
            session: SessionConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            providers: ProvidersConfig::default(),
            channels: ChannelsConfig::default(),
            allow: AllowConfig::default(),
            search: SearchConfig::default(),
            state_dir: default_state_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Shared secret expected in the `x-deca-key` header. `None` disables auth.
    pub key: Option<String>,
    /// Origins allowed to call `GET /auth/key`.
    #[serde(default)]
    pub origin_allowlist: Vec<String>,
    /// Whether `GET /health` requires the auth header.
    #[serde(default)]
    pub health_requires_auth: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            key: None,
            origin_allowlist: Vec::new(),
            health_requires_auth: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_id")]
    pub agent_id: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Workspace the agent operates in. Defaults to the working directory.
    pub workspace_dir: Option<String>,
    /// Maximum model calls per `run` invocation.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// Context window assumed for pruning/compaction budgets.
    #[serde(default = "default_context_window")]
    pub context_window_tokens: usize,
    /// Per-bootstrap-file truncation threshold.
    #[serde(default = "default_bootstrap_max_chars")]
    pub bootstrap_max_chars: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "bool_true")]
    pub memory_enabled: bool,
    #[serde(default = "bool_true")]
    pub skills_enabled: bool,
    #[serde(default = "bool_true")]
    pub allow_exec: bool,
    #[serde(default = "bool_true")]
    pub allow_write: bool,
    #[serde(default)]
    pub sandbox: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_id: default_agent_id(),
            model: default_model(),
            workspace_dir: None,
            max_turns: default_max_turns(),
            context_window_tokens: default_context_window(),
            bootstrap_max_chars: default_bootstrap_max_chars(),
            max_tokens: default_max_tokens(),
            memory_enabled: true,
            skills_enabled: true,
            allow_exec: true,
            allow_write: true,
            sandbox: false,
        }
    }
}

/// Per-session lane tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Messages arriving within this window coalesce into one work item.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Coalescing flushes early past this merged size.
    #[serde(default = "default_max_merged_chars")]
    pub max_merged_chars: usize,
    /// Mailbox hard cap; submissions beyond it are rejected.
    #[serde(default = "default_mailbox_cap")]
    pub mailbox_cap: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            max_merged_chars: default_max_merged_chars(),
            mailbox_cap: default_mailbox_cap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub interval_ms: u64,
    /// `HH:MM` local-time window; overnight ranges (22:00 → 06:00) supported.
    pub active_hours: Option<ActiveHours>,
    #[serde(default = "default_coalesce_ms")]
    pub coalesce_ms: u64,
    /// Identical responses within this window are suppressed.
    #[serde(default = "default_duplicate_window_ms")]
    pub duplicate_window_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_heartbeat_interval_ms(),
            active_hours: None,
            coalesce_ms: default_coalesce_ms(),
            duplicate_window_ms: default_duplicate_window_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveHours {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Fallback order for command execution.
    #[serde(default = "default_provider_priority")]
    pub priority: Vec<String>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            priority: default_provider_priority(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsConfig {
    /// Platform hard limit for one outbound message.
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
    /// Progress updates batch on this interval before flushing.
    #[serde(default = "default_reply_flush_ms")]
    pub reply_flush_ms: u64,
    /// Messages in this (guild, channel) route to `agent:<id>:main` so
    /// operator traffic shares the cron/heartbeat session.
    pub main_guild_id: Option<String>,
    pub main_channel_id: Option<String>,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: default_max_chunk_chars(),
            reply_flush_ms: default_reply_flush_ms(),
            main_guild_id: None,
            main_channel_id: None,
        }
    }
}

/// Inbound allowlist. Deny entries always win over allow entries; an empty
/// allow list admits everyone (deny rules still apply).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AllowConfig {
    #[serde(default)]
    pub allow_users: Vec<String>,
    #[serde(default)]
    pub deny_users: Vec<String>,
    #[serde(default)]
    pub allow_guilds: Vec<String>,
    #[serde(default)]
    pub deny_guilds: Vec<String>,
    #[serde(default)]
    pub allow_channels: Vec<String>,
    #[serde(default)]
    pub deny_channels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// External search API key. Absent key degrades the tools to error strings.
    pub api_key: Option<String>,
    #[serde(default = "default_search_base_url")]
    pub base_url: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_search_base_url(),
        }
    }
}

impl DecaConfig {
    /// Load config: explicit path > DECA_CONFIG env > ./deca.toml, then
    /// DECA_* env overrides on top.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("DECA_CONFIG").ok())
            .unwrap_or_else(|| "deca.toml".to_string());

        let config: DecaConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("DECA_").split("__"))
            .extract()
            .map_err(|e| crate::error::DecaError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_agent_id() -> String {
    "main".to_string()
}
fn default_model() -> String {
    "claude-sonnet-4-5".to_string()
}
fn default_max_turns() -> usize {
    10
}
fn default_context_window() -> usize {
    200_000
}
fn default_bootstrap_max_chars() -> usize {
    20_000
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_debounce_ms() -> u64 {
    3000
}
fn default_max_merged_chars() -> usize {
    12_000
}
fn default_mailbox_cap() -> usize {
    64
}
fn default_heartbeat_interval_ms() -> u64 {
    30 * 60 * 1000
}
fn default_coalesce_ms() -> u64 {
    250
}
fn default_duplicate_window_ms() -> u64 {
    10 * 60 * 1000
}
fn default_provider_priority() -> Vec<String> {
    ["codex", "claude", "opencode", "native", "applescript"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_max_chunk_chars() -> usize {
    2000
}
fn default_reply_flush_ms() -> u64 {
    1000
}
fn default_search_base_url() -> String {
    "https://api.tavily.com/search".to_string()
}
fn default_state_dir() -> String {
    DEFAULT_STATE_DIR.to_string()
}
fn bool_true() -> bool {
    true
}
