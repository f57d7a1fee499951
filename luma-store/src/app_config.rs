use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

/// Remote order service. When `base_url` is unset the gateway runs purely
/// against the local store.
#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    pub base_url: Option<String>,
    #[serde(default = "default_remote_timeout")]
    pub timeout_seconds: u64,
    /// Disables the local fallback; remote failures surface to the caller.
    #[serde(default)]
    pub remote_only: bool,
}

fn default_remote_timeout() -> u64 {
    8
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_seconds: default_remote_timeout(),
            remote_only: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BillingConfig {
    /// Card gateway secret. Unset means the mock gateway is used.
    pub secret_key: Option<String>,
    /// Shared secret for verifying webhook signatures.
    pub webhook_secret: Option<String>,
}

impl BillingConfig {
    pub fn gateway_configured(&self) -> bool {
        self.secret_key
            .as_deref()
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false)
    }
}

/// SMTP settings consumed only by the notification worker. Any missing
/// field leaves the mail transport unconfigured and delivery logs instead.
#[derive(Debug, Deserialize, Clone)]
pub struct MailConfig {
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: Option<String>,
}

fn default_smtp_port() -> u16 {
    587
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            username: None,
            password: None,
            from_address: None,
        }
    }
}

impl MailConfig {
    pub fn is_configured(&self) -> bool {
        let filled = |v: &Option<String>| v.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false);
        filled(&self.smtp_host) && filled(&self.from_address)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_idle_backoff")]
    pub idle_backoff_seconds: u64,
    /// API instance the worker polls for jobs.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

fn default_poll_interval() -> u64 {
    2
}

fn default_idle_backoff() -> u64 {
    5
}

fn default_api_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval(),
            idle_backoff_seconds: default_idle_backoff(),
            api_base_url: default_api_base_url(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `LUMA__SERVER__PORT=9000`
            .add_source(config::Environment::with_prefix("LUMA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
