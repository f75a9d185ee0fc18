use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub gateways: GatewaysSettings,
    pub notifier: NotifierSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_log_format() -> String {
    "pretty".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewaysSettings {
    pub a: GatewaySettings,
    pub b: GatewaySettings,
}

/// Connection details for one card gateway's verification API.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySettings {
    pub base_url: String,
    pub secret_key: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl GatewaySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierSettings {
    pub base_url: String,
    pub api_key: String,
    /// `from` address on every outgoing email.
    pub sender: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl NotifierSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        builder.build()?.try_deserialize()
    }
}
