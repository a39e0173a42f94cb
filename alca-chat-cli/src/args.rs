//! Command line arguments for the chat CLI
//!
//! Every flag can also come from the environment (or a `.env` file).

use alca_chat::ClientConfig;
use clap::Parser;
use std::path::PathBuf;

/// Alça Chat - talk to the Alça Finanças assistant from a terminal
#[derive(Parser, Debug, Clone)]
#[command(name = "alca-chat")]
#[command(about = "Terminal client for the Alça Finanças assistant")]
pub struct Args {
    /// TOML configuration file; flags below override its values
    #[arg(long, short, env = "ALCA_CHAT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Bearer credential of the signed-in user
    #[arg(long, env = "ALCA_CHAT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Persistent channel endpoint (ws:// or wss://)
    #[arg(long, env = "ALCA_CHAT_CHANNEL_URL")]
    pub channel_url: Option<String>,

    /// Fallback request/response endpoint
    #[arg(long, env = "ALCA_CHAT_EXCHANGE_URL")]
    pub exchange_url: Option<String>,

    /// Backend health endpoint
    #[arg(long, env = "ALCA_CHAT_HEALTH_URL")]
    pub health_url: Option<String>,

    /// Delay between channel retries in milliseconds
    #[arg(long, env = "ALCA_CHAT_RECONNECT_DELAY_MS")]
    pub reconnect_delay_ms: Option<u64>,

    /// Start without the assistant greeting
    #[arg(long, env = "ALCA_CHAT_NO_GREETING", default_value = "false")]
    pub no_greeting: bool,

    /// Probe the backend health endpoint and exit
    #[arg(long)]
    pub health: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    pub log_level: String,
}

impl Args {
    /// Validate argument combinations
    pub fn validate(&self) -> Result<(), String> {
        if !self.health && self.token.as_deref().map_or(true, |t| t.trim().is_empty()) {
            return Err("ALCA_CHAT_TOKEN (or --token) is required to chat".to_string());
        }
        Ok(())
    }

    /// Build the client configuration from the file (if any) and overrides.
    pub fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::load(path)?,
            None => ClientConfig::default(),
        };

        if let Some(url) = &self.channel_url {
            config.channel_url = url.clone();
        }
        if let Some(url) = &self.exchange_url {
            config.exchange_url = url.clone();
        }
        if let Some(url) = &self.health_url {
            config.health_url = url.clone();
        }
        if let Some(delay) = self.reconnect_delay_ms {
            config.reconnect_delay_ms = delay;
        }
        if self.no_greeting {
            config = config.without_greeting();
        }

        config.validate()?;
        Ok(config)
    }
}
