//! Configuration for alca-chat

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::error::ClientError;

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Persistent channel endpoint; the credential is appended as `?token=`
    #[serde(default = "default_channel_url")]
    pub channel_url: String,

    /// Request/response endpoint used when the channel is unavailable
    #[serde(default = "default_exchange_url")]
    pub exchange_url: String,

    /// Backend health probe
    #[serde(default = "default_health_url")]
    pub health_url: String,

    /// Fixed delay before retrying the persistent channel
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Upper bound on a single channel establishment
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Timeout for fallback exchanges
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Assistant message seeded as the first log entry
    #[serde(default = "default_greeting")]
    pub greeting: Option<String>,

    /// Shown when a failed exchange carries no human-readable detail
    #[serde(default = "default_fallback_error_text")]
    pub fallback_error_text: String,

    /// Shown when a fallback send finds no credential to authenticate with
    #[serde(default = "default_missing_credential_text")]
    pub missing_credential_text: String,

    /// Buffer size of the client event broadcast
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_channel_url() -> String {
    "wss://chat.alcahub.com.br/api/chat/ws".to_string()
}

fn default_exchange_url() -> String {
    "https://chat.alcahub.com.br/api/chat".to_string()
}

fn default_health_url() -> String {
    "https://chat.alcahub.com.br/api/health".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    3_000
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_greeting() -> Option<String> {
    Some("Olá! Sou o assistente virtual da Alça Finanças. Como posso ajudá-lo hoje?".to_string())
}

fn default_fallback_error_text() -> String {
    "Desculpe, ocorreu um erro. Tente novamente.".to_string()
}

fn default_missing_credential_text() -> String {
    "Sua sessão expirou. Faça login novamente para continuar.".to_string()
}

fn default_event_capacity() -> usize {
    256
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            channel_url: default_channel_url(),
            exchange_url: default_exchange_url(),
            health_url: default_health_url(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            greeting: default_greeting(),
            fallback_error_text: default_fallback_error_text(),
            missing_credential_text: default_missing_credential_text(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl ClientConfig {
    /// Load config from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ClientError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse config from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ClientError> {
        Ok(toml::from_str(content)?)
    }

    /// Drop the seeded greeting.
    pub fn without_greeting(mut self) -> Self {
        self.greeting = None;
        self
    }

    /// Check URL schemes and limits.
    pub fn validate(&self) -> Result<(), ClientError> {
        check_scheme(&self.channel_url, &["ws", "wss"])?;
        check_scheme(&self.exchange_url, &["http", "https"])?;
        check_scheme(&self.health_url, &["http", "https"])?;

        if self.event_capacity == 0 {
            return Err(ClientError::Config(
                "event_capacity must be greater than zero".into(),
            ));
        }

        Ok(())
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Channel URL carrying the bearer credential as a query parameter.
    ///
    /// The connection layer has no header mechanism, so the token travels in
    /// the URL. Never log the returned value.
    pub fn channel_url_with_token(&self, credential: &str) -> Result<String, ClientError> {
        let mut url = Url::parse(&self.channel_url)?;
        url.query_pairs_mut().append_pair("token", credential);
        Ok(url.into())
    }
}

fn check_scheme(raw: &str, allowed: &[&str]) -> Result<(), ClientError> {
    let url = Url::parse(raw)?;
    if allowed.contains(&url.scheme()) {
        Ok(())
    } else {
        Err(ClientError::Config(format!(
            "{} must use one of {:?}, got '{}'",
            raw,
            allowed,
            url.scheme()
        )))
    }
}
