//! Process-wide configuration.
//!
//! Built once at startup and handed to each component; nothing reads the
//! environment after that.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{EnrichError, Result};

/// Default HTTP listen address (all interfaces).
pub const DEFAULT_LISTEN_ADDRESS: &str = ":8888";

/// Default registry address.
pub const DEFAULT_REGISTRY_ADDRESS: &str = "registry:5000";

/// Placeholder credential used when none is configured.
pub const DEFAULT_API_KEY: &str = "sk-proj-no-key-set-env";

/// Default description service endpoint.
pub const DEFAULT_DESCRIBE_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Tag moved to the rewritten manifest.
pub const DEFAULT_TAG: &str = "latest";

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    /// HTTP listen address. A leading `:` binds all interfaces.
    pub listen_address: String,

    /// Registry connection settings
    pub registry: RegistryConfig,

    /// Description service settings
    pub describer: DescriberConfig,

    /// Tag pointed at each republished manifest
    pub tag: String,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            registry: RegistryConfig::default(),
            describer: DescriberConfig::default(),
            tag: DEFAULT_TAG.to_string(),
        }
    }
}

impl EnrichConfig {
    /// Address in a form `TcpListener::bind` accepts.
    pub fn bind_address(&self) -> String {
        if self.listen_address.starts_with(':') {
            format!("0.0.0.0{}", self.listen_address)
        } else {
            self.listen_address.clone()
        }
    }

    /// Reject settings that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.listen_address.trim().is_empty() {
            return Err(EnrichError::ConfigError("listen address is empty".to_string()));
        }
        if self.registry.address.trim().is_empty() {
            return Err(EnrichError::ConfigError("registry address is empty".to_string()));
        }
        if self.tag.trim().is_empty() {
            return Err(EnrichError::ConfigError("tag is empty".to_string()));
        }
        self.describer.validate()
    }
}

/// Registry connection settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// `host[:port]` of the registry
    pub address: String,

    /// Talk plain HTTP instead of TLS
    pub plain_http: bool,

    /// Basic auth username
    pub username: Option<String>,

    /// Basic auth password
    pub password: Option<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_REGISTRY_ADDRESS.to_string(),
            plain_http: true,
            username: None,
            password: None,
        }
    }
}

impl std::fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryConfig")
            .field("address", &self.address)
            .field("plain_http", &self.plain_http)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Description service settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriberConfig {
    /// Chat completions endpoint
    pub endpoint: String,

    /// Bearer credential
    pub api_key: String,

    /// Model name
    pub model: String,

    /// Instruction sent alongside each image
    pub prompt: String,

    /// Completion length cap
    pub max_tokens: u32,

    /// Wall-clock bound for one call, in seconds
    pub timeout_secs: u64,
}

impl Default for DescriberConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_DESCRIBE_ENDPOINT.to_string(),
            api_key: DEFAULT_API_KEY.to_string(),
            model: "gpt-4o".to_string(),
            prompt: "Describe this image".to_string(),
            max_tokens: 300,
            timeout_secs: 30,
        }
    }
}

impl DescriberConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(EnrichError::ConfigError(
                "description endpoint is empty".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(EnrichError::ConfigError(
                "description timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for DescriberConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriberConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("prompt", &self.prompt)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
