//! Command line and environment configuration.

use a3s_enrich_core::config::{
    DescriberConfig, EnrichConfig, RegistryConfig, DEFAULT_API_KEY, DEFAULT_DESCRIBE_ENDPOINT,
    DEFAULT_LISTEN_ADDRESS, DEFAULT_REGISTRY_ADDRESS, DEFAULT_TAG,
};
use clap::{Parser, ValueEnum};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// A3S Enrich webhook server
#[derive(Parser, Debug)]
#[command(
    name = "a3s-enrich",
    version,
    about = "Adds image descriptions to manifest layers on registry push notifications"
)]
pub struct Args {
    /// HTTP listen address. `:PORT` binds all interfaces.
    #[arg(long, env = "ADDRESS_HTTP_SERVER", default_value = DEFAULT_LISTEN_ADDRESS)]
    pub listen: String,

    /// Registry `host[:port]`.
    #[arg(long, env = "ADDRESS_REGISTRY", default_value = DEFAULT_REGISTRY_ADDRESS)]
    pub registry: String,

    /// Use TLS towards the registry.
    #[arg(long, env = "REGISTRY_HTTPS")]
    pub registry_https: bool,

    /// Registry basic auth username.
    #[arg(long, env = "REGISTRY_USERNAME")]
    pub registry_username: Option<String>,

    /// Registry basic auth password.
    #[arg(long, env = "REGISTRY_PASSWORD", hide_env_values = true)]
    pub registry_password: Option<String>,

    /// Description service credential.
    #[arg(
        long,
        env = "OPEN_API_KEY",
        default_value = DEFAULT_API_KEY,
        hide_env_values = true,
        hide_default_value = true
    )]
    pub api_key: String,

    /// Description service endpoint.
    #[arg(long, env = "DESCRIBE_ENDPOINT", default_value = DEFAULT_DESCRIBE_ENDPOINT)]
    pub describe_endpoint: String,

    /// Model asked for descriptions.
    #[arg(long, env = "DESCRIBE_MODEL", default_value = "gpt-4o")]
    pub describe_model: String,

    /// Per-call timeout for the description service, in seconds.
    #[arg(long, env = "DESCRIBE_TIMEOUT_SECS", default_value_t = 30)]
    pub describe_timeout_secs: u64,

    /// Tag pointed at each rewritten manifest.
    #[arg(long, env = "ENRICH_TAG", default_value = DEFAULT_TAG)]
    pub tag: String,

    /// Log output format.
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Args {
    /// Fold arguments into the service configuration.
    pub fn into_config(self) -> EnrichConfig {
        EnrichConfig {
            listen_address: self.listen,
            registry: RegistryConfig {
                address: self.registry,
                plain_http: !self.registry_https,
                username: self.registry_username,
                password: self.registry_password,
            },
            describer: DescriberConfig {
                endpoint: self.describe_endpoint,
                api_key: self.api_key,
                model: self.describe_model,
                timeout_secs: self.describe_timeout_secs,
                ..Default::default()
            },
            tag: self.tag,
        }
    }
}
