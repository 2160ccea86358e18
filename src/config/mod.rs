//! Configuration management
//!
//! This module provides YAML-based configuration management with support for:
//! - Environment variable overrides
//! - Multiple configuration file locations
//! - Default values for all settings
//!
//! The loaded configuration is immutable for the lifetime of the process.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One mebibyte, the unit body limits are usually expressed in.
pub const MIB: usize = 1024 * 1024;

/// Path prefixes owned by local handlers
const RESERVED_PATHS: [&str; 3] = ["/health", "/auth", "/static"];

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub csrf: CsrfConfig,
    #[serde(default)]
    pub routes: RoutesConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory served under `/static` (optional)
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
    /// Mark cookies issued by the gatekeeper as `Secure`
    #[serde(default)]
    pub secure_cookies: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: None,
            secure_cookies: false,
        }
    }
}

/// Upstream (backend API) connection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Base URL of the upstream server. Proxied routes answer 503 when unset.
    #[serde(default)]
    pub url: Option<String>,
    /// Timeout for ordinary proxied calls (supports `timeout` as an alias)
    #[serde(default = "default_api_timeout", alias = "timeout")]
    pub timeout_secs: u64,
    /// Timeout for calls through the protocol endpoint
    #[serde(default = "default_protocol_timeout")]
    pub protocol_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_api_timeout() -> u64 {
    30
}

fn default_protocol_timeout() -> u64 {
    300
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_api_timeout(),
            protocol_timeout_secs: default_protocol_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Session token configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Shared HMAC secret. When absent, signatures are not checked (dev mode).
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_session_cookie")]
    pub cookie_name: String,
}

fn default_session_cookie() -> String {
    "session".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: None,
            cookie_name: default_session_cookie(),
        }
    }
}

impl SessionConfig {
    /// The configured secret, treating an empty string as "not configured"
    pub fn effective_secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.is_empty())
    }
}

/// CSRF double-submit configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CsrfConfig {
    #[serde(default = "default_csrf_cookie")]
    pub cookie_name: String,
    #[serde(default = "default_csrf_header")]
    pub header_name: String,
    /// Extra paths exempt from CSRF checks (the protocol endpoint and the
    /// machine API prefix are always exempt)
    #[serde(default)]
    pub exempt_paths: Vec<String>,
}

fn default_csrf_cookie() -> String {
    "csrf_token".to_string()
}

fn default_csrf_header() -> String {
    "X-CSRF-Token".to_string()
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_csrf_cookie(),
            header_name: default_csrf_header(),
            exempt_paths: Vec::new(),
        }
    }
}

/// Route class boundaries
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutesConfig {
    /// Prefix of bearer-authenticated machine-to-machine routes
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    /// Path of the protocol (tool-call) endpoint
    #[serde(default = "default_protocol_path")]
    pub protocol_path: String,
}

fn default_api_prefix() -> String {
    "/api/".to_string()
}

fn default_protocol_path() -> String {
    "/mcp".to_string()
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            api_prefix: default_api_prefix(),
            protocol_path: default_protocol_path(),
        }
    }
}

/// Request body ceilings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_body")]
    pub max_body_bytes: usize,
    #[serde(default = "default_protocol_max_body")]
    pub protocol_max_body_bytes: usize,
}

fn default_max_body() -> usize {
    MIB
}

fn default_protocol_max_body() -> usize {
    10 * MIB
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: default_max_body(),
            protocol_max_body_bytes: default_protocol_max_body(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Log output target (console, file or both)
    #[serde(default)]
    pub target: LogTarget,
    /// Directory for log files (used when target is "file" or "both")
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
    #[serde(default = "default_log_rotation")]
    pub daily_rotation: bool,
    /// Capacity of the access-log queue; records beyond it are dropped
    #[serde(default = "default_access_log_capacity")]
    pub access_log_capacity: usize,
}

/// Log output target
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    #[default]
    Console,
    File,
    Both,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/portal-gatekeeper")
}

fn default_log_prefix() -> String {
    "portal-gatekeeper".to_string()
}

fn default_log_rotation() -> bool {
    true
}

fn default_access_log_capacity() -> usize {
    1024
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            log_dir: default_log_dir(),
            log_prefix: default_log_prefix(),
            daily_rotation: default_log_rotation(),
            access_log_capacity: default_access_log_capacity(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values
    /// 2. Configuration file (YAML)
    /// 3. Environment variables (prefixed with PORTAL_)
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let config_path = std::env::var("PORTAL_CONFIG")
            .map(PathBuf::from)
            .ok()
            .or_else(Self::find_config_file);

        let mut config = match config_path {
            Some(ref path) if path.exists() => {
                eprintln!("[CONFIG] Loading configuration from: {:?}", path);
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {:?}", path))?;
                Self::from_yaml(&contents)
                    .with_context(|| format!("Failed to parse config file: {:?}", path))?
            }
            Some(ref path) => {
                eprintln!("[CONFIG] Config file not found: {:?}, using defaults", path);
                AppConfig::default()
            }
            None => {
                eprintln!("[CONFIG] No config file found, using defaults");
                AppConfig::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parse a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self> {
        Ok(serde_norway::from_str(contents)?)
    }

    /// Render as YAML (used by `--print-default-config`)
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_norway::to_string(self)?)
    }

    /// Find the configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            PathBuf::from("config.yaml"),
            PathBuf::from("config/config.yaml"),
            PathBuf::from("/etc/portal-gatekeeper/config.yaml"),
            dirs::config_dir()
                .map(|p| p.join("portal-gatekeeper/config.yaml"))
                .unwrap_or_default(),
        ];

        paths.into_iter().find(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("PORTAL_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("PORTAL_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Ok(secure) = std::env::var("PORTAL_SECURE_COOKIES") {
            self.server.secure_cookies = matches!(secure.as_str(), "1" | "true" | "yes");
        }

        if let Ok(url) = std::env::var("PORTAL_UPSTREAM_URL") {
            self.upstream.url = Some(url);
        }

        if let Ok(secret) = std::env::var("PORTAL_SESSION_SECRET") {
            self.session.secret = Some(secret);
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("PORTAL_LOG_FORMAT") {
            self.logging.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "compact" => LogFormat::Compact,
                _ => LogFormat::Pretty,
            };
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if let Some(secret) = self.session.effective_secret() {
            if secret.len() < 32 {
                anyhow::bail!("Session secret must be at least 32 characters long");
            }
        }

        if let Some(ref url) = self.upstream.url {
            let parsed = reqwest::Url::parse(url)
                .with_context(|| format!("Invalid upstream URL: {}", url))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                anyhow::bail!(
                    "Upstream URL must use http or https, got '{}'",
                    parsed.scheme()
                );
            }
        }

        if self.limits.max_body_bytes == 0 || self.limits.protocol_max_body_bytes == 0 {
            anyhow::bail!("Body size limits must be greater than 0");
        }

        if !self.routes.api_prefix.starts_with('/') {
            anyhow::bail!("API prefix must start with '/': {}", self.routes.api_prefix);
        }
        if !self.routes.protocol_path.starts_with('/')
            || self.routes.protocol_path.trim_end_matches('/').is_empty()
        {
            anyhow::bail!(
                "Protocol path must start with '/' and not be the root: {}",
                self.routes.protocol_path
            );
        }
        let protocol_path = self.routes.protocol_path.trim_end_matches('/');
        if protocol_path.contains(['{', '}', '*', ':']) {
            anyhow::bail!("Protocol path must be a literal path: {}", protocol_path);
        }
        if RESERVED_PATHS.iter().any(|reserved| {
            protocol_path == *reserved || protocol_path.starts_with(&format!("{}/", reserved))
        }) {
            anyhow::bail!("Protocol path {} collides with a local route", protocol_path);
        }
        if self.routes.protocol_path.starts_with(&self.routes.api_prefix) {
            anyhow::bail!(
                "Protocol path {} must not live under the API prefix {}",
                self.routes.protocol_path,
                self.routes.api_prefix
            );
        }

        if self.session.cookie_name == self.csrf.cookie_name {
            anyhow::bail!("Session and CSRF cookies must have different names");
        }

        Ok(())
    }
}
