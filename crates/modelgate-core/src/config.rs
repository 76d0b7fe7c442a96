use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(String),

    #[error("failed to parse config file: {0}")]
    Parse(String),
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub pool: PoolConfig,
    pub tools: ToolsConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Simultaneous in-flight requests; clamped to 1..=1024.
    pub max_concurrent_requests: usize,
    /// Request body ceiling in bytes.
    pub max_body_bytes: usize,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub vendor: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Full rediscovery period; clamped to 10..=3600.
    pub discovery_interval_secs: u64,
    /// Health re-check period; clamped to 10..=7200.
    pub health_check_interval_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Per-invocation handler limit; clamped to 1..=300.
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            max_concurrent_requests: 64,
            max_body_bytes: 8 * 1024 * 1024,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            api_key: None,
            vendor: "openai".into(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            discovery_interval_secs: 300,
            health_check_interval_secs: 600,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            pool: PoolConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist. Out-of-range
    /// numeric values are clamped, not rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
            toml::from_str::<Self>(&content).map_err(|e| ConfigError::Parse(e.to_string()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.clamp();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("MODELGATE_UPSTREAM_BASE_URL") {
            self.upstream.base_url = v;
        }
        if let Ok(v) = std::env::var("MODELGATE_UPSTREAM_API_KEY") {
            self.upstream.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("MODELGATE_UPSTREAM_VENDOR") {
            self.upstream.vendor = v;
        }
        if let Ok(v) = std::env::var("MODELGATE_HOST") {
            self.server.host = v;
        }
        if let Some(v) = env_parse("MODELGATE_PORT") {
            self.server.port = v;
        }
        if let Some(v) = env_parse("MODELGATE_MAX_CONCURRENT_REQUESTS") {
            self.server.max_concurrent_requests = v;
        }
        if let Some(v) = env_parse("MODELGATE_DISCOVERY_INTERVAL_SECS") {
            self.pool.discovery_interval_secs = v;
        }
        if let Some(v) = env_parse("MODELGATE_HEALTH_CHECK_INTERVAL_SECS") {
            self.pool.health_check_interval_secs = v;
        }
        if let Some(v) = env_parse("MODELGATE_TOOL_TIMEOUT_SECS") {
            self.tools.timeout_secs = v;
        }
    }

    fn clamp(&mut self) {
        clamp_field(
            &mut self.server.max_concurrent_requests,
            1,
            1024,
            "server.max_concurrent_requests",
        );
        clamp_field(
            &mut self.pool.discovery_interval_secs,
            10,
            3600,
            "pool.discovery_interval_secs",
        );
        clamp_field(
            &mut self.pool.health_check_interval_secs,
            10,
            7200,
            "pool.health_check_interval_secs",
        );
        clamp_field(&mut self.tools.timeout_secs, 1, 300, "tools.timeout_secs");
    }

    #[must_use]
    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.pool.discovery_interval_secs)
    }

    #[must_use]
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.pool.health_check_interval_secs)
    }

    #[must_use]
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tools.timeout_secs)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn clamp_field<T: Ord + Copy + std::fmt::Display>(value: &mut T, min: T, max: T, name: &str) {
    let clamped = (*value).clamp(min, max);
    if clamped != *value {
        tracing::warn!(field = name, given = %value, used = %clamped, "config value out of range, clamped");
        *value = clamped;
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_when_file_missing() {
        let config = Config::load(Path::new("/nonexistent/modelgate.toml")).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.max_concurrent_requests, 64);
        assert_eq!(config.pool.discovery_interval_secs, 300);
        assert_eq!(config.pool.health_check_interval_secs, 600);
        assert_eq!(config.tools.timeout_secs, 30);
        assert_eq!(config.upstream.vendor, "openai");
    }

    #[test]
    fn parse_valid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modelgate.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            r#"
[server]
host = "127.0.0.1"
port = 9000
max_concurrent_requests = 8

[upstream]
base_url = "http://custom:1234/v1"
vendor = "custom"

[pool]
discovery_interval_secs = 60
health_check_interval_secs = 120

[tools]
timeout_secs = 10
"#
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.upstream.base_url, "http://custom:1234/v1");
        assert_eq!(config.pool.discovery_interval_secs, 60);
        assert_eq!(config.tools.timeout_secs, 10);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modelgate.toml");
        std::fs::write(&path, "[server]\nport = 3000\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.max_concurrent_requests, 64);
        assert_eq!(config.pool.discovery_interval_secs, 300);
    }

    #[test]
    fn out_of_range_values_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modelgate.toml");
        std::fs::write(
            &path,
            "[server]\nmax_concurrent_requests = 100000\n\n[pool]\ndiscovery_interval_secs = 1\n\n[tools]\ntimeout_secs = 9999\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.max_concurrent_requests, 1024);
        assert_eq!(config.pool.discovery_interval_secs, 10);
        assert_eq!(config.tools.timeout_secs, 300);
    }

    #[test]
    fn env_overrides() {
        let mut config = Config::default();
        unsafe { std::env::set_var("MODELGATE_UPSTREAM_BASE_URL", "http://env:8000/v1") };
        config.apply_env_overrides();
        unsafe { std::env::remove_var("MODELGATE_UPSTREAM_BASE_URL") };
        assert_eq!(config.upstream.base_url, "http://env:8000/v1");
    }

    #[test]
    fn invalid_toml_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modelgate.toml");
        std::fs::write(&path, "not = [valid").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
    }
}
