use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::http_client::HttpClientConfig;
use crate::validator::RetryPolicy;

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Settings for building a strict validator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub retry: RetryConfig,
    pub network: NetworkConfig,
    pub resources: ResourceConfig,
    pub cache: CacheConfig,
}

/// Retry behaviour of the validation loop
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total validation attempts per document, including the first
    pub max_attempts: u32,
    /// Pause before the second attempt; doubles afterwards
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
}

/// Remote schema fetching
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// HTTP request timeout in seconds
    pub timeout_seconds: u64,
    /// Number of retry attempts for failed downloads
    pub retry_attempts: u32,
    /// Retry delay in milliseconds
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    /// Whether http(s) schema locations may be fetched at all
    pub allow_remote: bool,
}

/// Local directories searched for hinted schema locations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ResourceConfig {
    pub roots: Vec<PathBuf>,
}

/// Compiled schema cache
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of compiled schemas kept in memory
    pub max_entries: u64,
    /// Time-to-live for cached schemas in seconds
    pub ttl_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 50,
            max_retry_delay_ms: 1000,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            max_retry_delay_ms: 30000,
            allow_remote: true,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 100,
            ttl_seconds: 3600,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            max_retry_delay: Duration::from_millis(self.max_retry_delay_ms),
            ..RetryPolicy::default()
        }
    }
}

impl NetworkConfig {
    pub fn to_http_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout_seconds: self.timeout_seconds,
            retry_attempts: self.retry_attempts,
            retry_delay_ms: self.retry_delay_ms,
            max_retry_delay_ms: self.max_retry_delay_ms,
            ..HttpClientConfig::default()
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: defaults -> file -> environment
    pub fn load_config(path: Option<&Path>) -> Result<Config> {
        Self::load_config_with(&SystemEnvProvider, path)
    }

    /// [`load_config`](Self::load_config) reading variables from `env`
    pub fn load_config_with(env: &impl EnvProvider, path: Option<&Path>) -> Result<Config> {
        let mut config = Config::default();

        match path {
            Some(path) => {
                let file_config = Self::load_from_file(path)?;
                config = Self::merge_configs(config, file_config);
            }
            None => {
                if let Some(found_config) = Self::find_config_file()? {
                    config = Self::merge_configs(config, found_config);
                }
            }
        }

        config = Self::apply_environment_overrides_with(env, config)?;
        Self::validate_config(&config)?;

        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON)
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => {
                if let Ok(config) = toml::from_str::<Config>(&content) {
                    Ok(config)
                } else {
                    Ok(serde_json::from_str(&content)?)
                }
            }
        }
    }

    /// Find configuration file in standard locations
    pub fn find_config_file() -> Result<Option<Config>> {
        Self::find_config_file_in(Path::new("."))
    }

    fn find_config_file_in(dir: &Path) -> Result<Option<Config>> {
        let config_names = ["strict-xml.toml", "strict-xml.json", ".strict-xml.toml"];

        for name in &config_names {
            let path = dir.join(name);
            if path.exists() {
                tracing::debug!(path = %path.display(), "loading configuration");
                return Ok(Some(Self::load_from_file(&path)?));
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let app_config_dir = config_dir.join("strict-xml");
            for name in &config_names {
                let path = app_config_dir.join(name);
                if path.exists() {
                    tracing::debug!(path = %path.display(), "loading configuration");
                    return Ok(Some(Self::load_from_file(&path)?));
                }
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> Result<Config> {
        if let Some(value) = Self::parsed(env, "STRICT_XML_MAX_ATTEMPTS")? {
            config.retry.max_attempts = value;
        }
        if let Some(value) = Self::parsed(env, "STRICT_XML_RETRY_DELAY_MS")? {
            config.retry.retry_delay_ms = value;
        }

        if let Some(value) = Self::parsed(env, "STRICT_XML_TIMEOUT")? {
            config.network.timeout_seconds = value;
        }
        if let Some(value) = Self::parsed(env, "STRICT_XML_HTTP_RETRIES")? {
            config.network.retry_attempts = value;
        }
        if let Some(value) = Self::parsed(env, "STRICT_XML_ALLOW_REMOTE")? {
            config.network.allow_remote = value;
        }

        // Colon separated, like PATH
        if let Some(paths) = env.get("STRICT_XML_RESOURCE_PATH") {
            config.resources.roots = std::env::split_paths(&paths)
                .filter(|path| !path.as_os_str().is_empty())
                .collect();
        }

        if let Some(value) = Self::parsed(env, "STRICT_XML_CACHE_ENTRIES")? {
            config.cache.max_entries = value;
        }
        if let Some(value) = Self::parsed(env, "STRICT_XML_CACHE_TTL")? {
            config.cache.ttl_seconds = value;
        }

        Ok(config)
    }

    fn parsed<T: std::str::FromStr>(env: &impl EnvProvider, key: &str) -> Result<Option<T>> {
        match env.get(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::Environment(format!("Invalid {} value: {}", key, raw))),
            None => Ok(None),
        }
    }

    /// Merge two configurations, with the second taking precedence
    pub fn merge_configs(mut base: Config, override_config: Config) -> Config {
        base.retry = override_config.retry;
        base.network = override_config.network;
        base.cache = override_config.cache;

        if !override_config.resources.roots.is_empty() {
            base.resources.roots = override_config.resources.roots;
        }

        base
    }

    /// Validate configuration values
    pub fn validate_config(config: &Config) -> Result<()> {
        if config.retry.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "Maximum attempts must be at least 1".to_string(),
            ));
        }

        if config.retry.max_retry_delay_ms < config.retry.retry_delay_ms {
            return Err(ConfigError::Validation(
                "Maximum retry delay cannot be below the initial retry delay".to_string(),
            ));
        }

        if config.network.timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        if config.network.retry_attempts > 10 {
            return Err(ConfigError::Validation(
                "Retry attempts cannot exceed 10".to_string(),
            ));
        }

        if config.cache.max_entries == 0 {
            return Err(ConfigError::Validation(
                "Cache must hold at least one entry".to_string(),
            ));
        }

        if config.cache.ttl_seconds == 0 {
            return Err(ConfigError::Validation(
                "Cache TTL must be greater than 0".to_string(),
            ));
        }

        for root in &config.resources.roots {
            if root.as_os_str().is_empty() {
                return Err(ConfigError::Validation(
                    "Resource roots cannot be empty paths".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    /// Mock environment variable provider for testing
    #[derive(Default)]
    struct MockEnvProvider {
        vars: HashMap<String, String>,
    }

    impl MockEnvProvider {
        fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
            self.vars.insert(key.into(), value.into());
        }
    }

    impl EnvProvider for MockEnvProvider {
        fn get(&self, key: &str) -> Option<String> {
            self.vars.get(key).cloned()
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.retry_delay_ms, 50);
        assert_eq!(config.network.timeout_seconds, 30);
        assert!(config.network.allow_remote);
        assert!(config.resources.roots.is_empty());
        assert_eq!(config.cache.max_entries, 100);
        assert!(ConfigManager::validate_config(&config).is_ok());
    }

    #[test]
    fn test_load_toml_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("strict-xml.toml");

        fs::write(
            &config_path,
            r#"
[retry]
max_attempts = 5
retry_delay_ms = 10

[network]
allow_remote = false

[resources]
roots = ["/opt/schemas", "/usr/share/xml"]
"#,
        )
        .unwrap();

        let config = ConfigManager::load_from_file(&config_path).unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.retry_delay_ms, 10);
        // Unspecified fields keep their defaults
        assert_eq!(config.retry.max_retry_delay_ms, 1000);
        assert!(!config.network.allow_remote);
        assert_eq!(config.network.timeout_seconds, 30);
        assert_eq!(
            config.resources.roots,
            vec![PathBuf::from("/opt/schemas"), PathBuf::from("/usr/share/xml")]
        );
    }

    #[test]
    fn test_load_json_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("strict-xml.json");

        fs::write(
            &config_path,
            r#"{"cache": {"max_entries": 7, "ttl_seconds": 60}}"#,
        )
        .unwrap();

        let config = ConfigManager::load_from_file(&config_path).unwrap();
        assert_eq!(config.cache.max_entries, 7);
        assert_eq!(config.cache.ttl(), Duration::from_secs(60));
        assert_eq!(config.retry, RetryConfig::default());
    }

    #[test]
    fn test_unsupported_file_format() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("strict-xml.yaml");
        fs::write(&config_path, "retry: {}").unwrap();

        let result = ConfigManager::load_from_file(&config_path);
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_invalid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("strict-xml.toml");
        fs::write(&config_path, "[retry\nmax_attempts = ").unwrap();

        let result = ConfigManager::load_from_file(&config_path);
        assert!(matches!(result, Err(ConfigError::TomlParsing(_))));
    }

    #[test]
    fn test_find_config_file_in_directory() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(".strict-xml.toml"),
            "[retry]\nmax_attempts = 9\n",
        )
        .unwrap();

        let config = ConfigManager::find_config_file_in(temp_dir.path())
            .unwrap()
            .unwrap();
        assert_eq!(config.retry.max_attempts, 9);
    }

    #[test]
    fn test_environment_overrides() {
        let mut mock_env = MockEnvProvider::default();
        mock_env.set("STRICT_XML_MAX_ATTEMPTS", "4");
        mock_env.set("STRICT_XML_RETRY_DELAY_MS", "5");
        mock_env.set("STRICT_XML_TIMEOUT", "120");
        mock_env.set("STRICT_XML_ALLOW_REMOTE", "false");
        mock_env.set("STRICT_XML_RESOURCE_PATH", "/a/schemas:/b/schemas");
        mock_env.set("STRICT_XML_CACHE_ENTRIES", "12");

        let config =
            ConfigManager::apply_environment_overrides_with(&mock_env, Config::default()).unwrap();

        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.retry_delay_ms, 5);
        assert_eq!(config.network.timeout_seconds, 120);
        assert!(!config.network.allow_remote);
        assert_eq!(
            config.resources.roots,
            vec![PathBuf::from("/a/schemas"), PathBuf::from("/b/schemas")]
        );
        assert_eq!(config.cache.max_entries, 12);
    }

    #[test]
    fn test_invalid_environment_values() {
        let mut mock_env = MockEnvProvider::default();
        mock_env.set("STRICT_XML_MAX_ATTEMPTS", "many");

        let result = ConfigManager::apply_environment_overrides_with(&mock_env, Config::default());
        assert!(matches!(result, Err(ConfigError::Environment(_))));
    }

    #[test]
    fn test_merge_configs() {
        let mut file_config = Config::default();
        file_config.retry.max_attempts = 8;

        let mut base = Config::default();
        base.resources.roots = vec![PathBuf::from("/base")];

        let merged = ConfigManager::merge_configs(base, file_config);
        assert_eq!(merged.retry.max_attempts, 8);
        // Empty roots in the override do not wipe the base roots
        assert_eq!(merged.resources.roots, vec![PathBuf::from("/base")]);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(matches!(
            ConfigManager::validate_config(&config),
            Err(ConfigError::Validation(_))
        ));

        let mut config = Config::default();
        config.network.timeout_seconds = 0;
        assert!(ConfigManager::validate_config(&config).is_err());

        let mut config = Config::default();
        config.cache.max_entries = 0;
        assert!(ConfigManager::validate_config(&config).is_err());

        let mut config = Config::default();
        config.retry.max_retry_delay_ms = 1;
        assert!(ConfigManager::validate_config(&config).is_err());
    }

    #[test]
    fn test_load_config_precedence() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("strict-xml.toml");
        fs::write(
            &config_path,
            "[retry]\nmax_attempts = 5\nretry_delay_ms = 10\n\n[network]\nallow_remote = false\n",
        )
        .unwrap();

        let mut mock_env = MockEnvProvider::default();
        mock_env.set("STRICT_XML_MAX_ATTEMPTS", "7");

        let config = ConfigManager::load_config_with(&mock_env, Some(&config_path)).unwrap();
        // Environment beats the file, the file beats the defaults
        assert_eq!(config.retry.max_attempts, 7);
        assert_eq!(config.retry.retry_delay_ms, 10);
        assert!(!config.network.allow_remote);
        assert_eq!(config.network.timeout_seconds, 30);
    }

    #[test]
    fn test_load_config_validates_the_result() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("strict-xml.json");
        fs::write(&config_path, r#"{"retry": {"max_attempts": 2}}"#).unwrap();

        let mut mock_env = MockEnvProvider::default();
        mock_env.set("STRICT_XML_MAX_ATTEMPTS", "0");

        let result = ConfigManager::load_config_with(&mock_env, Some(&config_path));
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_load_config_from_path() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("strict-xml.toml");
        fs::write(&config_path, "[retry]\nmax_retry_delay_ms = 2000\n").unwrap();

        // No STRICT_XML_* variable touches this field
        let config = ConfigManager::load_config(Some(&config_path)).unwrap();
        assert_eq!(config.retry.max_retry_delay_ms, 2000);

        let missing = ConfigManager::load_config(Some(&temp_dir.path().join("absent.toml")));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_conversions() {
        let config = Config::default();

        let policy = config.retry.to_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.retry_delay, Duration::from_millis(50));

        let http = config.network.to_http_config();
        assert_eq!(http.timeout_seconds, 30);
        assert!(http.user_agent.starts_with("strict-xml/"));
    }
}
