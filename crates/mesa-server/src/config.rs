use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use mesa_core::CacheConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub engine: EngineSettings,
    pub cache: CacheSettings,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub store_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub max_entries: usize,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost:5432/mesa".to_string(),
            max_connections: 10,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            store_timeout_ms: 2_000,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            max_entries: 10_000,
            sweep_interval_secs: 60,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e.to_string()))?;
            toml::from_str::<AppConfig>(&contents)
                .map_err(|e| ConfigError::ParseToml(e.to_string()))?
        } else {
            AppConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("MESA_DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = std::env::var("MESA_DATABASE_MAX_CONNECTIONS")
            && let Ok(n) = v.parse()
        {
            self.database.max_connections = n;
        }
        if let Ok(v) = std::env::var("MESA_ENGINE_STORE_TIMEOUT_MS")
            && let Ok(n) = v.parse()
        {
            self.engine.store_timeout_ms = n;
        }
        if let Ok(v) = std::env::var("MESA_CACHE_ENABLED")
            && let Ok(enabled) = v.parse()
        {
            self.cache.enabled = enabled;
        }
        if let Ok(v) = std::env::var("MESA_CACHE_TTL_SECS")
            && let Ok(n) = v.parse()
        {
            self.cache.ttl_secs = n;
        }
        if let Ok(v) = std::env::var("MESA_CACHE_MAX_ENTRIES")
            && let Ok(n) = v.parse()
        {
            self.cache.max_entries = n;
        }
        if let Ok(v) = std::env::var("MESA_LOG_LEVEL") {
            self.log.level = v;
        }
        if let Ok(v) = std::env::var("MESA_LOG_FORMAT") {
            match v.as_str() {
                "json" => self.log.format = LogFormat::Json,
                "pretty" => self.log.format = LogFormat::Pretty,
                _ => {}
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections must be non-zero".to_string(),
            ));
        }
        if self.engine.store_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "engine.store_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.cache.enabled {
            if self.cache.ttl_secs == 0 {
                return Err(ConfigError::Validation(
                    "cache.ttl_secs must be non-zero when the cache is enabled".to_string(),
                ));
            }
            if self.cache.max_entries == 0 {
                return Err(ConfigError::Validation(
                    "cache.max_entries must be non-zero when the cache is enabled".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.engine.store_timeout_ms)
    }

    pub fn to_cache_config(&self) -> Option<CacheConfig> {
        self.cache.enabled.then(|| CacheConfig {
            ttl: Duration::from_secs(self.cache.ttl_secs),
            max_entries: self.cache.max_entries,
        })
    }

    /// `None` disables the background sweeper.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.cache.enabled && self.cache.sweep_interval_secs > 0)
            .then(|| Duration::from_secs(self.cache.sweep_interval_secs))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{0}': {1}")]
    ReadFile(String, String),

    #[error("failed to parse TOML config: {0}")]
    ParseToml(String),

    #[error("config validation failed: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_has_sensible_values() {
        let config = AppConfig::default();

        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.engine.store_timeout_ms, 2_000);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(config.cache.max_entries, 10_000);
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[database]
url = "postgresql://db:5432/mesa"

[engine]
store_timeout_ms = 750

[cache]
ttl_secs = 30
sweep_interval_secs = 0

[log]
format = "pretty"
level = "debug"
"#
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();

        assert_eq!(config.database.url, "postgresql://db:5432/mesa");
        assert_eq!(config.store_timeout(), Duration::from_millis(750));
        assert_eq!(config.cache.ttl_secs, 30);
        assert_eq!(config.cache.max_entries, 10_000, "unset keys keep defaults");
        assert_eq!(config.sweep_interval(), None);
        assert_eq!(config.log.format, LogFormat::Pretty);
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn env_vars_override_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[engine]
store_timeout_ms = 750
"#
        )
        .unwrap();

        // SAFETY: no other test reads this variable
        unsafe { std::env::set_var("MESA_ENGINE_STORE_TIMEOUT_MS", "125") };
        let config = AppConfig::load(Some(&path)).unwrap();
        unsafe { std::env::remove_var("MESA_ENGINE_STORE_TIMEOUT_MS") };

        assert_eq!(config.engine.store_timeout_ms, 125);
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let result = AppConfig::load(Some(&path));

        assert!(matches!(result, Err(ConfigError::ReadFile(ref p, _)) if p.contains("absent.toml")));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[cache\nttl_secs = ").unwrap();

        let result = AppConfig::load(Some(&path));

        assert!(matches!(result, Err(ConfigError::ParseToml(_))));
    }

    #[test]
    fn validation_rejects_zero_store_timeout() {
        let mut config = AppConfig::default();
        config.engine.store_timeout_ms = 0;

        let result = config.validate();
        assert!(
            matches!(result, Err(ConfigError::Validation(ref msg)) if msg.contains("store_timeout_ms"))
        );
    }

    #[test]
    fn validation_rejects_zero_ttl_when_cache_enabled() {
        let mut config = AppConfig::default();
        config.cache.ttl_secs = 0;

        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Validation(ref msg)) if msg.contains("ttl_secs")));
    }

    #[test]
    fn disabled_cache_skips_cache_validation() {
        let mut config = AppConfig::default();
        config.cache.enabled = false;
        config.cache.ttl_secs = 0;

        assert!(config.validate().is_ok());
        assert!(config.to_cache_config().is_none());
        assert!(config.sweep_interval().is_none());
    }

    #[test]
    fn cache_config_carries_ttl_and_capacity() {
        let config = AppConfig::default();

        let cache = config.to_cache_config().unwrap();

        assert_eq!(cache.ttl, Duration::from_secs(300));
        assert_eq!(cache.max_entries, 10_000);
    }
}
