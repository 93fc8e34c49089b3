use std::env;
use std::time::Duration;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    pub test_before_acquire: bool,
}

/// Reward engine tuning
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on a single price oracle call made while recording a reward
    pub price_fetch_timeout_ms: u64,
}

/// Price refresh job configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub price_refresh_interval_secs: u64,
    pub price_seed: u64,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
    pub scheduler: SchedulerConfig,
    pub log_level: String,
    pub log_format: String,
    pub environment: String,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse::<T>().ok())
}

impl DatabaseConfig {
    /// Create database config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL environment variable is required")?;

        let defaults = Self::default();
        let max_connections =
            env_parse("DATABASE_MAX_CONNECTIONS").unwrap_or(defaults.max_connections);
        let acquire_timeout_secs =
            env_parse("DATABASE_ACQUIRE_TIMEOUT_SECS").unwrap_or(defaults.acquire_timeout_secs);
        let idle_timeout_secs =
            env_parse("DATABASE_IDLE_TIMEOUT_SECS").unwrap_or(defaults.idle_timeout_secs);
        let max_lifetime_secs =
            env_parse("DATABASE_MAX_LIFETIME_SECS").unwrap_or(defaults.max_lifetime_secs);
        let test_before_acquire =
            env_parse("DATABASE_TEST_BEFORE_ACQUIRE").unwrap_or(defaults.test_before_acquire);

        let config = Self {
            url,
            max_connections,
            acquire_timeout_secs,
            idle_timeout_secs,
            max_lifetime_secs,
            test_before_acquire,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections == 0 {
            return Err("DATABASE_MAX_CONNECTIONS must be greater than 0".to_string());
        }
        if self.acquire_timeout_secs == 0 {
            return Err("DATABASE_ACQUIRE_TIMEOUT_SECS must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Get acquire timeout as Duration
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Get idle timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Get max lifetime as Duration
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/reward_ledger".to_string(),
            max_connections: 20,
            acquire_timeout_secs: 5,
            idle_timeout_secs: 300,  // 5 minutes
            max_lifetime_secs: 3600, // 60 minutes
            test_before_acquire: true,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, String> {
        let price_fetch_timeout_ms =
            env_parse("PRICE_FETCH_TIMEOUT_MS").unwrap_or(Self::default().price_fetch_timeout_ms);
        if price_fetch_timeout_ms == 0 {
            return Err("PRICE_FETCH_TIMEOUT_MS must be greater than 0".to_string());
        }
        Ok(Self {
            price_fetch_timeout_ms,
        })
    }

    pub fn price_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.price_fetch_timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            price_fetch_timeout_ms: 2000,
        }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        let price_refresh_interval_secs = env_parse("PRICE_REFRESH_INTERVAL_SECS")
            .unwrap_or(defaults.price_refresh_interval_secs);
        let price_seed = env_parse("PRICE_SEED").unwrap_or(defaults.price_seed);

        if price_refresh_interval_secs == 0 {
            return Err("PRICE_REFRESH_INTERVAL_SECS must be greater than 0".to_string());
        }

        Ok(Self {
            price_refresh_interval_secs,
            price_seed,
        })
    }

    pub fn price_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.price_refresh_interval_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            price_refresh_interval_secs: 3600,
            price_seed: 42,
        }
    }
}

impl AppConfig {
    /// Create application config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let database = DatabaseConfig::from_env()?;
        let engine = EngineConfig::from_env()?;
        let scheduler = SchedulerConfig::from_env()?;

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let config = Self {
            database,
            engine,
            scheduler,
            log_level: log_level.to_lowercase(),
            log_format: log_format.to_lowercase(),
            environment: environment.to_lowercase(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid LOG_LEVEL: {}. Must be one of: {:?}",
                self.log_level, valid_log_levels
            ));
        }

        let valid_log_formats = ["text", "json"];
        if !valid_log_formats.contains(&self.log_format.as_str()) {
            return Err(format!(
                "Invalid LOG_FORMAT: {}. Must be one of: {:?}",
                self.log_format, valid_log_formats
            ));
        }

        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&self.environment.as_str()) {
            return Err(format!(
                "Invalid ENVIRONMENT: {}. Must be one of: {:?}",
                self.environment, valid_environments
            ));
        }

        Ok(())
    }

    pub fn json_logs(&self) -> bool {
        self.log_format == "json"
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            engine: EngineConfig::default(),
            scheduler: SchedulerConfig::default(),
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            environment: "development".to_string(),
        }
    }
}
