use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    /// Daily-snapshot host (MI_INDEX endpoint).
    pub twse_api_url: String,
    /// Realtime quote host (getStockInfo endpoint).
    pub twse_mis_url: String,
    /// Seconds between bulk-sync snapshot requests.
    pub bulk_sync_delay_secs: u64,
    /// Rows per day above which a day counts as completely synced.
    pub bulk_sync_complete_threshold: i64,
    /// Seconds between realtime broadcast cycles.
    pub broadcast_interval_secs: u64,
    /// Indicator cache time-to-live in seconds.
    pub indicator_cache_ttl_secs: i64,
    /// Years of raw bars kept before the retention sweep evicts them.
    pub ohlcv_retention_years: i64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let twse_api_url = env_map
            .get("TWSE_API_URL")
            .cloned()
            .unwrap_or_else(|| "https://www.twse.com.tw".to_string());

        let twse_mis_url = env_map
            .get("TWSE_MIS_URL")
            .cloned()
            .unwrap_or_else(|| "https://mis.twse.com.tw".to_string());

        let bulk_sync_delay_secs = parse_u64(&env_map, "BULK_SYNC_DELAY_SECS", 5)?;
        let bulk_sync_complete_threshold =
            parse_i64(&env_map, "BULK_SYNC_COMPLETE_THRESHOLD", 1000)?;
        let broadcast_interval_secs = parse_u64(&env_map, "BROADCAST_INTERVAL_SECS", 5)?;
        let indicator_cache_ttl_secs = parse_i64(&env_map, "INDICATOR_CACHE_TTL_SECS", 86_400)?;
        let ohlcv_retention_years = parse_i64(&env_map, "OHLCV_RETENTION_YEARS", 5)?;

        Ok(Config {
            port,
            database_path,
            twse_api_url,
            twse_mis_url,
            bulk_sync_delay_secs,
            bulk_sync_complete_threshold,
            broadcast_interval_secs,
            indicator_cache_ttl_secs,
            ohlcv_retention_years,
        })
    }
}

fn parse_u64(
    env_map: &HashMap<String, String>,
    key: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => raw.parse::<u64>().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), "must be a non-negative integer".to_string())
        }),
    }
}

fn parse_i64(
    env_map: &HashMap<String, String>,
    key: &str,
    default: i64,
) -> Result<i64, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => raw.parse::<i64>().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), "must be an integer".to_string())
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map
    }

    #[test]
    fn test_missing_database_path() {
        let result = Config::from_env_map(HashMap::new());
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.twse_api_url, "https://www.twse.com.tw");
        assert_eq!(config.twse_mis_url, "https://mis.twse.com.tw");
        assert_eq!(config.bulk_sync_delay_secs, 5);
        assert_eq!(config.bulk_sync_complete_threshold, 1000);
        assert_eq!(config.broadcast_interval_secs, 5);
        assert_eq!(config.indicator_cache_ttl_secs, 86_400);
        assert_eq!(config.ohlcv_retention_years, 5);
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "not_a_number".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PORT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_delay() {
        let mut env_map = setup_required_env();
        env_map.insert("BULK_SYNC_DELAY_SECS".to_string(), "-3".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "BULK_SYNC_DELAY_SECS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_overrides_respected() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "9000".to_string());
        env_map.insert("BULK_SYNC_DELAY_SECS".to_string(), "1".to_string());
        env_map.insert(
            "TWSE_API_URL".to_string(),
            "http://localhost:8888".to_string(),
        );
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.bulk_sync_delay_secs, 1);
        assert_eq!(config.twse_api_url, "http://localhost:8888");
    }
}
