use crate::error::ConfigError;
use crate::websocket::{OriginPolicy, SessionSettings};
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    pub websocket: WebSocketConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub command_timeout_ms: u64,
}

impl RedisConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    pub enabled: bool,
    pub brokers: String,
    pub notification_topic: String,
    pub group_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    /// Raw comma-separated allow-list; empty means the local dev origins
    pub allowed_origins: String,
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
}

impl WebSocketConfig {
    pub fn origin_policy(&self) -> OriginPolicy {
        OriginPolicy::parse(&self.allowed_origins)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            client_timeout: Duration::from_secs(self.client_timeout_secs),
        }
    }
}

impl Config {
    /// Load from the process environment, reading `.env` first when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let heartbeat_interval_secs: u64 = parse_or(&lookup, "WS_HEARTBEAT_INTERVAL_SECS", 30)?;
        if heartbeat_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "WS_HEARTBEAT_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }
        // The read deadline must outlast at least two missed pings.
        let client_timeout_secs = parse_or(&lookup, "WS_CLIENT_TIMEOUT_SECS", 60)?
            .max(heartbeat_interval_secs * 2);

        Ok(Config {
            app: AppConfig {
                env: string("APP_ENV", "development"),
                port: parse_or(&lookup, "PORT", 8081)?,
            },
            database: DatabaseConfig {
                url: lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
                max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            },
            redis: RedisConfig {
                url: string("REDIS_URL", "redis://127.0.0.1:6379"),
                command_timeout_ms: parse_or(&lookup, "REDIS_COMMAND_TIMEOUT_MS", 3000)?,
            },
            kafka: KafkaConfig {
                enabled: parse_or(&lookup, "KAFKA_ENABLED", true)?,
                brokers: string("KAFKA_BROKERS", "localhost:9092"),
                notification_topic: string("KAFKA_NOTIFICATION_TOPIC", "notification-events"),
                group_id: string("KAFKA_GROUP_ID", "realtime-notify"),
            },
            websocket: WebSocketConfig {
                allowed_origins: string("ALLOWED_ORIGINS", ""),
                heartbeat_interval_secs,
                client_timeout_secs,
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/notify")]).unwrap();
        assert_eq!(config.app.port, 8081);
        assert_eq!(config.app.env, "development");
        assert!(config.kafka.enabled);
        assert_eq!(config.kafka.notification_topic, "notification-events");
        assert_eq!(config.redis.command_timeout(), Duration::from_secs(3));
        assert_eq!(config.websocket.session_settings(), SessionSettings::default());
    }

    #[test]
    fn test_database_url_required() {
        assert!(matches!(
            load(&[]),
            Err(ConfigError::Missing("DATABASE_URL"))
        ));
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let result = load(&[("DATABASE_URL", "postgres://x"), ("PORT", "eighty")]);
        assert!(matches!(result, Err(ConfigError::Invalid { key: "PORT", .. })));
    }

    #[test]
    fn test_client_timeout_outlasts_two_heartbeats() {
        let config = load(&[
            ("DATABASE_URL", "postgres://x"),
            ("WS_HEARTBEAT_INTERVAL_SECS", "20"),
            ("WS_CLIENT_TIMEOUT_SECS", "25"),
        ])
        .unwrap();
        assert_eq!(config.websocket.client_timeout_secs, 40);
    }

    #[test]
    fn test_kafka_can_be_disabled() {
        let config = load(&[("DATABASE_URL", "postgres://x"), ("KAFKA_ENABLED", "false")]).unwrap();
        assert!(!config.kafka.enabled);
    }

    #[test]
    fn test_unset_origins_allow_only_local_dev() {
        let policy = load(&[("DATABASE_URL", "postgres://x")])
            .unwrap()
            .websocket
            .origin_policy();
        assert!(policy.is_allowed(Some("http://localhost:4200")));
        assert!(policy.is_allowed(Some("http://127.0.0.1:4200")));
        assert!(!policy.is_allowed(Some("https://evil.example")));
        assert!(!policy.is_allowed(None));
    }

    #[test]
    fn test_wildcard_origins() {
        let config = load(&[("DATABASE_URL", "postgres://x"), ("ALLOWED_ORIGINS", "*")]).unwrap();
        assert_eq!(config.websocket.origin_policy(), OriginPolicy::AllowAll);
    }
}
