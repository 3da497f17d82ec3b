use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;

// Gateway configuration sourced from environment variables, with optional
// YAML overrides.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    // HTTP/websocket listener bind address.
    pub http_bind: SocketAddr,
    // Metrics HTTP listener bind address.
    pub metrics_bind: SocketAddr,
    // Which backend holds items and registrations.
    pub backend: Backend,
    // DynamoDB table names (dynamodb backend only).
    pub items_table: String,
    pub connections_table: String,
    pub subscriptions_table: String,
    // Region/endpoint overrides for the DynamoDB client.
    pub dynamo_region: Option<String>,
    pub dynamo_endpoint: Option<String>,
    // Create missing tables on startup; local development only.
    pub bootstrap_tables: bool,
    // TTL stamped on connection and subscription records.
    pub connection_ttl_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Memory,
    DynamoDb,
}

const DEFAULT_HTTP_BIND: &str = "0.0.0.0:4010";
const DEFAULT_METRICS_BIND: &str = "0.0.0.0:8081";
const DEFAULT_CONNECTION_TTL_SECS: u64 = 7200;

#[derive(Debug, Deserialize)]
struct GatewayConfigOverride {
    http_bind: Option<String>,
    metrics_bind: Option<String>,
    backend: Option<String>,
    items_table: Option<String>,
    connections_table: Option<String>,
    subscriptions_table: Option<String>,
    dynamo_region: Option<String>,
    dynamo_endpoint: Option<String>,
    bootstrap_tables: Option<bool>,
    connection_ttl_secs: Option<u64>,
}

fn parse_backend(value: &str) -> Result<Backend> {
    match value {
        "memory" => Ok(Backend::Memory),
        "dynamodb" => Ok(Backend::DynamoDb),
        other => bail!("unknown gateway backend: {other}"),
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        let http_bind = std::env::var("TODO_GATEWAY_BIND")
            .unwrap_or_else(|_| DEFAULT_HTTP_BIND.to_string())
            .parse()
            .with_context(|| "parse TODO_GATEWAY_BIND")?;
        let metrics_bind = std::env::var("TODO_GATEWAY_METRICS_BIND")
            .unwrap_or_else(|_| DEFAULT_METRICS_BIND.to_string())
            .parse()
            .with_context(|| "parse TODO_GATEWAY_METRICS_BIND")?;
        let backend = match std::env::var("TODO_GATEWAY_BACKEND") {
            Ok(value) => parse_backend(&value)?,
            Err(_) => Backend::Memory,
        };
        let items_table =
            std::env::var("TODO_ITEMS_TABLE").unwrap_or_else(|_| "todo-items".to_string());
        let connections_table = std::env::var("TODO_CONNECTIONS_TABLE")
            .unwrap_or_else(|_| "todo-connections".to_string());
        let subscriptions_table = std::env::var("TODO_SUBSCRIPTIONS_TABLE")
            .unwrap_or_else(|_| "todo-subscriptions".to_string());
        let dynamo_region = std::env::var("TODO_DYNAMO_REGION").ok();
        let dynamo_endpoint = std::env::var("TODO_DYNAMO_ENDPOINT").ok();
        let bootstrap_tables = std::env::var("TODO_BOOTSTRAP_TABLES")
            .ok()
            .map(|value| matches!(value.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        let connection_ttl_secs = std::env::var("TODO_CONNECTION_TTL_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_CONNECTION_TTL_SECS);
        Ok(Self {
            http_bind,
            metrics_bind,
            backend,
            items_table,
            connections_table,
            subscriptions_table,
            dynamo_region,
            dynamo_endpoint,
            bootstrap_tables,
            connection_ttl_secs,
        })
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("TODO_GATEWAY_CONFIG") {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read TODO_GATEWAY_CONFIG: {path}"))?;
            let override_cfg: GatewayConfigOverride =
                serde_yaml::from_str(&contents).with_context(|| "parse gateway config yaml")?;
            if let Some(value) = override_cfg.http_bind {
                config.http_bind = value.parse().with_context(|| "parse http_bind")?;
            }
            if let Some(value) = override_cfg.metrics_bind {
                config.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
            }
            if let Some(value) = override_cfg.backend {
                config.backend = parse_backend(&value)?;
            }
            if let Some(value) = override_cfg.items_table {
                config.items_table = value;
            }
            if let Some(value) = override_cfg.connections_table {
                config.connections_table = value;
            }
            if let Some(value) = override_cfg.subscriptions_table {
                config.subscriptions_table = value;
            }
            if let Some(value) = override_cfg.dynamo_region {
                config.dynamo_region = Some(value);
            }
            if let Some(value) = override_cfg.dynamo_endpoint {
                config.dynamo_endpoint = Some(value);
            }
            if let Some(value) = override_cfg.bootstrap_tables {
                config.bootstrap_tables = value;
            }
            if let Some(value) = override_cfg.connection_ttl_secs
                && value > 0
            {
                config.connection_ttl_secs = value;
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    struct EnvGuard {
        key: &'static str,
        prev: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let prev = std::env::var(key).ok();
            unsafe {
                std::env::set_var(key, value);
            }
            Self { key, prev }
        }

        fn unset(key: &'static str) -> Self {
            let prev = std::env::var(key).ok();
            unsafe {
                std::env::remove_var(key);
            }
            Self { key, prev }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.prev {
                Some(value) => unsafe {
                    std::env::set_var(self.key, value);
                },
                None => unsafe {
                    std::env::remove_var(self.key);
                },
            }
        }
    }

    #[test]
    #[serial]
    fn defaults_use_the_memory_backend() {
        let _g1 = EnvGuard::unset("TODO_GATEWAY_BIND");
        let _g2 = EnvGuard::unset("TODO_GATEWAY_BACKEND");
        let _g3 = EnvGuard::unset("TODO_CONNECTION_TTL_SECS");
        let _g4 = EnvGuard::unset("TODO_GATEWAY_CONFIG");

        let config = GatewayConfig::from_env_or_yaml().expect("config");
        assert_eq!(config.http_bind.port(), 4010);
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.connection_ttl_secs, DEFAULT_CONNECTION_TTL_SECS);
        assert!(!config.bootstrap_tables);
    }

    #[test]
    #[serial]
    fn env_configures_dynamodb_tables() {
        let _g1 = EnvGuard::set("TODO_GATEWAY_BACKEND", "dynamodb");
        let _g2 = EnvGuard::set("TODO_CONNECTIONS_TABLE", "conns");
        let _g3 = EnvGuard::set("TODO_SUBSCRIPTIONS_TABLE", "subs");
        let _g4 = EnvGuard::set("TODO_BOOTSTRAP_TABLES", "1");
        let _g5 = EnvGuard::unset("TODO_GATEWAY_CONFIG");

        let config = GatewayConfig::from_env_or_yaml().expect("config");
        assert_eq!(config.backend, Backend::DynamoDb);
        assert_eq!(config.connections_table, "conns");
        assert_eq!(config.subscriptions_table, "subs");
        assert!(config.bootstrap_tables);
    }

    #[test]
    #[serial]
    fn unknown_backend_is_rejected() {
        let _g1 = EnvGuard::set("TODO_GATEWAY_BACKEND", "redis");
        assert!(GatewayConfig::from_env().is_err());
    }
}
