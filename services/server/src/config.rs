use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;

// Server configuration sourced from environment variables, with optional
// YAML overrides for ops-friendly config files.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // GraphQL HTTP/websocket listener bind address.
    pub http_bind: SocketAddr,
    // Metrics HTTP listener bind address.
    pub metrics_bind: SocketAddr,
    // Which item store backs the resolvers.
    pub store: StoreBackend,
    // DynamoDB table holding items (dynamodb backend only).
    pub items_table: String,
    // Region override for the DynamoDB client.
    pub dynamo_region: Option<String>,
    // Endpoint override for local development (dynamodb-local).
    pub dynamo_endpoint: Option<String>,
    // Per-subscriber event queue depth.
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    DynamoDb,
}

const DEFAULT_HTTP_BIND: &str = "0.0.0.0:4000";
const DEFAULT_METRICS_BIND: &str = "0.0.0.0:8080";
const DEFAULT_ITEMS_TABLE: &str = "todo-items";

#[derive(Debug, Deserialize)]
struct ServerConfigOverride {
    http_bind: Option<String>,
    metrics_bind: Option<String>,
    store: Option<String>,
    items_table: Option<String>,
    dynamo_region: Option<String>,
    dynamo_endpoint: Option<String>,
    queue_capacity: Option<usize>,
}

fn parse_backend(value: &str) -> Result<StoreBackend> {
    match value {
        "memory" => Ok(StoreBackend::Memory),
        "dynamodb" => Ok(StoreBackend::DynamoDb),
        other => bail!("unknown store backend: {other}"),
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let http_bind = std::env::var("TODO_HTTP_BIND")
            .unwrap_or_else(|_| DEFAULT_HTTP_BIND.to_string())
            .parse()
            .with_context(|| "parse TODO_HTTP_BIND")?;
        let metrics_bind = std::env::var("TODO_METRICS_BIND")
            .unwrap_or_else(|_| DEFAULT_METRICS_BIND.to_string())
            .parse()
            .with_context(|| "parse TODO_METRICS_BIND")?;
        let store = match std::env::var("TODO_STORE") {
            Ok(value) => parse_backend(&value)?,
            Err(_) => StoreBackend::Memory,
        };
        let items_table =
            std::env::var("TODO_ITEMS_TABLE").unwrap_or_else(|_| DEFAULT_ITEMS_TABLE.to_string());
        let dynamo_region = std::env::var("TODO_DYNAMO_REGION").ok();
        let dynamo_endpoint = std::env::var("TODO_DYNAMO_ENDPOINT").ok();
        let queue_capacity = std::env::var("TODO_QUEUE_CAPACITY")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(todo_pubsub::DEFAULT_QUEUE_CAPACITY);
        Ok(Self {
            http_bind,
            metrics_bind,
            store,
            items_table,
            dynamo_region,
            dynamo_endpoint,
            queue_capacity,
        })
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("TODO_SERVER_CONFIG") {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read TODO_SERVER_CONFIG: {path}"))?;
            let override_cfg: ServerConfigOverride =
                serde_yaml::from_str(&contents).with_context(|| "parse server config yaml")?;
            if let Some(value) = override_cfg.http_bind {
                config.http_bind = value.parse().with_context(|| "parse http_bind")?;
            }
            if let Some(value) = override_cfg.metrics_bind {
                config.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
            }
            if let Some(value) = override_cfg.store {
                config.store = parse_backend(&value)?;
            }
            if let Some(value) = override_cfg.items_table {
                config.items_table = value;
            }
            if let Some(value) = override_cfg.dynamo_region {
                config.dynamo_region = Some(value);
            }
            if let Some(value) = override_cfg.dynamo_endpoint {
                config.dynamo_endpoint = Some(value);
            }
            if let Some(value) = override_cfg.queue_capacity
                && value > 0
            {
                config.queue_capacity = value;
            }
        }
        Ok(config)
    }
}
