use std::{env, net::SocketAddr, time::Duration};

use thiserror::Error;

use crate::generation::client::OllamaSettings;
use crate::http::listener::ServerSettings;

pub const MCP_PATH: &str = "/mcp";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub bind_port: u16,
    pub max_body_bytes: usize,
    pub workers: usize,
    pub connection_timeout: Duration,
    pub header_read_timeout: Duration,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub ollama_connect_timeout: Duration,
    pub ollama_read_timeout: Duration,
    pub ollama_stream_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("OLLAMA_MODEL is required and must not be empty")]
    MissingModel,
    #[error("MCP_BIND_PORT must be a valid u16")]
    InvalidPort,
    #[error("{0} must be a positive integer")]
    InvalidNumber(&'static str),
    #[error("invalid bind address or port")]
    InvalidSocket,
    #[error(
        "timeouts must satisfy MCP_CONNECTION_TIMEOUT_SECS >= OLLAMA_STREAM_TIMEOUT_SECS >= OLLAMA_READ_TIMEOUT_SECS"
    )]
    InconsistentTimeouts,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let ollama_model = read("OLLAMA_MODEL").ok_or(ConfigError::MissingModel)?;
        let bind_addr = read("MCP_BIND_ADDR").unwrap_or_else(|| "127.0.0.1".to_string());
        let bind_port = read("MCP_BIND_PORT")
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(8081);

        let positive = |key: &'static str, default: u64| -> Result<u64, ConfigError> {
            match read(key) {
                None => Ok(default),
                Some(value) => value
                    .parse::<u64>()
                    .ok()
                    .filter(|parsed| *parsed > 0)
                    .ok_or(ConfigError::InvalidNumber(key)),
            }
        };

        let config = Self {
            bind_addr,
            bind_port,
            max_body_bytes: positive("MCP_MAX_BODY_BYTES", 10_000)? as usize,
            workers: positive("MCP_WORKERS", 20)? as usize,
            connection_timeout: Duration::from_secs(positive("MCP_CONNECTION_TIMEOUT_SECS", 120)?),
            header_read_timeout: Duration::from_secs(positive("MCP_HEADER_READ_TIMEOUT_SECS", 10)?),
            ollama_base_url: read("OLLAMA_BASE_URL")
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            ollama_model,
            ollama_connect_timeout: Duration::from_secs(positive(
                "OLLAMA_CONNECT_TIMEOUT_SECS",
                3,
            )?),
            ollama_read_timeout: Duration::from_secs(positive("OLLAMA_READ_TIMEOUT_SECS", 20)?),
            ollama_stream_timeout: Duration::from_secs(positive("OLLAMA_STREAM_TIMEOUT_SECS", 50)?),
        };

        if config.connection_timeout < config.ollama_stream_timeout
            || config.ollama_stream_timeout < config.ollama_read_timeout
        {
            return Err(ConfigError::InconsistentTimeouts);
        }

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }

    pub fn server_settings(&self) -> Result<ServerSettings, ConfigError> {
        Ok(ServerSettings {
            bind: self.bind_socket()?,
            path: MCP_PATH.to_string(),
            max_body_bytes: self.max_body_bytes,
            workers: self.workers,
            connection_timeout: self.connection_timeout,
            header_read_timeout: self.header_read_timeout,
            ..ServerSettings::default()
        })
    }

    pub fn ollama_settings(&self) -> OllamaSettings {
        OllamaSettings {
            base_url: self.ollama_base_url.clone(),
            model: self.ollama_model.clone(),
            connect_timeout: self.ollama_connect_timeout,
            read_timeout: self.ollama_read_timeout,
            ..OllamaSettings::default()
        }
    }
}
