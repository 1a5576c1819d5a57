//! Configuration management for the Vehicle Registry Service
//!
//! Loads configuration from environment variables with sensible defaults.

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use vehicle_registry_common::{Address, RoleConfig};

/// Where registry state is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Redis,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(StorageBackend::Redis),
            "memory" => Ok(StorageBackend::Memory),
            other => anyhow::bail!("Unknown STORAGE_BACKEND: {} (expected redis/memory)", other),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// API server host
    pub host: String,

    /// API server port
    pub port: u16,

    pub storage_backend: StorageBackend,

    /// Redis connection URL (redis backend only)
    pub redis_url: Option<String>,

    /// Key prefix separating registry instances sharing one Redis
    pub redis_key_prefix: String,

    /// Role assignment for a newly initialized registry
    pub roles: RoleConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenvy::dotenv().ok();

        let config = Config {
            host: env::var("REGISTRY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),

            port: env::var("REGISTRY_PORT")
                .unwrap_or_else(|_| "8084".to_string())
                .parse()
                .context("Invalid REGISTRY_PORT")?,

            storage_backend: env::var("STORAGE_BACKEND")
                .unwrap_or_else(|_| "redis".to_string())
                .parse()?,

            redis_url: env::var("REDIS_URL").ok(),

            redis_key_prefix: env::var("REDIS_KEY_PREFIX")
                .unwrap_or_else(|_| "registry".to_string()),

            roles: RoleConfig::new(
                role_address("DEALERSHIP_ADDRESS")?,
                role_address("SERVICE_CENTRE_ADDRESS")?,
                role_address("COMPANY_ADDRESS")?,
            ),
        };

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("REGISTRY_PORT must be greater than 0");
        }

        if self.storage_backend == StorageBackend::Redis && self.redis_url.is_none() {
            anyhow::bail!("REDIS_URL is required when STORAGE_BACKEND=redis");
        }

        if self.redis_key_prefix.is_empty() {
            anyhow::bail!("REDIS_KEY_PREFIX must not be empty");
        }

        Ok(())
    }

    /// Get the API server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn role_address(var: &str) -> Result<Address> {
    let value = env::var(var).with_context(|| format!("{} is not set", var))?;
    value
        .parse()
        .with_context(|| format!("Invalid {}", var))
}
