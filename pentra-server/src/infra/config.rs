//! Server configuration, loaded from the environment (with `.env` support).

use std::path::PathBuf;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Which decision provider backs planning and orchestration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// `heuristic` or `openai`. LLM-backed providers are always wrapped in
    /// the heuristic fallback decorator.
    pub kind: String,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database_url: String,
    /// Opaque blob sink for uploaded job artifacts.
    pub evidence_dir: PathBuf,
    pub provider: ProviderConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // .env is optional; real deployments set the environment directly.
        dotenvy::dotenv().ok();

        let port = match std::env::var("SERVER_PORT") {
            Ok(raw) => raw.parse().context("SERVER_PORT must be a port number")?,
            Err(_) => 8080,
        };

        Ok(Config {
            server: ServerConfig {
                host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port,
            },
            database_url: std::env::var("DATABASE_URL").unwrap_or_default(),
            evidence_dir: std::env::var("EVIDENCE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/data/evidence")),
            provider: ProviderConfig {
                kind: std::env::var("DECISION_PROVIDER")
                    .unwrap_or_else(|_| "heuristic".to_string()),
                base_url: std::env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
                model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            },
        })
    }
}
