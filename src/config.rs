use anyhow::{Context, Result};

pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
}

pub struct DatabaseConfig {
    pub url: String,
}

pub struct ServerConfig {
    pub port: u16,
}

/// Load configuration from the environment. `DATABASE_URL` is required,
/// everything else has a sensible default.
pub fn load() -> Result<Config> {
    let url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    let port = match std::env::var("PORT") {
        Ok(raw) => raw.parse().context("PORT must be a valid port number")?,
        Err(_) => 3000,
    };

    Ok(Config {
        database: DatabaseConfig { url },
        server: ServerConfig { port },
    })
}
