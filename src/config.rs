use std::env;
use std::net::SocketAddr;

use anyhow::Context;

pub struct Config {
    pub bind_addr: SocketAddr,
    pub database_url: String,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let bind_addr = env_or("BIND_ADDR", "127.0.0.1:3000")
            .parse()
            .context("BIND_ADDR is not a valid socket address")?;
        let database_url = env_or("DATABASE_URL", "postgres://localhost:5432/infosys");
        Ok(Self {
            bind_addr,
            database_url,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| {
        log::info!("{} not set, using default: {}", key, default);
        default.to_string()
    })
}
