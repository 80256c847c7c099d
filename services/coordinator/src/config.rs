use anyhow::{bail, Context, Result};

// Coordinator configuration sourced from environment variables.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    // Postgres connection string; the only required setting.
    pub db_url: String,
    // HTTP listen port for the worker API.
    pub server_port: u16,
    // Run embedded migrations at startup when true.
    pub auto_migrate: bool,
    // Pool sizing: caps concurrent store work.
    pub db_max_connections: u32,
    // Fail fast instead of hanging when the pool is exhausted.
    pub db_acquire_timeout_ms: u64,
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw {
        "true" | "1" => Ok(true),
        "false" | "0" | "" => Ok(false),
        other => bail!("invalid boolean for {name}: {other:?}"),
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self> {
        let db_url = std::env::var("KONTROL_DB_URL").context("KONTROL_DB_URL is required")?;
        let server_port = std::env::var("KONTROL_SERVER_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .context("parse KONTROL_SERVER_PORT")?;
        let auto_migrate = match std::env::var("KONTROL_AUTO_MIGRATE") {
            Ok(raw) => parse_bool("KONTROL_AUTO_MIGRATE", &raw)?,
            Err(_) => false,
        };
        let db_max_connections = std::env::var("KONTROL_DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("parse KONTROL_DB_MAX_CONNECTIONS")?;
        let db_acquire_timeout_ms = std::env::var("KONTROL_DB_ACQUIRE_TIMEOUT_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .context("parse KONTROL_DB_ACQUIRE_TIMEOUT_MS")?;
        Ok(Self {
            db_url,
            server_port,
            auto_migrate,
            db_max_connections,
            db_acquire_timeout_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_kontrol_env() {
        for (key, _) in env::vars() {
            if key.starts_with("KONTROL_") {
                env::remove_var(key);
            }
        }
    }

    #[serial]
    #[test]
    fn from_env_requires_db_url() {
        clear_kontrol_env();
        assert!(ApiConfig::from_env().is_err());
    }

    #[serial]
    #[test]
    fn from_env_uses_defaults() {
        clear_kontrol_env();
        env::set_var("KONTROL_DB_URL", "postgres://localhost/kontrol");
        let config = ApiConfig::from_env().expect("from_env");
        assert_eq!(config.server_port, 8080);
        assert!(!config.auto_migrate);
        assert_eq!(config.db_max_connections, 10);
        assert_eq!(config.db_acquire_timeout_ms, 5000);
        clear_kontrol_env();
    }

    #[serial]
    #[test]
    fn from_env_respects_overrides() {
        clear_kontrol_env();
        env::set_var("KONTROL_DB_URL", "postgres://db/kontrol");
        env::set_var("KONTROL_SERVER_PORT", "9090");
        env::set_var("KONTROL_AUTO_MIGRATE", "true");
        env::set_var("KONTROL_DB_MAX_CONNECTIONS", "32");
        let config = ApiConfig::from_env().expect("from_env");
        assert_eq!(config.server_port, 9090);
        assert!(config.auto_migrate);
        assert_eq!(config.db_max_connections, 32);
        clear_kontrol_env();
    }

    #[serial]
    #[test]
    fn from_env_rejects_bad_values() {
        clear_kontrol_env();
        env::set_var("KONTROL_DB_URL", "postgres://db/kontrol");
        env::set_var("KONTROL_SERVER_PORT", "not-a-port");
        assert!(ApiConfig::from_env().is_err());

        env::set_var("KONTROL_SERVER_PORT", "8080");
        env::set_var("KONTROL_AUTO_MIGRATE", "maybe");
        assert!(ApiConfig::from_env().is_err());
        clear_kontrol_env();
    }
}
