use crate::{env_parse, env_required, ConfigError, FromEnv};

/// Connection pool settings for the notification store
#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    /// Connection attempts made at startup before giving up
    pub connect_retries: u32,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 20,
            min_connections: 2,
            connect_timeout_secs: 8,
            connect_retries: 5,
        }
    }
}

impl FromEnv for DatabaseConfig {
    /// Requires DATABASE_URL; pool sizes come from DATABASE_MAX_CONNECTIONS /
    /// DATABASE_MIN_CONNECTIONS
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::new(env_required("DATABASE_URL")?);
        Ok(Self {
            max_connections: env_parse("DATABASE_MAX_CONNECTIONS", defaults.max_connections)?,
            min_connections: env_parse("DATABASE_MIN_CONNECTIONS", defaults.min_connections)?,
            connect_timeout_secs: env_parse(
                "DATABASE_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout_secs,
            )?,
            connect_retries: env_parse("DATABASE_CONNECT_RETRIES", defaults.connect_retries)?,
            ..defaults
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_from_env_success() {
        temp_env::with_vars(
            [
                ("DATABASE_URL", Some("postgres://localhost/orders")),
                ("DATABASE_MAX_CONNECTIONS", Some("50")),
            ],
            || {
                let config = DatabaseConfig::from_env().unwrap();
                assert_eq!(config.url, "postgres://localhost/orders");
                assert_eq!(config.max_connections, 50);
                assert_eq!(config.min_connections, 2);
            },
        );
    }

    #[test]
    fn test_database_config_from_env_missing() {
        temp_env::with_var_unset("DATABASE_URL", || {
            let err = DatabaseConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("DATABASE_URL"));
        });
    }
}
