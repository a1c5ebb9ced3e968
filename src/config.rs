use crate::error::ConfigError;
use std::env;

/// Largest input routed to the batched loader.
pub const COPY_THRESHOLD: usize = 100_000;
/// Records per grouped insert statement.
pub const BATCH_SIZE: usize = 5_000;
/// Records per COPY stream.
pub const COPY_BATCH_SIZE: usize = 50_000;

pub const DEFAULT_TABLE: &str = "json_table";

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Strategy selection and chunk sizes, fixed for the lifetime of a dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    pub threshold: usize,
    pub batch_size: usize,
    pub copy_batch_size: usize,
}

impl LoaderConfig {
    /// Built-in sizes, ignoring the environment.
    pub const fn standard() -> Self {
        Self {
            threshold: COPY_THRESHOLD,
            batch_size: BATCH_SIZE,
            copy_batch_size: COPY_BATCH_SIZE,
        }
    }

    pub fn from_env() -> Self {
        Self::standard()
            .with_threshold(env_usize("JSON_LOADER_COPY_THRESHOLD", COPY_THRESHOLD))
            .with_batch_size(env_usize("JSON_LOADER_BATCH_SIZE", BATCH_SIZE))
            .with_copy_batch_size(env_usize("JSON_LOADER_COPY_BATCH_SIZE", COPY_BATCH_SIZE))
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    /// Chunk sizes are clamped to at least one record.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_copy_batch_size(mut self, copy_batch_size: usize) -> Self {
        self.copy_batch_size = copy_batch_size.max(1);
        self
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Connection settings for [`crate::store::PgStore`].
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub schema: Option<String>,
    pub table: String,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 5,
            schema: None,
            table: DEFAULT_TABLE.to_string(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let url = env_optional("DATABASE_URL").ok_or(ConfigError::MissingVar("DATABASE_URL"))?;

        let max_connections = match env_optional("DATABASE_MAX_CONNECTIONS") {
            Some(value) => value
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidValue {
                    key: "DATABASE_MAX_CONNECTIONS",
                    value,
                })?,
            None => 5,
        };

        Ok(Self {
            url,
            max_connections,
            schema: env_optional("JSON_LOADER_SCHEMA"),
            table: env_string("JSON_LOADER_TABLE", DEFAULT_TABLE),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 7] = [
        "JSON_LOADER_COPY_THRESHOLD",
        "JSON_LOADER_BATCH_SIZE",
        "JSON_LOADER_COPY_BATCH_SIZE",
        "DATABASE_URL",
        "DATABASE_MAX_CONNECTIONS",
        "JSON_LOADER_SCHEMA",
        "JSON_LOADER_TABLE",
    ];

    /// Run `f` with exactly `vars` set among [`VARS`], restoring them after.
    fn with_env<T>(vars: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
        let saved: Vec<(&str, Option<String>)> =
            VARS.iter().map(|key| (*key, env::var(key).ok())).collect();

        // SAFETY: env tests are serialized with `#[serial]`.
        unsafe {
            for key in VARS {
                env::remove_var(key);
            }
            for (key, value) in vars {
                env::set_var(key, value);
            }
        }

        let result = f();

        unsafe {
            for (key, value) in saved {
                match value {
                    Some(value) => env::set_var(key, value),
                    None => env::remove_var(key),
                }
            }
        }

        result
    }

    #[test]
    #[serial]
    fn loader_config_reads_overrides() {
        let config = with_env(
            &[
                ("JSON_LOADER_COPY_THRESHOLD", "250"),
                ("JSON_LOADER_BATCH_SIZE", "40"),
                ("JSON_LOADER_COPY_BATCH_SIZE", "0"),
            ],
            LoaderConfig::from_env,
        );

        assert_eq!(config.threshold, 250);
        assert_eq!(config.batch_size, 40);
        assert_eq!(config.copy_batch_size, 1);
    }

    #[test]
    #[serial]
    fn loader_config_ignores_unparsable_values() {
        let config = with_env(&[("JSON_LOADER_BATCH_SIZE", "lots")], LoaderConfig::default);
        assert_eq!(config, LoaderConfig::standard());
    }

    #[test]
    #[serial]
    fn database_config_requires_url() {
        let err = with_env(&[], DatabaseConfig::from_env).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar("DATABASE_URL")));
    }

    #[test]
    #[serial]
    fn database_config_rejects_zero_connections() {
        let err = with_env(
            &[
                ("DATABASE_URL", "postgres://localhost/test"),
                ("DATABASE_MAX_CONNECTIONS", "0"),
            ],
            DatabaseConfig::from_env,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            ConfigError::InvalidValue { key: "DATABASE_MAX_CONNECTIONS", ref value } if value == "0"
        ));
    }

    #[test]
    #[serial]
    fn database_config_env_defaults() {
        let config = with_env(
            &[("DATABASE_URL", "postgres://localhost/test")],
            DatabaseConfig::from_env,
        )
        .unwrap();

        assert_eq!(config.url, "postgres://localhost/test");
        assert_eq!(config.max_connections, 5);
        assert!(config.schema.is_none());
        assert_eq!(config.table, "json_table");
    }

    #[test]
    #[serial]
    fn database_config_reads_target() {
        let config = with_env(
            &[
                ("DATABASE_URL", "postgres://localhost/test"),
                ("DATABASE_MAX_CONNECTIONS", "12"),
                ("JSON_LOADER_SCHEMA", "staging"),
                ("JSON_LOADER_TABLE", "events"),
            ],
            DatabaseConfig::from_env,
        )
        .unwrap();

        assert_eq!(config.max_connections, 12);
        assert_eq!(config.schema.as_deref(), Some("staging"));
        assert_eq!(config.table, "events");
    }

    #[test]
    fn standard_sizes() {
        let config = LoaderConfig::standard();
        assert_eq!(config.threshold, 100_000);
        assert_eq!(config.batch_size, 5_000);
        assert_eq!(config.copy_batch_size, 50_000);
    }

    #[test]
    fn zero_chunk_sizes_are_clamped() {
        let config = LoaderConfig::standard()
            .with_batch_size(0)
            .with_copy_batch_size(0)
            .with_threshold(0);

        assert_eq!(config.batch_size, 1);
        assert_eq!(config.copy_batch_size, 1);
        assert_eq!(config.threshold, 0);
    }

    #[test]
    fn database_config_defaults() {
        let config = DatabaseConfig::new("postgres://localhost/test");
        assert_eq!(config.table, "json_table");
        assert_eq!(config.max_connections, 5);
        assert!(config.schema.is_none());
    }
}
