//! Bulk loading of JSON records into PostgreSQL.
//!
//! Records land in a two-column table (`id BIGINT PRIMARY KEY, payload
//! JSONB`). [`InsertDispatcher`] picks a loading strategy from the input
//! size: grouped `UNNEST` inserts up to the configured threshold, CSV-framed
//! `COPY FROM STDIN` streams above it.

pub mod config;
pub mod encoder;
pub mod error;
pub mod load;
pub mod store;

pub use config::{DatabaseConfig, LoaderConfig};
pub use encoder::{JsonEncoder, Record, SerdeJsonEncoder};
pub use error::{ConfigError, EncodeError, LoadError, LoadFailure};
pub use load::{
    BatchLoader, BoundRow, CopyFormat, CopyLoader, InsertDispatcher, LoadReport, LoadStrategy,
    RowBinder,
};
pub use store::{JsonRows, PgStore, Store, StoreConnection, TargetTable};

use env_logger::Env;
use std::sync::Once;

static LOGGER: Once = Once::new();

/// Install the `env_logger` backend once; later calls are no-ops.
pub fn init_logger() {
    LOGGER.call_once(|| {
        let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info,sqlx=warn"))
            .is_test(cfg!(test))
            .try_init();
    });
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use crate::encoder::Record;
    use serde::ser::{Error as _, Serialize, Serializer};
    use serde_json::{Value, json};

    pub use database::{TestDatabase, TestDatabaseError};

    /// `n` records shaped `{id, name: "item-\"<id>\"", value: id * 10}` with
    /// ids starting at 1, so the record at position `i` has logical id `i + 1`.
    pub fn generate_records(n: usize) -> Vec<Record> {
        (1..=n as u64)
            .map(|id| {
                let mut record = Record::new();
                record.insert("id".to_string(), json!(id));
                record.insert("name".to_string(), json!(format!("item-\"{id}\"")));
                record.insert("value".to_string(), json!(id * 10));
                record
            })
            .collect()
    }

    /// A record that either encodes normally or refuses to serialize.
    #[derive(Debug, Clone)]
    pub enum TestRecord {
        Valid(Value),
        Unencodable,
    }

    impl TestRecord {
        pub fn valid(value: impl Into<Value>) -> Self {
            TestRecord::Valid(value.into())
        }

        pub fn unencodable() -> Self {
            TestRecord::Unencodable
        }
    }

    impl Serialize for TestRecord {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            match self {
                TestRecord::Valid(value) => value.serialize(serializer),
                TestRecord::Unencodable => {
                    Err(S::Error::custom("value cannot be represented as JSON"))
                }
            }
        }
    }

    pub mod memory {
        use crate::store::{JsonRows, Store, StoreConnection, TargetTable};
        use parking_lot::Mutex;
        use serde_json::Value;
        use std::collections::{BTreeMap, HashSet};
        use std::sync::Arc;

        #[derive(Debug, Default)]
        struct MemoryState {
            rows: BTreeMap<i64, String>,
            acquisitions: usize,
            releases: usize,
            grouped_calls: usize,
            copy_calls: usize,
            submissions: usize,
            rejected_submissions: Vec<usize>,
            refuse_connections: bool,
        }

        impl MemoryState {
            fn admit_submission(&mut self) -> Result<(), sqlx::Error> {
                self.submissions += 1;
                if self.rejected_submissions.contains(&self.submissions) {
                    return Err(sqlx::Error::Protocol(format!(
                        "submission {} rejected",
                        self.submissions
                    )));
                }
                Ok(())
            }

            /// Insert all rows or none, enforcing the primary key and JSON payloads.
            fn insert_atomic(&mut self, rows: Vec<(i64, String)>) -> Result<u64, sqlx::Error> {
                let mut seen = HashSet::with_capacity(rows.len());
                for (id, payload) in &rows {
                    if self.rows.contains_key(id) || !seen.insert(*id) {
                        return Err(sqlx::Error::Protocol(format!(
                            "duplicate key value violates unique constraint: id={id}"
                        )));
                    }
                    if serde_json::from_str::<Value>(payload).is_err() {
                        return Err(sqlx::Error::Protocol(format!(
                            "invalid input syntax for type json: id={id}"
                        )));
                    }
                }

                let count = rows.len() as u64;
                self.rows.extend(rows);
                Ok(count)
            }
        }

        /// In-memory store with PostgreSQL-like rejection rules and call counters.
        #[derive(Debug, Clone)]
        pub struct MemoryStore {
            state: Arc<Mutex<MemoryState>>,
            target: TargetTable,
        }

        impl Default for MemoryStore {
            fn default() -> Self {
                Self::new()
            }
        }

        impl MemoryStore {
            pub fn new() -> Self {
                Self {
                    state: Arc::new(Mutex::new(MemoryState::default())),
                    target: TargetTable::new(crate::config::DEFAULT_TABLE),
                }
            }

            /// Reject the `n`-th submission (1-based, grouped and copy combined).
            /// Calls accumulate.
            pub fn reject_submission(self, n: usize) -> Self {
                self.state.lock().rejected_submissions.push(n);
                self
            }

            pub fn refuse_connections(self) -> Self {
                self.state.lock().refuse_connections = true;
                self
            }

            pub fn rows(&self) -> BTreeMap<i64, String> {
                self.state.lock().rows.clone()
            }

            pub fn ids(&self) -> Vec<i64> {
                self.state.lock().rows.keys().copied().collect()
            }

            pub fn payload(&self, id: i64) -> Option<Value> {
                let state = self.state.lock();
                state
                    .rows
                    .get(&id)
                    .and_then(|payload| serde_json::from_str(payload).ok())
            }

            pub fn row_count(&self) -> usize {
                self.state.lock().rows.len()
            }

            pub fn acquisitions(&self) -> usize {
                self.state.lock().acquisitions
            }

            pub fn releases(&self) -> usize {
                self.state.lock().releases
            }

            pub fn grouped_calls(&self) -> usize {
                self.state.lock().grouped_calls
            }

            pub fn copy_calls(&self) -> usize {
                self.state.lock().copy_calls
            }
        }

        impl Store for MemoryStore {
            type Connection = MemoryConnection;

            fn target(&self) -> &TargetTable {
                &self.target
            }

            async fn acquire(&self) -> Result<MemoryConnection, sqlx::Error> {
                let mut state = self.state.lock();
                if state.refuse_connections {
                    return Err(sqlx::Error::PoolTimedOut);
                }
                state.acquisitions += 1;

                Ok(MemoryConnection {
                    state: Arc::clone(&self.state),
                })
            }
        }

        pub struct MemoryConnection {
            state: Arc<Mutex<MemoryState>>,
        }

        impl Drop for MemoryConnection {
            fn drop(&mut self) {
                self.state.lock().releases += 1;
            }
        }

        impl StoreConnection for MemoryConnection {
            async fn insert_rows(
                &mut self,
                _statement: &str,
                rows: &JsonRows,
            ) -> Result<u64, sqlx::Error> {
                let mut state = self.state.lock();
                state.grouped_calls += 1;
                state.admit_submission()?;

                let rows = rows
                    .ids
                    .iter()
                    .copied()
                    .zip(rows.payloads.iter().cloned())
                    .collect();
                state.insert_atomic(rows)
            }

            async fn copy_in(&mut self, statement: &str, frame: &[u8]) -> Result<u64, sqlx::Error> {
                let mut state = self.state.lock();
                state.copy_calls += 1;
                state.admit_submission()?;

                let (delimiter, quote) = parse_copy_options(statement)
                    .ok_or_else(|| sqlx::Error::Protocol(format!("unsupported COPY: {statement}")))?;
                let text = std::str::from_utf8(frame)
                    .map_err(|err| sqlx::Error::Protocol(err.to_string()))?;
                let rows = parse_frame(text, delimiter, quote).map_err(sqlx::Error::Protocol)?;

                state.insert_atomic(rows)
            }
        }

        fn parse_copy_options(statement: &str) -> Option<(char, char)> {
            if !statement.contains("FORMAT csv") {
                return None;
            }
            Some((
                sql_char_after(statement, "DELIMITER ")?,
                sql_char_after(statement, "QUOTE ")?,
            ))
        }

        fn sql_char_after(statement: &str, keyword: &str) -> Option<char> {
            let rest = &statement[statement.find(keyword)? + keyword.len()..];
            if rest.starts_with("''''") {
                return Some('\'');
            }

            let mut chars = rest.chars();
            if chars.next()? != '\'' {
                return None;
            }
            let ch = chars.next()?;
            (chars.next()? == '\'').then_some(ch)
        }

        /// Parse CSV with doubled-quote escaping into `(id, payload)` rows.
        fn parse_frame(text: &str, delimiter: char, quote: char) -> Result<Vec<(i64, String)>, String> {
            let mut rows = Vec::new();
            let mut fields: Vec<String> = Vec::new();
            let mut field = String::new();
            let mut in_quotes = false;
            let mut chars = text.chars().peekable();

            while let Some(ch) = chars.next() {
                if in_quotes {
                    if ch == quote {
                        if chars.peek() == Some(&quote) {
                            field.push(quote);
                            chars.next();
                        } else {
                            in_quotes = false;
                        }
                    } else {
                        field.push(ch);
                    }
                } else if ch == quote {
                    in_quotes = true;
                } else if ch == delimiter {
                    fields.push(std::mem::take(&mut field));
                } else if ch == '\n' {
                    fields.push(std::mem::take(&mut field));
                    rows.push(csv_row(std::mem::take(&mut fields))?);
                } else {
                    field.push(ch);
                }
            }

            if in_quotes {
                return Err("unterminated CSV quoted field".to_string());
            }
            if !field.is_empty() || !fields.is_empty() {
                fields.push(field);
                rows.push(csv_row(fields)?);
            }

            Ok(rows)
        }

        fn csv_row(fields: Vec<String>) -> Result<(i64, String), String> {
            match fields.as_slice() {
                [id, payload] => id
                    .parse::<i64>()
                    .map(|id| (id, payload.clone()))
                    .map_err(|_| format!("invalid input syntax for type bigint: {id:?}")),
                _ => Err(format!("expected 2 columns, found {}", fields.len())),
            }
        }

        #[cfg(test)]
        mod tests {
            use super::*;

            #[test]
            fn parses_doubled_quotes_and_embedded_newlines() {
                let rows = parse_frame("0;\"{\"\"a\"\":\"\"x\ny\"\"}\"\n7;\"[]\"\n", ';', '"').unwrap();
                assert_eq!(rows, vec![(0, "{\"a\":\"x\ny\"}".to_string()), (7, "[]".to_string())]);
            }

            #[test]
            fn lone_quote_is_rejected() {
                assert!(parse_frame("0;\"{\"a\"\n", ';', '"').is_err());
            }

            #[test]
            fn extra_columns_are_rejected() {
                assert!(parse_frame("0;\"{}\";\"x\"\n", ';', '"').is_err());
            }

            #[test]
            fn reads_options_from_statement() {
                let statement =
                    "COPY \"t\" (id, payload) FROM STDIN WITH (FORMAT csv, DELIMITER '|', QUOTE '''')";
                assert_eq!(parse_copy_options(statement), Some(('|', '\'')));
            }
        }
    }

    pub mod database {
        use crate::config::DEFAULT_TABLE;
        use crate::store::{PgStore, TargetTable};
        use log::LevelFilter;
        use serde_json::Value;
        use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
        use sqlx::{ConnectOptions, PgPool};
        use testcontainers::core::error::TestcontainersError;
        use testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner};
        use testcontainers_modules::postgres::Postgres;
        use thiserror::Error;
        use tokio::runtime::Handle;
        use uuid::Uuid;

        static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

        #[derive(Debug, Error)]
        pub enum TestDatabaseError {
            #[error("TEST_DATABASE_URL not set and no container could be started: {0}")]
            ContainerUnavailable(TestcontainersError),
            #[error("database error: {0}")]
            Sqlx(#[from] sqlx::Error),
            #[error("migration error: {0}")]
            Migration(#[from] sqlx::migrate::MigrateError),
            #[error("container error: {0}")]
            Container(#[from] TestcontainersError),
        }

        /// Ephemeral schema holding a fresh `json_table`, one per test.
        pub struct TestDatabase {
            pool: Option<PgPool>,
            schema: String,
            container: Option<ContainerAsync<Postgres>>,
        }

        impl TestDatabase {
            /// Provision a schema in the database named by `TEST_DATABASE_URL`,
            /// or in a disposable container when it is unset.
            pub async fn new_from_env() -> Result<Self, TestDatabaseError> {
                match std::env::var("TEST_DATABASE_URL") {
                    Ok(url) if !url.trim().is_empty() => Self::provision(&url, None).await,
                    _ => Self::with_container().await,
                }
            }

            /// Provision a schema inside a disposable Postgres container.
            pub async fn with_container() -> Result<Self, TestDatabaseError> {
                let container = Postgres::default()
                    .with_tag("16-alpine")
                    .start()
                    .await
                    .map_err(TestDatabaseError::ContainerUnavailable)?;

                let host = container.get_host().await?.to_string();
                let port = container.get_host_port_ipv4(5432).await?;
                let url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

                Self::provision(&url, Some(container)).await
            }

            async fn provision(
                url: &str,
                container: Option<ContainerAsync<Postgres>>,
            ) -> Result<Self, TestDatabaseError> {
                crate::init_logger();

                let base_options: PgConnectOptions = url.parse()?;
                let base_options = base_options.log_statements(LevelFilter::Off);

                let schema = format!("json_load_{}", Uuid::new_v4().simple());

                let admin_pool = PgPoolOptions::new()
                    .max_connections(1)
                    .connect_with(base_options.clone())
                    .await?;
                sqlx::query(&format!("CREATE SCHEMA \"{}\"", schema))
                    .execute(&admin_pool)
                    .await?;
                admin_pool.close().await;

                let pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect_with(base_options.options([("search_path", schema.as_str())]))
                    .await?;

                MIGRATOR.run(&pool).await?;

                Ok(Self {
                    pool: Some(pool),
                    schema,
                    container,
                })
            }

            pub fn pool(&self) -> &PgPool {
                self.pool.as_ref().expect("test database pool is available")
            }

            pub fn pool_clone(&self) -> PgPool {
                self.pool().clone()
            }

            pub fn schema(&self) -> &str {
                &self.schema
            }

            /// Store targeting this run's schema.
            pub fn store(&self) -> PgStore {
                PgStore::new(
                    self.pool_clone(),
                    TargetTable::new(DEFAULT_TABLE).in_schema(self.schema.clone()),
                )
            }

            pub async fn row_count(&self) -> Result<i64, sqlx::Error> {
                sqlx::query_scalar("SELECT COUNT(*) FROM json_table")
                    .fetch_one(self.pool())
                    .await
            }

            pub async fn ids(&self) -> Result<Vec<i64>, sqlx::Error> {
                sqlx::query_scalar("SELECT id FROM json_table ORDER BY id")
                    .fetch_all(self.pool())
                    .await
            }

            pub async fn existing_ids(&self, ids: &[i64]) -> Result<Vec<i64>, sqlx::Error> {
                sqlx::query_scalar("SELECT id FROM json_table WHERE id = ANY($1) ORDER BY id")
                    .bind(ids)
                    .fetch_all(self.pool())
                    .await
            }

            /// Stored payload parsed back into JSON.
            pub async fn payload(&self, id: i64) -> Result<Option<Value>, sqlx::Error> {
                let text: Option<String> =
                    sqlx::query_scalar("SELECT payload::text FROM json_table WHERE id = $1")
                        .bind(id)
                        .fetch_optional(self.pool())
                        .await?;

                text.map(|text| serde_json::from_str(&text))
                    .transpose()
                    .map_err(|err| sqlx::Error::Decode(Box::new(err)))
            }

            pub async fn truncate(&self) -> Result<(), sqlx::Error> {
                sqlx::query("TRUNCATE json_table").execute(self.pool()).await?;
                Ok(())
            }

            /// Drop the schema and close the pool.
            pub async fn close(mut self) -> Result<(), TestDatabaseError> {
                if let Some(pool) = self.pool.take() {
                    drop_schema(&pool, &self.schema).await?;
                    pool.close().await;
                }

                if let Some(container) = self.container.take() {
                    drop(container);
                }

                Ok(())
            }
        }

        async fn drop_schema(pool: &PgPool, schema: &str) -> Result<(), sqlx::Error> {
            let drop_sql = format!("DROP SCHEMA IF EXISTS \"{}\" CASCADE", schema);
            sqlx::query(&drop_sql).execute(pool).await?;
            Ok(())
        }

        impl Drop for TestDatabase {
            fn drop(&mut self) {
                if let Some(pool) = self.pool.take() {
                    let schema = self.schema.clone();
                    if let Ok(handle) = Handle::try_current() {
                        handle.spawn(async move {
                            let _ = drop_schema(&pool, &schema).await;
                            pool.close().await;
                        });
                    } else {
                        std::thread::spawn(move || {
                            if let Ok(rt) = tokio::runtime::Runtime::new() {
                                rt.block_on(async move {
                                    let _ = drop_schema(&pool, &schema).await;
                                    pool.close().await;
                                });
                            }
                        });
                    }
                }

                if let Some(container) = self.container.take() {
                    drop(container);
                }
            }
        }
    }
}
