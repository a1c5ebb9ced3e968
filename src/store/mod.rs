//! Store abstraction used by the loaders.
//!
//! A [`Store`] hands out one [`StoreConnection`] per load call. The
//! connection is an owned guard: dropping it releases the underlying
//! resource, so every exit path of a loader (including `?` on error)
//! gives it back.
//!
//! Two primitives are exposed:
//!
//! - **Grouped insert** (`insert_rows`) - one statement carrying a whole
//!   chunk of rows in columnar form, executed in a single round trip and
//!   committed or rejected as a unit.
//! - **Bulk copy** (`copy_in`) - a `COPY ... FROM STDIN` statement fed with a
//!   pre-framed byte stream; returns the number of rows the store ingested.

pub mod postgres;

pub use postgres::{PgStore, PgStoreConnection};

/// Table receiving the `(id, payload)` rows, optionally schema-qualified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetTable {
    pub schema: Option<String>,
    pub name: String,
}

impl TargetTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Quoted, schema-qualified name safe to splice into SQL.
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&self.name)),
            None => quote_ident(&self.name),
        }
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// One chunk of bound rows in columnar layout for `UNNEST`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct JsonRows {
    pub ids: Vec<i64>,
    pub payloads: Vec<String>,
}

impl JsonRows {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: Vec::with_capacity(capacity),
            payloads: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, id: i64, payload: String) {
        self.ids.push(id);
        self.payloads.push(payload);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[allow(async_fn_in_trait)]
pub trait Store {
    type Connection: StoreConnection;

    fn target(&self) -> &TargetTable;

    async fn acquire(&self) -> Result<Self::Connection, sqlx::Error>;
}

#[allow(async_fn_in_trait)]
pub trait StoreConnection {
    /// Execute a grouped insert. Returns rows affected.
    async fn insert_rows(&mut self, statement: &str, rows: &JsonRows) -> Result<u64, sqlx::Error>;

    /// Stream `frame` through a COPY statement. Returns rows ingested.
    async fn copy_in(&mut self, statement: &str, frame: &[u8]) -> Result<u64, sqlx::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unqualified_name_is_quoted() {
        assert_eq!(TargetTable::new("json_table").qualified_name(), "\"json_table\"");
    }

    #[test]
    fn schema_with_dashes_is_quoted() {
        let table = TargetTable::new("json_table").in_schema("6f1c-4e2a");
        assert_eq!(table.qualified_name(), "\"6f1c-4e2a\".\"json_table\"");
    }

    #[test]
    fn embedded_quotes_are_doubled() {
        let table = TargetTable::new("odd\"name");
        assert_eq!(table.qualified_name(), "\"odd\"\"name\"");
    }
}
