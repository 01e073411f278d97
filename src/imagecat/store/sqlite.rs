use super::{schema, Executor, Params, Row, SqlValue, Store};
use crate::config::CatalogConfig;
use crate::error::Result;
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Bool(v) => ToSqlOutput::Owned(Value::Integer(i64::from(*v))),
            SqlValue::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            SqlValue::Real(v) => ToSqlOutput::Owned(Value::Real(*v)),
            SqlValue::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
        })
    }
}

fn read_value(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(v) => SqlValue::Integer(v),
        ValueRef::Real(v) => SqlValue::Real(v),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            SqlValue::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

/// SQLite-backed catalog store.
///
/// One store owns one connection. Open one store per thread.
pub struct SqliteStore {
    conn: Connection,
    db_path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) a catalog database file and bootstrap its schema.
    pub fn open<P: AsRef<Path>>(path: P, config: &CatalogConfig) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        Self::init(&conn)?;
        debug!(path = %path.display(), "catalog opened");

        Ok(Self {
            conn,
            db_path: Some(path.to_path_buf()),
        })
    }

    /// A private, empty catalog that lives as long as the store.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn,
            db_path: None,
        })
    }

    fn init(conn: &Connection) -> rusqlite::Result<()> {
        conn.pragma_update(None, "foreign_keys", true)?;
        // `like` is case-sensitive, `ilike` is rendered with LOWER().
        conn.pragma_update(None, "case_sensitive_like", true)?;
        schema::bootstrap(conn)
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }
}

fn named(params: &Params) -> Vec<String> {
    params.keys().map(|name| format!(":{}", name)).collect()
}

impl Executor for SqliteStore {
    fn query(&self, sql: &str, params: &Params) -> Result<Vec<Row>> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let names = named(params);
        let bound: Vec<(&str, &dyn ToSql)> = names
            .iter()
            .zip(params.values())
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect();

        let mut rows = stmt.query(bound.as_slice())?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(read_value(row.get_ref(i)?));
            }
            result.push(Row::new(columns.clone(), values));
        }
        Ok(result)
    }

    fn execute(&self, sql: &str, params: &Params) -> Result<usize> {
        let names = named(params);
        let bound: Vec<(&str, &dyn ToSql)> = names
            .iter()
            .zip(params.values())
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect();
        Ok(self.conn.execute(sql, bound.as_slice())?)
    }
}

impl Store for SqliteStore {
    /// Runs `f` inside `BEGIN IMMEDIATE`, so the write lock is held from the
    /// first read. Guard checks and the writes that depend on them cannot
    /// interleave with another writer.
    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(self) {
            Ok(value) => {
                if let Err(err) = self.conn.execute_batch("COMMIT") {
                    self.rollback();
                    return Err(err.into());
                }
                Ok(value)
            }
            Err(err) => {
                self.rollback();
                Err(err)
            }
        }
    }
}

impl SqliteStore {
    fn rollback(&self) {
        if let Err(err) = self.conn.execute_batch("ROLLBACK") {
            warn!(error = %err, "rollback failed");
        }
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;
    use crate::store::bind;

    #[test]
    fn binds_named_parameters() {
        let store = SqliteStore::open_in_memory().unwrap();
        let rows = store
            .query(
                "SELECT :a + 1 AS next, :b AS label, :c AS empty",
                &bind([
                    ("a", 41i64.into()),
                    ("b", "x".into()),
                    ("c", SqlValue::Null),
                ]),
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].i64("next").unwrap(), 42);
        assert_eq!(rows[0].text("label").unwrap(), "x");
        assert_eq!(rows[0].opt_i64("empty").unwrap(), None);
    }

    #[test]
    fn rolls_back_failed_transaction() {
        let store = SqliteStore::open_in_memory().unwrap();
        let result: Result<()> = store.transaction(|tx| {
            tx.execute(
                "INSERT INTO tag (name) VALUES (:name)",
                &bind([("name", "kept?".into())]),
            )?;
            Err(CatalogError::InvalidArgument("boom".into()))
        });
        assert!(result.is_err());

        let rows = store.query("SELECT id FROM tag", &Params::new()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn commits_successful_transaction() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store
            .transaction(|tx| {
                tx.insert(
                    "INSERT INTO tag (name) VALUES (:name) RETURNING id",
                    &bind([("name", "kept".into())]),
                )
            })
            .unwrap();

        let row = store
            .query_opt("SELECT name FROM tag WHERE id = :id", &bind([("id", id.into())]))
            .unwrap()
            .unwrap();
        assert_eq!(row.text("name").unwrap(), "kept");
    }

    #[test]
    fn opens_file_database_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("catalog.db");
        let config = CatalogConfig::default();
        {
            let store = SqliteStore::open(&path, &config).unwrap();
            store
                .execute("INSERT INTO tag (name) VALUES ('a')", &Params::new())
                .unwrap();
        }
        let store = SqliteStore::open(&path, &config).unwrap();
        let rows = store.query("SELECT name FROM tag", &Params::new()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(store.path(), Some(path.as_path()));
    }
}
