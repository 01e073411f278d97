//! # Storage Layer
//!
//! The engine never talks to a database driver directly. Every query it builds
//! goes through the [`Executor`] trait: composed SQL text plus a map of named
//! parameters in, typed rows out. Transaction demarcation lives one level up,
//! in [`Store::transaction`], and is only ever called by the API facade.
//!
//! ## Implementations
//!
//! - [`sqlite::SqliteStore`]: rusqlite-backed store, used in production
//!   (file database) and in tests (`SqliteStore::open_in_memory`).
//!
//! ## Parameters
//!
//! Parameters are keyed by their bare name (`p0`, `image`); the SQL refers to
//! them as `:p0`, `:image`. A parameter map must contain exactly the names the
//! statement references.

use crate::error::{CatalogError, Result};
use serde::Serialize;
use std::collections::BTreeMap;

pub mod schema;
pub mod sqlite;

/// A single typed cell, as read from or bound to the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    /// Bound as 0/1; serialized as a JSON boolean.
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Integer(value.into())
    }
}

impl From<u64> for SqlValue {
    fn from(value: u64) -> Self {
        SqlValue::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Real(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

pub type Params = BTreeMap<String, SqlValue>;

/// Build a parameter map from `(name, value)` pairs.
pub fn bind<const N: usize>(pairs: [(&str, SqlValue); N]) -> Params {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// One result row: column names (as aliased in the query) and their values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    fn require(&self, column: &str) -> Result<&SqlValue> {
        self.get(column).ok_or_else(|| {
            CatalogError::InvalidArgument(format!("column '{}' missing from row", column))
        })
    }

    pub fn i64(&self, column: &str) -> Result<i64> {
        self.opt_i64(column)?.ok_or_else(|| {
            CatalogError::InvalidArgument(format!("column '{}' is null", column))
        })
    }

    pub fn opt_i64(&self, column: &str) -> Result<Option<i64>> {
        match self.require(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Integer(v) => Ok(Some(*v)),
            other => Err(type_mismatch(column, "integer", other)),
        }
    }

    pub fn opt_i32(&self, column: &str) -> Result<Option<i32>> {
        self.opt_i64(column)?
            .map(|v| {
                i32::try_from(v).map_err(|_| {
                    CatalogError::InvalidArgument(format!("column '{}' overflows i32", column))
                })
            })
            .transpose()
    }

    pub fn i32(&self, column: &str) -> Result<i32> {
        self.opt_i32(column)?.ok_or_else(|| {
            CatalogError::InvalidArgument(format!("column '{}' is null", column))
        })
    }

    pub fn opt_f64(&self, column: &str) -> Result<Option<f64>> {
        match self.require(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Real(v) => Ok(Some(*v)),
            SqlValue::Integer(v) => Ok(Some(*v as f64)),
            other => Err(type_mismatch(column, "real", other)),
        }
    }

    pub fn opt_text(&self, column: &str) -> Result<Option<String>> {
        match self.require(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(v) => Ok(Some(v.clone())),
            other => Err(type_mismatch(column, "text", other)),
        }
    }

    pub fn text(&self, column: &str) -> Result<String> {
        self.opt_text(column)?.ok_or_else(|| {
            CatalogError::InvalidArgument(format!("column '{}' is null", column))
        })
    }

    pub fn bool(&self, column: &str) -> Result<bool> {
        match self.require(column)? {
            SqlValue::Bool(v) => Ok(*v),
            _ => Ok(self.opt_i64(column)?.unwrap_or(0) != 0),
        }
    }
}

fn type_mismatch(column: &str, expected: &str, found: &SqlValue) -> CatalogError {
    CatalogError::InvalidArgument(format!(
        "column '{}' expected {}, found {:?}",
        column, expected, found
    ))
}

/// The relational-execution collaborator.
///
/// Implementations run composed SQL with named parameters. They must not
/// open or commit transactions on their own.
pub trait Executor {
    /// Run a statement that returns rows.
    fn query(&self, sql: &str, params: &Params) -> Result<Vec<Row>>;

    /// Run a statement that modifies rows, returning the affected count.
    fn execute(&self, sql: &str, params: &Params) -> Result<usize>;

    /// Run a query expected to return at most one row.
    fn query_opt(&self, sql: &str, params: &Params) -> Result<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    /// Run an `INSERT ... RETURNING id` statement.
    fn insert(&self, sql: &str, params: &Params) -> Result<i64> {
        let row = self.query_opt(sql, params)?.ok_or_else(|| {
            CatalogError::InvalidArgument("insert returned no id".to_string())
        })?;
        row.i64("id")
    }
}

/// An executor that can also demarcate transactions.
pub trait Store: Executor {
    /// Run `f` inside a write transaction. Commits on `Ok`, rolls back on `Err`.
    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>;
}
