//! Table-scoped datastore capability.

use crate::errors::{AgentError, CoachError};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use thiserror::Error;
use uuid::Uuid;

/// Error code reported when an optimistic version check fails.
pub const VERSION_CONFLICT: &str = "VERSION_CONFLICT";

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    /// Smallest first.
    #[default]
    Asc,
    /// Largest first.
    Desc,
}

/// Filter, order and limit for a select.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectQuery {
    /// Equality filters, all of which must match.
    pub filters: Vec<(String, Value)>,
    /// Optional ordering.
    pub order_by: Option<(String, OrderDirection)>,
    /// Maximum rows.
    pub limit: Option<usize>,
    /// Return a single row object instead of an array.
    pub single: bool,
}

impl SelectQuery {
    /// Creates an unfiltered query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equality filter.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    /// Orders the result.
    #[must_use]
    pub fn order(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    /// Limits the result.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Requests a single row.
    #[must_use]
    pub fn single(mut self) -> Self {
        self.single = true;
        self
    }
}

/// Error half of a datastore response.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct DatastoreError {
    /// Backend-specific code.
    pub code: Option<String>,
    /// Message.
    pub message: String,
}

impl DatastoreError {
    /// Creates an error without a code.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Creates a version-conflict error.
    #[must_use]
    pub fn version_conflict(message: impl Into<String>) -> Self {
        Self {
            code: Some(VERSION_CONFLICT.to_string()),
            message: message.into(),
        }
    }

    /// Returns true for optimistic-lock failures.
    #[must_use]
    pub fn is_version_conflict(&self) -> bool {
        self.code.as_deref() == Some(VERSION_CONFLICT)
    }
}

impl From<DatastoreError> for CoachError {
    fn from(err: DatastoreError) -> Self {
        let agent = if err.is_version_conflict() {
            AgentError::concurrency(err.message.clone())
        } else {
            AgentError::external_service(format!("Datastore error: {}", err.message))
        };
        match err.code {
            Some(code) => agent.with_detail("datastoreCode", code).into(),
            None => agent.into(),
        }
    }
}

/// `{data, error}` pair returned by every datastore call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatastoreResponse {
    /// Row, rows, or nothing.
    pub data: Option<Value>,
    /// Failure, if any.
    pub error: Option<DatastoreError>,
}

impl DatastoreResponse {
    /// A successful response.
    #[must_use]
    pub fn ok(data: Value) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    /// A response with neither data nor error.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A failed response.
    #[must_use]
    pub fn failed(error: DatastoreError) -> Self {
        Self {
            data: None,
            error: Some(error),
        }
    }

    /// Returns the data, treating absence as a missing entity.
    ///
    /// An error response maps to an external-service error, or to a
    /// concurrency error for version conflicts. No error and no data (or a
    /// null or empty array) is a resource error naming `entity`.
    pub fn into_found(self, entity: &str) -> Result<Value, CoachError> {
        if let Some(error) = self.error {
            return Err(error.into());
        }
        match self.data {
            None | Some(Value::Null) => Err(AgentError::resource(format!("{entity} not found")).into()),
            Some(Value::Array(rows)) if rows.is_empty() => {
                Err(AgentError::resource(format!("{entity} not found")).into())
            }
            Some(data) => Ok(data),
        }
    }

    /// Returns the data, allowing it to be absent.
    pub fn into_result(self) -> Result<Option<Value>, CoachError> {
        match self.error {
            Some(error) => Err(error.into()),
            None => Ok(self.data),
        }
    }
}

/// A table-scoped datastore.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Selects rows from `table`.
    async fn select(&self, table: &str, query: &SelectQuery) -> DatastoreResponse;

    /// Inserts a row and returns it as stored.
    async fn insert(&self, table: &str, row: Value) -> DatastoreResponse;

    /// Merges `patch` into the row with `id`.
    ///
    /// With `expected_version`, the update only applies if the stored
    /// `version` matches; otherwise a version-conflict error is returned.
    async fn update(
        &self,
        table: &str,
        id: &str,
        patch: Value,
        expected_version: Option<u64>,
    ) -> DatastoreResponse;
}

/// Datastore held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryDatastore {
    tables: DashMap<String, Vec<Value>>,
}

impl InMemoryDatastore {
    /// Creates an empty datastore.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a table with rows, returning `self`.
    #[must_use]
    pub fn with_rows(self, table: &str, rows: Vec<Value>) -> Self {
        self.tables.entry(table.to_string()).or_default().extend(rows);
        self
    }

    /// Returns a snapshot of a table.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .get(table)
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }
}

fn row_matches(row: &Value, filters: &[(String, Value)]) -> bool {
    filters
        .iter()
        .all(|(field, expected)| row.get(field) == Some(expected))
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl Datastore for InMemoryDatastore {
    async fn select(&self, table: &str, query: &SelectQuery) -> DatastoreResponse {
        let mut rows: Vec<Value> = self
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| row_matches(row, &query.filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some((field, direction)) = &query.order_by {
            rows.sort_by(|a, b| {
                let ord = compare_values(a.get(field), b.get(field));
                match direction {
                    OrderDirection::Asc => ord,
                    OrderDirection::Desc => ord.reverse(),
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        if query.single {
            match rows.into_iter().next() {
                Some(row) => DatastoreResponse::ok(row),
                None => DatastoreResponse::empty(),
            }
        } else {
            DatastoreResponse::ok(Value::Array(rows))
        }
    }

    async fn insert(&self, table: &str, row: Value) -> DatastoreResponse {
        let Value::Object(mut object) = row else {
            return DatastoreResponse::failed(DatastoreError::new("Inserted row must be an object"));
        };
        object
            .entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        object.entry("version").or_insert_with(|| Value::from(1));

        let stored = Value::Object(object);
        self.tables
            .entry(table.to_string())
            .or_default()
            .push(stored.clone());
        tracing::debug!(table, "Inserted row");
        DatastoreResponse::ok(stored)
    }

    async fn update(
        &self,
        table: &str,
        id: &str,
        patch: Value,
        expected_version: Option<u64>,
    ) -> DatastoreResponse {
        let Some(mut rows) = self.tables.get_mut(table) else {
            return DatastoreResponse::empty();
        };
        let Some(row) = rows
            .iter_mut()
            .find(|row| row.get("id").and_then(Value::as_str) == Some(id))
        else {
            return DatastoreResponse::empty();
        };

        let current = row.get("version").and_then(Value::as_u64).unwrap_or(0);
        if let Some(expected) = expected_version {
            if expected != current {
                return DatastoreResponse::failed(DatastoreError::version_conflict(format!(
                    "Row {id} in {table} is at version {current}, expected {expected}"
                )));
            }
        }

        let patch: Map<String, Value> = match patch {
            Value::Object(map) => map,
            _ => return DatastoreResponse::failed(DatastoreError::new("Patch must be an object")),
        };
        if let Value::Object(object) = &mut *row {
            for (key, value) in patch {
                object.insert(key, value);
            }
            object.insert("version".to_string(), Value::from(current + 1));
        }
        DatastoreResponse::ok(row.clone())
    }
}
