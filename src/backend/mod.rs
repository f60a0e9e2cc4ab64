//! Remote data service: the trait the data modules call, and its HTTP implementation.

pub mod api_types;
mod client;
#[cfg(test)]
pub mod mock;
pub mod types;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::BackendError;

pub use client::RestBackend;

/// Row filter understood by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
  pub column: String,
  pub op: FilterOp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
  Eq(String),
  In(Vec<String>),
}

impl Filter {
  pub fn eq(column: &str, value: impl ToString) -> Self {
    Self {
      column: column.to_string(),
      op: FilterOp::Eq(value.to_string()),
    }
  }

  pub fn in_list<I, S>(column: &str, values: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: ToString,
  {
    Self {
      column: column.to_string(),
      op: FilterOp::In(values.into_iter().map(|v| v.to_string()).collect()),
    }
  }

  /// Render as a PostgREST query pair, e.g. `("id", "eq.s1")`.
  pub fn to_query_pair(&self) -> (String, String) {
    let value = match &self.op {
      FilterOp::Eq(v) => format!("eq.{}", v),
      FilterOp::In(values) => {
        let quoted: Vec<String> = values.iter().map(|v| quote_list_value(v)).collect();
        format!("in.({})", quoted.join(","))
      }
    };
    (self.column.clone(), value)
  }
}

/// Values containing list delimiters must be double-quoted inside `in.(...)`.
fn quote_list_value(value: &str) -> String {
  if value.contains([',', '(', ')', '"', '\\']) {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
  } else {
    value.to_string()
  }
}

/// Async JSON access to the remote tables and procedures.
///
/// Every method either returns the JSON body or a classified error.
#[async_trait]
pub trait Backend: Send + Sync {
  /// Read rows from `table` matching all `filters`.
  async fn select(&self, table: &str, filters: &[Filter]) -> Result<Value, BackendError>;

  /// Call a remote procedure.
  async fn rpc(&self, function: &str, args: Value) -> Result<Value, BackendError>;

  /// Insert a row, returning it as stored.
  async fn insert(&self, table: &str, row: Value) -> Result<Value, BackendError>;

  /// Apply `changes` to matching rows, returning the updated rows.
  async fn update(&self, table: &str, filters: &[Filter], changes: Value)
    -> Result<Value, BackendError>;

  /// Delete matching rows, returning them.
  async fn delete(&self, table: &str, filters: &[Filter]) -> Result<Value, BackendError>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_eq_filter() {
    assert_eq!(
      Filter::eq("is_default", true).to_query_pair(),
      ("is_default".to_string(), "eq.true".to_string())
    );
  }

  #[test]
  fn test_in_filter_quotes_reserved_values() {
    let filter = Filter::in_list("id", ["p1", "a,b", "say \"hi\""]);
    assert_eq!(
      filter.to_query_pair().1,
      r#"in.(p1,"a,b","say \"hi\"")"#
    );
  }
}
