//! In-memory backend for tests.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::error::BackendError;

use super::{Backend, Filter, FilterOp};

#[derive(Default)]
pub struct MockBackend {
  tables: Mutex<HashMap<String, Vec<Value>>>,
  procedures: Mutex<HashMap<String, Value>>,
  /// Outcomes of the next calls against a target, in order; `None` lets a call through
  failures: Mutex<HashMap<String, VecDeque<Option<BackendError>>>>,
  calls: Mutex<Vec<String>>,
}

impl MockBackend {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_rows(self, table: &str, rows: Vec<Value>) -> Self {
    self.tables.lock().unwrap().insert(table.to_string(), rows);
    self
  }

  pub fn with_procedure(self, function: &str, result: Value) -> Self {
    self
      .procedures
      .lock()
      .unwrap()
      .insert(function.to_string(), result);
    self
  }

  /// Fail the next `times` calls against `target`.
  ///
  /// `target` is a table or procedure name, or `"<op>:<target>"` to fail
  /// only one kind of call.
  pub fn fail(&self, target: &str, error: BackendError, times: usize) {
    let mut failures = self.failures.lock().unwrap();
    let queue = failures.entry(target.to_string()).or_default();
    for _ in 0..times {
      queue.push_back(Some(error.clone()));
    }
  }

  /// Let `skip` calls against `target` through, then fail the next one.
  pub fn fail_after(&self, target: &str, skip: usize, error: BackendError) {
    let mut failures = self.failures.lock().unwrap();
    let queue = failures.entry(target.to_string()).or_default();
    queue.extend(std::iter::repeat(None).take(skip));
    queue.push_back(Some(error));
  }

  /// Calls made so far, as `"<op>:<target>"`.
  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }

  pub fn call_count(&self, call: &str) -> usize {
    self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
  }

  pub fn rows(&self, table: &str) -> Vec<Value> {
    self
      .tables
      .lock()
      .unwrap()
      .get(table)
      .cloned()
      .unwrap_or_default()
  }

  fn record(&self, op: &str, target: &str) -> Result<(), BackendError> {
    self.calls.lock().unwrap().push(format!("{}:{}", op, target));

    let call = format!("{}:{}", op, target);
    let mut failures = self.failures.lock().unwrap();
    let scoped = failures.get_mut(&call).and_then(VecDeque::pop_front);
    let outcome = match scoped {
      Some(outcome) => outcome,
      None => failures.get_mut(target).and_then(VecDeque::pop_front).flatten(),
    };
    match outcome {
      Some(error) => Err(error),
      None => Ok(()),
    }
  }
}

fn render(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

fn matches(row: &Value, filters: &[Filter]) -> bool {
  filters.iter().all(|filter| {
    let cell = row.get(&filter.column).map(render);
    match (&filter.op, cell) {
      (FilterOp::Eq(expected), Some(actual)) => *expected == actual,
      (FilterOp::In(values), Some(actual)) => values.contains(&actual),
      (_, None) => false,
    }
  })
}

#[async_trait]
impl Backend for MockBackend {
  async fn select(&self, table: &str, filters: &[Filter]) -> Result<Value, BackendError> {
    self.record("select", table)?;
    let rows = self.rows(table);
    Ok(Value::Array(
      rows.into_iter().filter(|r| matches(r, filters)).collect(),
    ))
  }

  async fn rpc(&self, function: &str, _args: Value) -> Result<Value, BackendError> {
    self.record("rpc", function)?;
    self
      .procedures
      .lock()
      .unwrap()
      .get(function)
      .cloned()
      .ok_or_else(|| BackendError::not_found(format!("No procedure {}", function)))
  }

  async fn insert(&self, table: &str, row: Value) -> Result<Value, BackendError> {
    self.record("insert", table)?;
    let mut tables = self.tables.lock().unwrap();
    let rows = tables.entry(table.to_string()).or_default();

    let mut row = row;
    if let Value::Object(fields) = &mut row {
      if !fields.contains_key("id") {
        fields.insert("id".into(), Value::String(format!("{}-{}", table, rows.len() + 1)));
      }
    }
    rows.push(row.clone());
    Ok(Value::Array(vec![row]))
  }

  async fn update(
    &self,
    table: &str,
    filters: &[Filter],
    changes: Value,
  ) -> Result<Value, BackendError> {
    self.record("update", table)?;
    let changes = match changes {
      Value::Object(fields) => fields,
      _ => Map::new(),
    };

    let mut tables = self.tables.lock().unwrap();
    let mut updated = Vec::new();
    for row in tables.entry(table.to_string()).or_default().iter_mut() {
      if matches(row, filters) {
        if let Value::Object(fields) = row {
          for (k, v) in &changes {
            fields.insert(k.clone(), v.clone());
          }
        }
        updated.push(row.clone());
      }
    }
    Ok(Value::Array(updated))
  }

  async fn delete(&self, table: &str, filters: &[Filter]) -> Result<Value, BackendError> {
    self.record("delete", table)?;
    let mut tables = self.tables.lock().unwrap();
    let rows = tables.entry(table.to_string()).or_default();
    let (deleted, kept): (Vec<Value>, Vec<Value>) =
      rows.drain(..).partition(|r| matches(r, filters));
    *rows = kept;
    Ok(Value::Array(deleted))
  }
}
