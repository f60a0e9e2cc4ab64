//! Error taxonomy for remote calls and the retry classifier built on it.

use serde::Deserialize;
use std::fmt;

/// What went wrong on a remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
  /// The requested row or endpoint does not exist
  NotFound,
  /// Connectivity, timeouts, overloaded upstream
  NetworkOrTransient,
  /// Permission denied, expired or malformed session
  AuthorizationDenied,
  /// The backend rejected the query shape or returned something undecodable
  SchemaOrServerError,
  Unknown,
}

impl ErrorKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::NotFound => "not_found",
      Self::NetworkOrTransient => "network",
      Self::AuthorizationDenied => "authorization_denied",
      Self::SchemaOrServerError => "schema_or_server",
      Self::Unknown => "unknown",
    }
  }
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Whether a failure deserves another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
  Retryable,
  Terminal,
}

/// Errors that the retry executor knows how to classify.
pub trait Classify {
  fn class(&self) -> ErrorClass;
}

impl Classify for ErrorKind {
  fn class(&self) -> ErrorClass {
    match self {
      Self::AuthorizationDenied | Self::SchemaOrServerError | Self::NotFound => ErrorClass::Terminal,
      Self::NetworkOrTransient | Self::Unknown => ErrorClass::Retryable,
    }
  }
}

/// A classified failure from the remote data service.
///
/// Cloneable so that a single in-flight call can hand the same error to
/// every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}{}: {message}", code_suffix(.code))]
pub struct BackendError {
  pub kind: ErrorKind,
  /// Backend error code (Postgres SQLSTATE or PostgREST `PGRST*`), if any
  pub code: Option<String>,
  pub message: String,
}

fn code_suffix(code: &Option<String>) -> String {
  code.as_ref().map(|c| format!(" [{}]", c)).unwrap_or_default()
}

impl Classify for BackendError {
  fn class(&self) -> ErrorClass {
    self.kind.class()
  }
}

/// Error body returned by PostgREST.
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
  code: Option<String>,
  message: Option<String>,
  details: Option<String>,
}

impl BackendError {
  pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      code: None,
      message: message.into(),
    }
  }

  pub fn with_code(mut self, code: impl Into<String>) -> Self {
    self.code = Some(code.into());
    self
  }

  pub fn network(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::NetworkOrTransient, message)
  }

  pub fn not_found(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::NotFound, message)
  }

  pub fn decode(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::SchemaOrServerError, message)
  }

  /// Build an error from a backend error code alone, e.g. `{code: "42501"}`.
  pub fn from_code(code: &str, message: impl Into<String>) -> Self {
    Self::new(classify_code(code).unwrap_or(ErrorKind::Unknown), message).with_code(code)
  }

  /// Build an error from a non-success HTTP response.
  pub fn from_response(status: u16, body: &str) -> Self {
    let parsed: ApiErrorBody = serde_json::from_str(body).unwrap_or_default();

    let kind = parsed
      .code
      .as_deref()
      .and_then(classify_code)
      .unwrap_or_else(|| classify_status(status));

    let message = match (parsed.message, parsed.details) {
      (Some(m), Some(d)) => format!("{} ({})", m, d),
      (Some(m), None) => m,
      (None, _) if body.trim().is_empty() => format!("HTTP {}", status),
      (None, _) => format!("HTTP {}: {}", status, body.trim()),
    };

    Self {
      kind,
      code: parsed.code,
      message,
    }
  }

  pub fn is_not_found(&self) -> bool {
    self.kind == ErrorKind::NotFound
  }

  /// Message suitable for showing to the user.
  pub fn user_message(&self) -> &'static str {
    match self.kind {
      ErrorKind::NotFound => "We couldn't find what you were looking for.",
      ErrorKind::NetworkOrTransient => {
        "We couldn't reach the server. Check your connection and try again."
      }
      ErrorKind::AuthorizationDenied => "Your session has expired. Please sign in again.",
      ErrorKind::SchemaOrServerError => "Something went wrong on our side. Please try again later.",
      ErrorKind::Unknown => "Something went wrong. Please try again.",
    }
  }
}

impl From<reqwest::Error> for BackendError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_timeout() || e.is_connect() || e.is_request() {
      Self::network(e.to_string())
    } else if e.is_decode() {
      Self::decode(e.to_string())
    } else if let Some(status) = e.status() {
      Self::new(classify_status(status.as_u16()), e.to_string())
    } else {
      Self::new(ErrorKind::Unknown, e.to_string())
    }
  }
}

impl From<serde_json::Error> for BackendError {
  fn from(e: serde_json::Error) -> Self {
    Self::decode(format!("Failed to decode backend payload: {}", e))
  }
}

/// Map a Postgres SQLSTATE or PostgREST code to a kind.
///
/// Returns `None` for codes that carry no classification on their own.
pub fn classify_code(code: &str) -> Option<ErrorKind> {
  match code {
    // insufficient_privilege, invalid_authorization_specification
    "42501" | "28000" | "28P01" => Some(ErrorKind::AuthorizationDenied),
    // JWT missing, invalid or expired
    "PGRST300" | "PGRST301" | "PGRST302" | "PGRST303" => Some(ErrorKind::AuthorizationDenied),
    // No rows for a single-object request
    "PGRST116" => Some(ErrorKind::NotFound),
    // Connection to the database failed
    "PGRST000" | "PGRST001" | "PGRST002" | "PGRST003" => Some(ErrorKind::NetworkOrTransient),
    c if c.starts_with("PGRST1") || c.starts_with("PGRST2") => Some(ErrorKind::SchemaOrServerError),
    // undefined_table and friends
    "42P01" | "42703" | "42883" => Some(ErrorKind::SchemaOrServerError),
    // connection_exception, operator_intervention (e.g. admin shutdown)
    c if c.starts_with("08") || c.starts_with("57") => Some(ErrorKind::NetworkOrTransient),
    // syntax/access rule, data exception, integrity constraint
    c if c.starts_with("42") || c.starts_with("22") || c.starts_with("23") => {
      Some(ErrorKind::SchemaOrServerError)
    }
    _ => None,
  }
}

/// Map an HTTP status to a kind when no backend code is available.
pub fn classify_status(status: u16) -> ErrorKind {
  match status {
    401 | 403 => ErrorKind::AuthorizationDenied,
    404 | 406 => ErrorKind::NotFound,
    408 | 429 => ErrorKind::NetworkOrTransient,
    400 | 405 | 409 | 422 => ErrorKind::SchemaOrServerError,
    500..=599 => ErrorKind::NetworkOrTransient,
    _ => ErrorKind::Unknown,
  }
}
