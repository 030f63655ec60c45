//! Error types for `kar-core`.

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid financial profile: {0}")]
  Validation(ValidationErrors),

  #[error("session not found: {0}")]
  SessionNotFound(Uuid),

  #[error("data integrity violation: {0}")]
  DataIntegrity(String),

  #[error("no tax rules for financial year {0:?}")]
  UnsupportedFinancialYear(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ─── Validation ──────────────────────────────────────────────────────────────

/// One rejected input field, reported inline next to the offending input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
  pub field:   &'static str,
  pub message: String,
}

/// Every field that failed validation, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
  pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
    self.0.push(FieldError { field, message: message.into() });
  }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn fields(&self) -> &[FieldError] { &self.0 }

  /// `Ok(())` when nothing was recorded, otherwise [`Error::Validation`].
  pub fn into_result(self) -> Result<()> {
    if self.0.is_empty() { Ok(()) } else { Err(Error::Validation(self)) }
  }
}

impl fmt::Display for ValidationErrors {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut first = true;
    for e in &self.0 {
      if !first {
        f.write_str("; ")?;
      }
      write!(f, "{}: {}", e.field, e.message)?;
      first = false;
    }
    Ok(())
  }
}

// ─── Classification ──────────────────────────────────────────────────────────

/// Coarse error categories that outer layers map onto user-facing responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
  Validation,
  NotFound,
  Integrity,
  Upstream,
  Internal,
}

/// Implemented by every backend error so the HTTP layer can classify failures
/// without depending on a concrete store.
pub trait Classify {
  fn class(&self) -> ErrorClass;

  /// Field-level detail, present only for validation failures.
  fn validation(&self) -> Option<&ValidationErrors> { None }
}

impl Classify for Error {
  fn class(&self) -> ErrorClass {
    match self {
      Self::Validation(_) | Self::UnsupportedFinancialYear(_) => {
        ErrorClass::Validation
      }
      Self::SessionNotFound(_) => ErrorClass::NotFound,
      Self::DataIntegrity(_) => ErrorClass::Integrity,
      Self::Serialization(_) => ErrorClass::Internal,
    }
  }

  fn validation(&self) -> Option<&ValidationErrors> {
    match self {
      Self::Validation(v) => Some(v),
      _ => None,
    }
  }
}
