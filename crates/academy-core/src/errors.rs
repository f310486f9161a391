use std::fmt;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::Role;

/// A single failed validation rule, addressed by a dotted/indexed field path
/// such as `subjects[1].total` or `entries[0].student_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every field error collected for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self(vec![FieldError::new(field, message)])
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError::new(field, message));
    }

    pub fn append(&mut self, other: FieldErrors) {
        self.0.extend(other.0);
    }

    /// Appends `other`, prefixing each path with `prefix` (e.g. `entries[2]`).
    pub fn extend_prefixed(&mut self, prefix: &str, other: FieldErrors) {
        self.0.extend(other.0.into_iter().map(|e| FieldError {
            field: format!("{}.{}", prefix, e.field),
            message: e.message,
        }));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    /// `Ok(())` when nothing was collected, otherwise a validation error.
    pub fn into_result(self) -> Result<(), AppError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        f.write_str(&joined)
    }
}

impl FromIterator<FieldError> for FieldErrors {
    fn from_iter<I: IntoIterator<Item = FieldError>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Discriminant of [`AppError`], cheap to copy into logs and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    Validation,
    CapacityExceeded,
    InvalidCapacity,
    BatchNotEmpty,
    InvalidStateTransition,
    Conflict,
    Forbidden,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::CapacityExceeded => "CAPACITY_EXCEEDED",
            ErrorKind::InvalidCapacity => "INVALID_CAPACITY",
            ErrorKind::BatchNotEmpty => "BATCH_NOT_EMPTY",
            ErrorKind::InvalidStateTransition => "INVALID_STATE_TRANSITION",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    #[error("batch {batch_id} is full ({current}/{max})")]
    CapacityExceeded { batch_id: Uuid, current: i64, max: i64 },

    #[error("capacity {requested} is below the {current} students enrolled in batch {batch_id}")]
    InvalidCapacity {
        batch_id: Uuid,
        requested: i64,
        current: i64,
    },

    #[error("batch {batch_id} still has {current} enrolled students")]
    BatchNotEmpty { batch_id: Uuid, current: i64 },

    #[error("{entity} {id} cannot move from {from} to {to}")]
    InvalidStateTransition {
        entity: &'static str,
        id: Uuid,
        from: String,
        to: String,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("role {role} lacks permission {permission}")]
    Forbidden {
        role: Role,
        permission: &'static str,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(FieldErrors::single(field, message))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn internal<E>(err: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self::Internal(err.into())
    }

    pub fn database<E>(err: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self::Internal(err.into().context("store operation failed"))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotFound { .. } => ErrorKind::NotFound,
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            AppError::InvalidCapacity { .. } => ErrorKind::InvalidCapacity,
            AppError::BatchNotEmpty { .. } => ErrorKind::BatchNotEmpty,
            AppError::InvalidStateTransition { .. } => ErrorKind::InvalidStateTransition,
            AppError::Conflict(_) => ErrorKind::Conflict,
            AppError::Forbidden { .. } => ErrorKind::Forbidden,
            AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Field errors carried by a validation failure, if any.
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            AppError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}
