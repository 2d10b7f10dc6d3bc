use serde::Serialize;
use thiserror::Error;

use super::model::IdentityKey;

/// Failures that abort a single engine call.
///
/// Row-level problems (bad keys, out-of-range scores, malformed holiday
/// dates) are not errors; they surface as [`Warning`]s next to the result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("unparseable date {0:?}, expected YYYY-MM-DD")]
    UnparseableDate(String),
    #[error("identity conflict on {key}: {message}")]
    IdentityConflict { key: IdentityKey, message: String },
    #[error("row index {index} out of range for {len} rows")]
    RowIndexOutOfRange { index: usize, len: usize },
    #[error("unknown field {field:?} for {kind} rows")]
    UnknownField { kind: &'static str, field: String },
    #[error("invalid value for {field:?}: {message}")]
    InvalidFieldValue { field: String, message: String },
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::IdentityConflict { .. } => "identity_conflict",
            EngineError::RowIndexOutOfRange { .. } => "not_found",
            EngineError::UnparseableDate(_)
            | EngineError::UnknownField { .. }
            | EngineError::InvalidFieldValue { .. } => "bad_params",
        }
    }

    pub(crate) fn invalid_value(field: &str, message: impl Into<String>) -> Self {
        EngineError::InvalidFieldValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WarningKind {
    Validation,
    CalendarInconsistency,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<IdentityKey>,
}

impl Warning {
    pub fn validation(message: impl Into<String>, key: Option<IdentityKey>) -> Self {
        Self {
            kind: WarningKind::Validation,
            message: message.into(),
            key,
        }
    }

    pub fn calendar(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::CalendarInconsistency,
            message: message.into(),
            key: None,
        }
    }
}
