//! The `{success, error?}` shape returned across the transport boundary.
//!
//! Domain errors render as `{"code": ..., "message": ...}` bodies, as in
//! each failed item of a bulk grant. [`Outcome`] wraps a whole
//! [`WardenResult`] for a transport adapter; infrastructure errors are
//! never rendered and keep propagating.

use serde::{Deserialize, Serialize};

use crate::error::{WardenError, WardenResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ErrorBody {
    /// `None` for infrastructure errors, which are not rendered.
    pub fn from_error(err: &WardenError) -> Option<Self> {
        err.code().map(|code| ErrorBody {
            code: code.to_string(),
            message: err.to_string(),
        })
    }
}

/// A boundary response. `T` must serialize as a map; its fields are
/// flattened next to `success`.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome<T> {
    pub success: bool,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub payload: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> Outcome<T> {
    pub fn ok(payload: T) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn failed(error: ErrorBody) -> Self {
        Self {
            success: false,
            payload: None,
            error: Some(error),
        }
    }

    pub fn from_result(result: WardenResult<T>) -> WardenResult<Self> {
        match result {
            Ok(payload) => Ok(Self::ok(payload)),
            Err(err) => match ErrorBody::from_error(&err) {
                Some(body) => Ok(Self::failed(body)),
                None => Err(err),
            },
        }
    }
}
