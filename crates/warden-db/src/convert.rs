//! Helpers for turning stored strings back into domain types.

use std::str::FromStr;

use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;
use warden_core::error::WardenError;

use crate::error::DbError;

pub(crate) fn parse_uuid(entity: &'static str, value: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(value).map_err(|e| DbError::Decode {
        entity,
        message: format!("invalid UUID {value:?}: {e}"),
    })
}

pub(crate) fn parse_opt_uuid(
    entity: &'static str,
    value: Option<&str>,
) -> Result<Option<Uuid>, DbError> {
    value.map(|v| parse_uuid(entity, v)).transpose()
}

/// Parse a stored enum discriminant (`'pending'`, `'user'`, ...).
pub(crate) fn parse_enum<T>(entity: &'static str, value: &str) -> Result<T, DbError>
where
    T: FromStr<Err = WardenError>,
{
    value.parse().map_err(|e: WardenError| DbError::Decode {
        entity,
        message: e.to_string(),
    })
}

/// Opaque JSON columns are stored as serialized strings.
pub(crate) fn encode_json<T: Serialize>(
    entity: &'static str,
    value: &T,
) -> Result<String, DbError> {
    serde_json::to_string(value).map_err(|e| DbError::Decode {
        entity,
        message: format!("cannot encode JSON column: {e}"),
    })
}

pub(crate) fn decode_json<T: DeserializeOwned>(
    entity: &'static str,
    value: &str,
) -> Result<T, DbError> {
    serde_json::from_str(value).map_err(|e| DbError::Decode {
        entity,
        message: format!("cannot decode JSON column: {e}"),
    })
}

pub(crate) fn encode_opt_json(
    entity: &'static str,
    value: Option<&serde_json::Value>,
) -> Result<Option<String>, DbError> {
    value.map(|v| encode_json(entity, v)).transpose()
}

pub(crate) fn decode_opt_json(
    entity: &'static str,
    value: Option<&str>,
) -> Result<Option<serde_json::Value>, DbError> {
    value.map(|v| decode_json(entity, v)).transpose()
}
