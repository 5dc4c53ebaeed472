//! Conversions from external infrastructure errors into domain errors.

use outpost_domain::{EffectError, OutpostError};
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub OutpostError);

impl From<InfraError> for OutpostError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<OutpostError> for InfraError {
    fn from(value: OutpostError) -> Self {
        InfraError(value)
    }
}

trait IntoOutpostError {
    fn into_outpost(self) -> OutpostError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → OutpostError */
/* -------------------------------------------------------------------------- */

impl IntoOutpostError for SqlError {
    fn into_outpost(self) -> OutpostError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        OutpostError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        OutpostError::Database("database is locked".into())
                    }
                    (ErrorCode::NotADatabase, _) => OutpostError::Database(
                        "encryption key rejected or file is not a database".into(),
                    ),
                    (_, _) if looks_like_wrong_key(&message) => OutpostError::Database(
                        "encryption key rejected or file is not a database".into(),
                    ),
                    _ => OutpostError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::FromSqlConversionFailure(_, _, cause) => {
                OutpostError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                OutpostError::Database(format!("invalid column type: {ty}"))
            }
            RE::Utf8Error(_) => OutpostError::Database("invalid UTF-8 returned from sqlite".into()),
            RE::InvalidPath(path) => OutpostError::Database(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            other => OutpostError::Database(other.to_string()),
        }
    }
}

fn looks_like_wrong_key(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("not a database") || lower.contains("encrypted")
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_outpost())
    }
}

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        let message = value.to_string();
        if looks_like_wrong_key(&message) {
            return InfraError(OutpostError::Database(
                "encryption key rejected or file is not a database".into(),
            ));
        }
        InfraError(OutpostError::Database(format!("connection pool error: {message}")))
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → OutpostError / EffectError */
/* -------------------------------------------------------------------------- */

impl IntoOutpostError for HttpError {
    fn into_outpost(self) -> OutpostError {
        if self.is_timeout() {
            return OutpostError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return OutpostError::Network("HTTP connection failure".into());
        }

        if self.is_builder() {
            return OutpostError::InvalidInput(format!("invalid HTTP request: {self}"));
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                408 | 429 => OutpostError::Network(message),
                400..=499 => OutpostError::InvalidInput(message),
                _ => OutpostError::Network(message),
            };
        }

        OutpostError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_outpost())
    }
}

/// Classify a transport-level `reqwest` failure for the effect pipeline.
///
/// Builder and body-encoding failures can never succeed on retry, so they
/// become `Serialization`; everything else never reached the server.
pub(crate) fn effect_error_from_http(err: &HttpError) -> EffectError {
    if err.is_builder() || err.is_body() {
        return EffectError::serialization(err.to_string());
    }
    if err.is_timeout() {
        return EffectError::transport(format!("request timed out: {err}"));
    }
    if err.is_connect() {
        return EffectError::transport(format!("connection failed: {err}"));
    }
    EffectError::transport(err.to_string())
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
