//! Conversions from external infrastructure errors into domain errors.

use r2d2::Error as PoolError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;
use tempo_domain::TempoError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub TempoError);

impl From<InfraError> for TempoError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<TempoError> for InfraError {
    fn from(value: TempoError) -> Self {
        InfraError(value)
    }
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → TempoError */
/* -------------------------------------------------------------------------- */

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        let mapped = match value {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        TempoError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        TempoError::Database("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, 2067) => {
                        TempoError::Database("unique constraint violation".into())
                    }
                    (ErrorCode::ConstraintViolation, 787) => {
                        TempoError::Database("foreign key constraint violation".into())
                    }
                    _ => TempoError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => TempoError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                TempoError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                TempoError::Database(format!("invalid column type: {ty}"))
            }
            RE::Utf8Error(_) => TempoError::Database("invalid UTF-8 returned from sqlite".into()),
            RE::InvalidParameterName(parameter_name) => {
                TempoError::Database(format!("invalid parameter name: {parameter_name}"))
            }
            RE::InvalidPath(path) => {
                TempoError::Database(format!("invalid database path: {}", path.to_string_lossy()))
            }
            RE::InvalidQuery => TempoError::Database("invalid SQL query".into()),
            other => TempoError::Database(other.to_string()),
        };

        InfraError(mapped)
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → TempoError */
/* -------------------------------------------------------------------------- */

impl From<PoolError> for InfraError {
    fn from(value: PoolError) -> Self {
        InfraError(TempoError::Database(format!("connection pool error: {value}")))
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → TempoError */
/* -------------------------------------------------------------------------- */

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        if value.is_timeout() {
            return InfraError(TempoError::Network("HTTP request timed out".into()));
        }

        if value.is_connect() {
            return InfraError(TempoError::Network("HTTP connection failure".into()));
        }

        if let Some(status) = value.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            let mapped = match code {
                401 | 403 => TempoError::Auth(message),
                404 => TempoError::NotFound(message),
                429 => TempoError::RateLimited(message),
                400..=499 => TempoError::InvalidInput(message),
                _ => TempoError::Network(message),
            };
            return InfraError(mapped);
        }

        InfraError(TempoError::Network(value.to_string()))
    }
}
