use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Patterns (lowercase) that indicate sensitive data not safe for UI display.
/// Used by `contains_sensitive()` for case-insensitive matching.
pub(crate) const SENSITIVE_PATTERNS: &[&str] = &[
    "bearer ",
    "access_token",
    "authorization:",
    "password=",
    "postgres://",
    "postgresql://",
];

/// Returns true if the message contains any sensitive pattern (case-insensitive).
fn contains_sensitive(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Sanitizes a message for display.
/// If sensitive content is detected, returns the fallback instead.
fn sanitize_message(msg: &str, fallback: &str) -> String {
    if contains_sensitive(msg) {
        fallback.into()
    } else {
        msg.to_string()
    }
}

/// User-friendly error presentation for API clients.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPresentation {
    pub title: String,
    pub message: String,
    pub action: Option<String>,
}

/// Application-wide error type.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Configuration ─────────────────────────────────────────────────────────
    #[error("Configuration error: {0}")]
    Config(String),

    // ── Input ─────────────────────────────────────────────────────────────────
    #[error("Invalid table name '{0}': expected exactly one '.' as in schema.table")]
    InvalidTableName(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ── Auth ──────────────────────────────────────────────────────────────────
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Session expired")]
    SessionExpired,

    // ── API ───────────────────────────────────────────────────────────────────
    #[error("Salesforce error: {0}")]
    SalesforceError(String),

    #[error("Rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    // ── Bulk Operations ───────────────────────────────────────────────────────
    #[error("Bulk job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    #[error("Bulk job {job_id} did not finish within {waited_secs} seconds")]
    Timeout { job_id: String, waited_secs: u64 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Not found: {0}")]
    NotFound(String),

    // ── Source Database ───────────────────────────────────────────────────────
    #[error("Source database error: {0}")]
    SourceDatabase(String),

    #[error("Column '{column}' could not be encoded as text: {message}")]
    Encoding { column: String, message: String },

    // ── CSV ───────────────────────────────────────────────────────────────────
    #[error("Invalid CSV: {0}")]
    CsvInvalid(String),

    // ── Network ───────────────────────────────────────────────────────────────
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    // ── Generic fallback ──────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Converts the error into a user-friendly presentation suitable for display.
    /// Never leaks secrets, tokens, or connection strings.
    pub fn to_presentation(&self) -> ErrorPresentation {
        match self {
            // ── Configuration ─────────────────────────────────────────────────
            AppError::Config(msg) => ErrorPresentation {
                title: "Configuration Error".into(),
                message: sanitize_message(msg, "The service is not configured correctly."),
                action: Some("Fix the configuration and restart".into()),
            },

            // ── Input ─────────────────────────────────────────────────────────
            AppError::InvalidTableName(name) => ErrorPresentation {
                title: "Invalid Table Name".into(),
                message: format!(
                    "'{}' is not a qualified table name. Use the form schema.table.",
                    name
                ),
                action: Some("Pick a table from the table list".into()),
            },

            AppError::InvalidInput(msg) => ErrorPresentation {
                title: "Invalid Request".into(),
                message: sanitize_message(msg, "The request is invalid."),
                action: None,
            },

            // ── Auth ──────────────────────────────────────────────────────────
            AppError::NotAuthenticated => ErrorPresentation {
                title: "Not Logged In".into(),
                message: "A Salesforce session is required for this operation.".into(),
                action: Some("Log in to Salesforce".into()),
            },

            AppError::SessionExpired => ErrorPresentation {
                title: "Session Expired".into(),
                message: "Your Salesforce session has expired.".into(),
                action: Some("Log in again".into()),
            },

            // ── API ───────────────────────────────────────────────────────────
            AppError::SalesforceError(msg) => ErrorPresentation {
                title: "Salesforce Error".into(),
                message: sanitize_message(msg, "A Salesforce error occurred."),
                action: None,
            },

            AppError::RateLimited { retry_after_secs } => {
                let wait_msg = match retry_after_secs {
                    Some(secs) => format!("Please wait {} seconds before trying again.", secs),
                    None => "Please wait a moment before trying again.".into(),
                };
                ErrorPresentation {
                    title: "Too Many Requests".into(),
                    message: format!("Salesforce is limiting requests. {}", wait_msg),
                    action: Some("Wait and retry".into()),
                }
            }

            // ── Bulk Operations ───────────────────────────────────────────────
            AppError::JobFailed { job_id: _, message } => ErrorPresentation {
                title: "Bulk Job Failed".into(),
                message: sanitize_message(message, "The bulk operation failed."),
                action: Some("Review the error and try again".into()),
            },

            AppError::Timeout { waited_secs, .. } => ErrorPresentation {
                title: "Upload Timed Out".into(),
                message: format!(
                    "Salesforce did not finish processing the upload within {} seconds.",
                    waited_secs
                ),
                action: Some("Check the job in Salesforce Setup and retry".into()),
            },

            AppError::Cancelled => ErrorPresentation {
                title: "Cancelled".into(),
                message: "The operation was cancelled.".into(),
                action: None,
            },

            AppError::NotFound(msg) => ErrorPresentation {
                title: "Not Found".into(),
                message: sanitize_message(msg, "The requested item was not found."),
                action: None,
            },

            // ── Source Database ───────────────────────────────────────────────
            AppError::SourceDatabase(msg) => ErrorPresentation {
                title: "Database Error".into(),
                message: sanitize_message(msg, "The source database reported an error."),
                action: Some("Check the connection string and table and retry".into()),
            },

            AppError::Encoding { column, message } => ErrorPresentation {
                title: "Encoding Error".into(),
                message: format!("A value in column '{}' is not valid text: {}", column, message),
                action: Some("Exclude or convert the column before uploading".into()),
            },

            // ── CSV ───────────────────────────────────────────────────────────
            AppError::CsvInvalid(msg) => ErrorPresentation {
                title: "Invalid CSV".into(),
                message: format!("CSV data has a formatting problem: {}", msg),
                action: None,
            },

            // ── Network ───────────────────────────────────────────────────────
            AppError::ConnectionFailed(_) => ErrorPresentation {
                title: "Connection Failed".into(),
                message: "Could not reach a remote service. Please check the network.".into(),
                action: Some("Check network and retry".into()),
            },

            // ── Generic ───────────────────────────────────────────────────────
            AppError::Internal(_) => ErrorPresentation {
                title: "Unexpected Error".into(),
                message: "Something went wrong. Please try again.".into(),
                action: Some("Try again".into()),
            },
        }
    }

    /// Human-readable description stored as a failed task's result.
    ///
    /// Falls back to the presentation message when the full text would
    /// expose sensitive content.
    pub fn describe(&self) -> String {
        let full = self.to_string();
        let presentation = self.to_presentation();
        sanitize_message(&full, &presentation.message)
    }

    /// HTTP status used when the error is returned from an API handler.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidTableName(_) | AppError::InvalidInput(_) | AppError::CsvInvalid(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotAuthenticated | AppError::SessionExpired => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Cancelled => StatusCode::CONFLICT,
            AppError::SalesforceError(_)
            | AppError::JobFailed { .. }
            | AppError::SourceDatabase(_)
            | AppError::ConnectionFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::Config(_) | AppError::Encoding { .. } | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_presentation().serialize(serializer)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.to_presentation())).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(e) => AppError::ConnectionFailed(format!("Source database: {e}")),
            sqlx::Error::Tls(e) => AppError::ConnectionFailed(format!("Source database TLS: {e}")),
            sqlx::Error::PoolTimedOut => {
                AppError::ConnectionFailed("Source database connection timed out".to_string())
            }
            sqlx::Error::Configuration(e) => {
                AppError::InvalidInput(format!("Invalid connection string: {e}"))
            }
            other => AppError::SourceDatabase(other.to_string()),
        }
    }
}
