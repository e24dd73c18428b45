//! Error types for netible.
//!
//! Every failure in the crate is classified by an [`ErrorKind`] drawn from a
//! closed taxonomy. Validation failures additionally carry a breadcrumb path
//! locating the offending input (e.g. `payload[2].interfaces[0].vlanId`), and
//! HTTP failures carry whatever payload the controller returned so the result
//! envelope can surface it.

use crate::task::TaskRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Result type alias for netible operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of every failure the crate can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Input value has the wrong type and could not be coerced.
    Type,
    /// Input value is not among the declared choices.
    Choice,
    /// A required parameter is absent.
    MissingRequired,
    /// Mutually exclusive or duplicated parameters were supplied together.
    Conflict,
    /// Input key matches no parameter name or alias.
    UnknownKey,
    /// The schema or endpoint table itself is inconsistent.
    SchemaBug,
    /// The endpoint requires a newer controller version.
    Version,
    /// The controller rejected the request (4xx).
    Client,
    /// The controller failed (5xx), retries exhausted.
    Server,
    /// The request never produced an HTTP response.
    Transport,
    /// The response body could not be decoded.
    Protocol,
    /// An asynchronous task reached a failed terminal state.
    TaskFailed,
    /// Task polling exceeded its deadline.
    Timeout,
    /// The invocation was cancelled by the runtime.
    Cancelled,
    /// A mutation was applied but the re-read state still differs.
    NotConverged,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Type => "type",
            ErrorKind::Choice => "choice",
            ErrorKind::MissingRequired => "missing_required",
            ErrorKind::Conflict => "conflict",
            ErrorKind::UnknownKey => "unknown_key",
            ErrorKind::SchemaBug => "schema_bug",
            ErrorKind::Version => "version",
            ErrorKind::Client => "client",
            ErrorKind::Server => "server",
            ErrorKind::Transport => "transport",
            ErrorKind::Protocol => "protocol",
            ErrorKind::TaskFailed => "task_failed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::NotConverged => "not_converged",
        };
        write!(f, "{}", s)
    }
}

/// The main error type for netible.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Validation Errors
    // ========================================================================
    /// Input value has the wrong type.
    #[error("invalid type for '{breadcrumb}': {message}")]
    Type {
        /// Breadcrumb path of the offending input
        breadcrumb: String,
        /// What was expected and what arrived
        message: String,
    },

    /// Input value is not among the declared choices.
    #[error("invalid value for '{breadcrumb}': {message}")]
    Choice {
        /// Breadcrumb path of the offending input
        breadcrumb: String,
        /// Offending value and the allowed set
        message: String,
    },

    /// A required parameter is absent.
    #[error("missing required parameter '{breadcrumb}'")]
    MissingRequired {
        /// Breadcrumb path of the missing parameter
        breadcrumb: String,
    },

    /// Conflicting parameters supplied together.
    #[error("conflicting parameters: {message}")]
    Conflict {
        /// Description of the conflicting set
        message: String,
    },

    /// Input key matches no parameter name or alias.
    #[error("unknown parameter '{breadcrumb}'")]
    UnknownKey {
        /// Breadcrumb path of the unrecognized key
        breadcrumb: String,
    },

    /// The schema or endpoint table is internally inconsistent.
    #[error("schema error: {message}")]
    SchemaBug {
        /// Description of the inconsistency
        message: String,
    },

    // ========================================================================
    // Registry Errors
    // ========================================================================
    /// The endpoint requires a newer controller version.
    #[error("endpoint '{family}.{function}' requires controller version {required}, session has {actual}")]
    Version {
        /// Endpoint family
        family: String,
        /// Endpoint function
        function: String,
        /// Minimum version required
        required: String,
        /// Version the session was configured with
        actual: String,
    },

    // ========================================================================
    // Request Pipeline Errors
    // ========================================================================
    /// The controller rejected the request (4xx).
    #[error("controller rejected request with status {status}")]
    Client {
        /// HTTP status code
        status: u16,
        /// Response body, verbatim
        body: Value,
    },

    /// The controller failed (5xx) and retries were exhausted.
    #[error("controller error {status} after {attempts} attempts")]
    Server {
        /// HTTP status code of the last attempt
        status: u16,
        /// Number of attempts issued
        attempts: u32,
        /// Response body of the last attempt
        body: Value,
    },

    /// The request never produced an HTTP response.
    #[error("transport failure after {attempts} attempts: {message}")]
    Transport {
        /// Number of attempts issued
        attempts: u32,
        /// Underlying transport error text
        message: String,
    },

    /// The response body could not be decoded.
    #[error("protocol error: {message}")]
    Protocol {
        /// What failed to decode
        message: String,
        /// Raw response bytes, preserved for diagnostics
        raw: String,
    },

    // ========================================================================
    // Task Poller Errors
    // ========================================================================
    /// An asynchronous task reached a failed terminal state.
    #[error("task failed: {reason}")]
    TaskFailed {
        /// The server's failure_reason, verbatim
        reason: String,
        /// The server's error_code, if any
        error_code: Option<String>,
        /// The terminal task record
        record: Box<TaskRecord>,
    },

    /// Task polling exceeded its deadline.
    #[error("task did not reach a terminal state within {deadline_secs} seconds")]
    Timeout {
        /// The configured deadline
        deadline_secs: u64,
        /// The last record observed before the deadline
        last: Option<Box<TaskRecord>>,
    },

    /// The invocation was cancelled by the runtime.
    #[error("operation cancelled")]
    Cancelled {
        /// The last task record observed, when cancellation hit the poller
        last: Option<Box<TaskRecord>>,
    },

    // ========================================================================
    // Reconciliation Errors
    // ========================================================================
    /// A mutation was applied but the re-read state still differs.
    #[error("resource did not converge after update: {message}")]
    NotConverged {
        /// Which fields still differ
        message: String,
    },
}

impl Error {
    /// Creates a type error.
    pub fn type_error(breadcrumb: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Type {
            breadcrumb: breadcrumb.into(),
            message: message.into(),
        }
    }

    /// Creates a schema_bug error.
    pub fn schema_bug(message: impl Into<String>) -> Self {
        Self::SchemaBug {
            message: message.into(),
        }
    }

    /// Creates a protocol error preserving the raw bytes.
    pub fn protocol(message: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            raw: raw.into(),
        }
    }

    /// The taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Type { .. } => ErrorKind::Type,
            Error::Choice { .. } => ErrorKind::Choice,
            Error::MissingRequired { .. } => ErrorKind::MissingRequired,
            Error::Conflict { .. } => ErrorKind::Conflict,
            Error::UnknownKey { .. } => ErrorKind::UnknownKey,
            Error::SchemaBug { .. } => ErrorKind::SchemaBug,
            Error::Version { .. } => ErrorKind::Version,
            Error::Client { .. } => ErrorKind::Client,
            Error::Server { .. } => ErrorKind::Server,
            Error::Transport { .. } => ErrorKind::Transport,
            Error::Protocol { .. } => ErrorKind::Protocol,
            Error::TaskFailed { .. } => ErrorKind::TaskFailed,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Cancelled { .. } => ErrorKind::Cancelled,
            Error::NotConverged { .. } => ErrorKind::NotConverged,
        }
    }

    /// The breadcrumb path of the offending input, when the error has one.
    pub fn breadcrumb(&self) -> Option<&str> {
        match self {
            Error::Type { breadcrumb, .. }
            | Error::Choice { breadcrumb, .. }
            | Error::MissingRequired { breadcrumb }
            | Error::UnknownKey { breadcrumb } => Some(breadcrumb),
            _ => None,
        }
    }

    /// Whether the request pipeline may retry after this error.
    ///
    /// Only server-side (5xx) and transport failures are transient; client
    /// errors and everything downstream of a decoded response are final.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Server { .. } | Error::Transport { .. })
    }

    /// Partial controller payload to surface in the result envelope.
    pub fn controller_payload(&self) -> Value {
        match self {
            Error::Client { body, .. } | Error::Server { body, .. } => body.clone(),
            Error::TaskFailed { record, .. } => {
                serde_json::json!({ "last_task": record })
            }
            Error::Timeout { last, .. } | Error::Cancelled { last } => match last {
                Some(record) => serde_json::json!({ "last_task": record }),
                None => Value::Null,
            },
            Error::Protocol { raw, .. } => Value::String(raw.clone()),
            _ => Value::Null,
        }
    }
}
