//! Asynchronous task records and the polling loop.
//!
//! Endpoints that accept a request asynchronously return a task handle; the
//! poller drives the task to a terminal state. A task is terminal when the
//! server flags an error, sets an end time, reports a success sentinel in
//! `progress`, or reports an explicitly terminal `status`. The poller is a
//! plain function taking a cancellation token and a deadline — it owns no
//! state, observes the token at every boundary, and never issues a cleanup
//! call (the server owns the task).

use crate::client::{Pipeline, TaskHandle};
use crate::endpoint::{render_path, EndpointRegistry, EndpointSpec, TaskPolling};
use crate::error::{Error, Result};
use crate::retry;
use crate::session::SessionConfig;
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// `progress` strings treated as successful terminals, matched
/// case-insensitively as substrings. This is the consolidated sentinel
/// list; add here, not at call sites.
pub const SUCCESS_SENTINELS: &[&str] = &["success", "completed", "finished successfully"];

/// `status` values treated as failed terminals.
pub const FAILURE_STATUSES: &[&str] = &["failed", "failure", "error", "aborted"];

/// `status` values treated as successful terminals.
pub const SUCCESS_STATUSES: &[&str] = &["success", "completed"];

/// One observation of a server-side task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Opaque task identifier.
    #[serde(
        rename = "taskId",
        alias = "task_id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub task_id: Option<String>,

    /// Opaque status URL, when the server provides one.
    #[serde(
        rename = "statusUrl",
        alias = "status_url",
        alias = "url",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub status_url: Option<String>,

    /// Human-readable progress string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,

    /// Explicit task status, when the server enumerates one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Set when the task failed.
    #[serde(
        rename = "isError",
        alias = "is_error",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub is_error: Option<bool>,

    /// Server error code on failure.
    #[serde(
        rename = "errorCode",
        alias = "error_code",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub error_code: Option<String>,

    /// Server failure reason on failure.
    #[serde(
        rename = "failureReason",
        alias = "failure_reason",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub failure_reason: Option<String>,

    /// Epoch start time.
    #[serde(
        rename = "startTime",
        alias = "start_time",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub start_time: Option<i64>,

    /// Epoch end time; its presence marks the task terminal.
    #[serde(
        rename = "endTime",
        alias = "end_time",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub end_time: Option<i64>,

    /// Identifiers of the operations the task spawned.
    #[serde(
        rename = "operationIdList",
        alias = "operation_id_list",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub operation_id_list: Option<Value>,
}

impl TaskRecord {
    /// Parse a record from a poll response, unwrapping a `response` envelope
    /// when present.
    pub fn from_response(body: &Value) -> Result<Self> {
        let source = body.get("response").unwrap_or(body);
        serde_json::from_value(source.clone()).map_err(|e| {
            Error::protocol(
                format!("task record does not decode: {}", e),
                body.to_string(),
            )
        })
    }

    /// Whether the task reached a failed terminal state.
    pub fn is_failure(&self) -> bool {
        if self.is_error == Some(true) {
            return true;
        }
        match &self.status {
            Some(status) => {
                let status = status.to_lowercase();
                FAILURE_STATUSES.iter().any(|s| status == *s)
            }
            None => false,
        }
    }

    /// Whether the task reached any terminal state.
    pub fn is_terminal(&self) -> bool {
        if self.is_failure() || self.end_time.is_some() {
            return true;
        }
        if let Some(progress) = &self.progress {
            let progress = progress.to_lowercase();
            if SUCCESS_SENTINELS.iter().any(|s| progress.contains(s)) {
                return true;
            }
        }
        if let Some(status) = &self.status {
            let status = status.to_lowercase();
            if SUCCESS_STATUSES.iter().any(|s| status == *s) {
                return true;
            }
        }
        false
    }
}

/// Poller cadence and deadline.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    /// Delay between polls.
    pub interval: Duration,
    /// Deadline for reaching a terminal state.
    pub deadline: Duration,
}

impl PollSettings {
    /// Derive settings from the session configuration.
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.task_poll_interval_seconds),
            deadline: Duration::from_secs(config.task_timeout_seconds),
        }
    }
}

/// Compute the URL to poll for a task handle.
///
/// The originating descriptor tells the poller which style applies: the
/// `status_url` returned by the server, or the canonical task endpoint
/// rendered from `task_id`.
pub fn poll_url(
    spec: &EndpointSpec,
    handle: &TaskHandle,
    registry: &EndpointRegistry,
    version: &Version,
) -> Result<String> {
    match spec.task {
        TaskPolling::StatusUrl => handle.status_url.clone().ok_or_else(|| {
            Error::protocol(
                format!(
                    "accepting response of '{}.{}' carried no status URL",
                    spec.family, spec.function
                ),
                String::new(),
            )
        }),
        TaskPolling::ByTaskId => {
            let task_id = handle.task_id.clone().ok_or_else(|| {
                Error::protocol(
                    format!(
                        "accepting response of '{}.{}' carried no task id",
                        spec.family, spec.function
                    ),
                    String::new(),
                )
            })?;
            let task_spec = registry.resolve("task", "getTaskById", version)?.spec;
            let mut values = HashMap::new();
            values.insert("task_id", task_id);
            render_path(&task_spec.path, &values)
        }
        TaskPolling::None => Err(Error::schema_bug(format!(
            "endpoint '{}.{}' is not declared asynchronous",
            spec.family, spec.function
        ))),
    }
}

/// Drive a task to a terminal state.
///
/// Returns the terminal record, or `timeout` with the last observed record
/// when the deadline elapses first, or `cancelled` when the token fires. A
/// record observed terminal is returned immediately — the poller never polls
/// past a terminal observation, so the observed status sequence cannot
/// regress.
pub async fn poll_task(
    pipeline: &Pipeline<'_>,
    url: &str,
    settings: &PollSettings,
    cancel: &CancellationToken,
) -> Result<TaskRecord> {
    let start = Instant::now();
    let mut last: Option<TaskRecord> = None;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled {
                last: last.map(Box::new),
            });
        }
        if start.elapsed() >= settings.deadline {
            return Err(Error::Timeout {
                deadline_secs: settings.deadline.as_secs(),
                last: last.map(Box::new),
            });
        }

        let response = pipeline.get(url, cancel).await?;
        let record = TaskRecord::from_response(&response.body)?;
        last = Some(record.clone());

        if record.is_failure() {
            let reason = record
                .failure_reason
                .clone()
                .or_else(|| record.progress.clone())
                .unwrap_or_else(|| "task reported an error".to_string());
            return Err(Error::TaskFailed {
                reason,
                error_code: record.error_code.clone(),
                record: Box::new(record),
            });
        }
        if record.is_terminal() {
            return Ok(record);
        }

        if let Err(_cancelled) = retry::wait(settings.interval, cancel).await {
            return Err(Error::Cancelled {
                last: last.map(Box::new),
            });
        }
    }
}
