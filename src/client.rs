//! Request pipeline: build, dispatch, classify, retry.
//!
//! One pipeline call issues one logical request against a resolved endpoint
//! descriptor. Responses are classified into synchronous success, accepted
//! asynchronous task, client error, retryable server/transport error, or
//! protocol error. Requests within a module invocation are strictly
//! sequential; the pipeline never interleaves. Every retry backoff observes
//! the cancellation token, and a cancelled invocation never issues the next
//! request.

use crate::endpoint::{Bound, EndpointSpec};
use crate::error::{Error, Result};
use crate::retry::{self, RetryPolicy};
use crate::session::{join_path, Session};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

/// A decoded synchronous controller response.
#[derive(Debug, Clone)]
pub struct ControllerResponse {
    /// HTTP status of the final attempt.
    pub status: u16,
    /// Decoded JSON body; `Null` for empty bodies.
    pub body: Value,
}

impl ControllerResponse {
    /// The payload: controllers wrap results in a top-level `response` key;
    /// unwrap it when present.
    pub fn result(&self) -> &Value {
        self.body.get("response").unwrap_or(&self.body)
    }
}

/// Handle to a server-side asynchronous task.
#[derive(Debug, Clone, Default)]
pub struct TaskHandle {
    /// Opaque task identifier.
    pub task_id: Option<String>,
    /// Status URL to poll, when the controller returns one.
    pub status_url: Option<String>,
}

impl TaskHandle {
    /// Extract a task handle from an accepting response body.
    ///
    /// Accepts both flat bodies and bodies nested under `response`, in
    /// either naming convention.
    pub fn from_body(body: &Value) -> Option<Self> {
        let source = body.get("response").unwrap_or(body);
        let task_id = source
            .get("taskId")
            .or_else(|| source.get("task_id"))
            .and_then(Value::as_str)
            .map(String::from);
        let status_url = source
            .get("statusUrl")
            .or_else(|| source.get("status_url"))
            .or_else(|| source.get("url"))
            .and_then(Value::as_str)
            .map(String::from);
        if task_id.is_none() && status_url.is_none() {
            return None;
        }
        Some(Self {
            task_id,
            status_url,
        })
    }
}

/// Classified result of a dispatched request.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The operation completed synchronously.
    Complete(ControllerResponse),
    /// The controller accepted the request as an asynchronous task.
    Accepted(TaskHandle),
}

/// The per-invocation request pipeline.
pub struct Pipeline<'a> {
    session: &'a Session,
    retry: RetryPolicy,
    strict_shape: bool,
}

impl<'a> Pipeline<'a> {
    /// Build a pipeline over an authenticated session.
    pub fn new(session: &'a Session) -> Self {
        Self {
            session,
            retry: RetryPolicy::default(),
            strict_shape: false,
        }
    }

    /// Override the retry policy (tests use tight delays).
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Treat a response-shape mismatch as a protocol error instead of a
    /// warning.
    pub fn strict_response_shape(mut self, strict: bool) -> Self {
        self.strict_shape = strict;
        self
    }

    /// The session this pipeline dispatches through.
    pub fn session(&self) -> &Session {
        self.session
    }

    /// Dispatch a bound request against a resolved endpoint.
    pub async fn send(
        &self,
        spec: &EndpointSpec,
        bound: &Bound,
        warnings: &mut Vec<String>,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let mut url = join_path(self.session.base(), &bound.path)?;
        if !bound.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &bound.query {
                pairs.append_pair(key, value);
            }
        }
        if self.session.config().debug {
            let rendered_body = bound
                .body_logged
                .as_ref()
                .map(|b| Value::Object(b.clone()).to_string())
                .unwrap_or_default();
            self.session.log().debug(&format!(
                "{} {} {}",
                spec.method, url, rendered_body
            ));
        }

        let response = self
            .dispatch(spec.method.as_reqwest(), url, bound.body.as_ref(), cancel)
            .await?;

        // An accepting response carrying a task handle moves to the poller,
        // but only for endpoints declared asynchronous.
        if spec.task != crate::endpoint::TaskPolling::None {
            if let Some(handle) = TaskHandle::from_body(&response.body) {
                if self.session.config().debug {
                    self.session.log().debug(&format!(
                        "accepted as task {:?}",
                        handle.task_id.as_deref().or(handle.status_url.as_deref())
                    ));
                }
                return Ok(Outcome::Accepted(handle));
            }
        }

        self.check_shape(spec, &response, warnings)?;
        Ok(Outcome::Complete(response))
    }

    /// GET an arbitrary controller path. Used by the task poller, where the
    /// URL comes from a handle rather than a descriptor.
    pub async fn get(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<ControllerResponse> {
        let url = join_path(self.session.base(), path)?;
        self.dispatch(reqwest::Method::GET, url, None, cancel).await
    }

    /// Issue the request, retrying transient failures with backoff.
    async fn dispatch(
        &self,
        method: reqwest::Method,
        url: Url,
        body: Option<&Map<String, Value>>,
        cancel: &CancellationToken,
    ) -> Result<ControllerResponse> {
        let mut attempts = 0u32;
        loop {
            // Cancellation between requests guarantees the next is not issued.
            if cancel.is_cancelled() {
                return Err(Error::Cancelled { last: None });
            }
            attempts += 1;

            let mut request = self
                .session
                .http()
                .request(method.clone(), url.clone())
                .bearer_auth(self.session.token().expose());
            if let Some(map) = body {
                request = request.json(&Value::Object(map.clone()));
            }

            let error = match request.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    match response.text().await {
                        Ok(raw) => match self.classify(status, raw) {
                            Ok(done) => {
                                if self.session.config().debug {
                                    self.session
                                        .log()
                                        .debug(&format!("{} {} -> {}", method, url, status));
                                }
                                return Ok(done);
                            }
                            Err(e) => e,
                        },
                        Err(e) => Error::Transport {
                            attempts,
                            message: format!("response body unreadable: {}", e),
                        },
                    }
                }
                Err(e) => Error::Transport {
                    attempts,
                    message: e.to_string(),
                },
            };

            if !error.is_transient() || !self.retry.should_continue(attempts) {
                debug!(attempts, error = %error, "request failed");
                return Err(self.stamp_attempts(error, attempts));
            }
            let delay = self.retry.delay_for_attempt(attempts - 1);
            self.session.log().warning(&format!(
                "transient failure ({}), retrying in {:?}",
                error, delay
            ));
            retry::wait(delay, cancel).await?;
        }
    }

    /// Classify one HTTP exchange.
    fn classify(&self, status: u16, raw: String) -> Result<ControllerResponse> {
        let parse = |raw: &str| -> Value {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
        };
        if status >= 500 {
            return Err(Error::Server {
                status,
                attempts: 0,
                body: parse(&raw),
            });
        }
        if status >= 400 {
            // Client errors surface the body verbatim and are never retried.
            return Err(Error::Client {
                status,
                body: parse(&raw),
            });
        }
        let body = if raw.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&raw).map_err(|e| {
                Error::protocol(format!("response is not valid JSON: {}", e), raw.clone())
            })?
        };
        Ok(ControllerResponse { status, body })
    }

    /// Record the true attempt count on the surfaced error.
    fn stamp_attempts(&self, error: Error, attempts: u32) -> Error {
        match error {
            Error::Server { status, body, .. } => Error::Server {
                status,
                attempts,
                body,
            },
            Error::Transport { message, .. } => Error::Transport { attempts, message },
            other => other,
        }
    }

    /// Verify declared top-level keys when response validation is enabled.
    fn check_shape(
        &self,
        spec: &EndpointSpec,
        response: &ControllerResponse,
        warnings: &mut Vec<String>,
    ) -> Result<()> {
        if !self.session.config().validate_response_schema || spec.response_shape.is_empty() {
            return Ok(());
        }
        let missing: Vec<&str> = match response.body.as_object() {
            Some(object) => spec
                .response_shape
                .iter()
                .filter(|key| !object.contains_key(key.as_str()))
                .map(String::as_str)
                .collect(),
            None => spec.response_shape.iter().map(String::as_str).collect(),
        };
        if missing.is_empty() {
            return Ok(());
        }
        let message = format!(
            "response of '{}.{}' is missing expected keys: {}",
            spec.family,
            spec.function,
            missing.join(", ")
        );
        if self.strict_shape {
            return Err(Error::protocol(message, response.body.to_string()));
        }
        warnings.push(message);
        Ok(())
    }
}
