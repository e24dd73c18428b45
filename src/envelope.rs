//! The canonical result envelope.
//!
//! Every module invocation terminates by producing exactly one [`Envelope`].
//! On failure, `controller_response` still carries whatever partial payload
//! was retrieved, `msg` names the taxonomy kind plus the breadcrumb of the
//! offending input, and the controller's own message rides along verbatim.
//! Exit codes map 1:1 to `failed`.

use crate::error::{Error, ErrorKind};
use crate::schema::validator::ValidationError;
use serde::Serialize;
use serde_json::Value;

/// Canonical success/failure envelope returned to the runtime.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    /// Whether a state-mutating endpoint returned success.
    pub changed: bool,
    /// Whether the invocation failed.
    pub failed: bool,
    /// Raw server payload for the primary call; partial on failure.
    pub controller_response: Value,
    /// Human-readable account of what happened.
    pub diagnostics: String,
    /// Failure summary naming the taxonomy kind; absent on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    /// Deprecation and response-shape notices accumulated during the run.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Envelope {
    /// Success without changes.
    pub fn ok(controller_response: Value, diagnostics: impl Into<String>) -> Self {
        Self {
            changed: false,
            failed: false,
            controller_response,
            diagnostics: diagnostics.into(),
            msg: None,
            warnings: Vec::new(),
        }
    }

    /// Success with a state change.
    pub fn changed(controller_response: Value, diagnostics: impl Into<String>) -> Self {
        Self {
            changed: true,
            ..Self::ok(controller_response, diagnostics)
        }
    }

    /// Failure from a pipeline, poller, or reconciliation error.
    pub fn from_error(error: &Error) -> Self {
        let kind = error.kind();
        let diagnostics = if kind == ErrorKind::Cancelled {
            // Cancellation is reported as cancelled, not as a failure.
            "operation cancelled before completion".to_string()
        } else {
            "module invocation aborted".to_string()
        };
        Self {
            changed: false,
            failed: true,
            controller_response: error.controller_payload(),
            diagnostics,
            msg: Some(format!("kind={}: {}", kind, error)),
            warnings: Vec::new(),
        }
    }

    /// Failure from validation; no network call was issued.
    pub fn from_validation(errors: &[ValidationError]) -> Self {
        let first = errors.first();
        let msg = first.map(|e| format!("kind={}: {}", e.kind, e)).unwrap_or_else(|| {
            "kind=schema_bug: validation failed with no recorded error".to_string()
        });
        let diagnostics = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Self {
            changed: false,
            failed: true,
            controller_response: Value::Null,
            diagnostics,
            msg: Some(msg),
            warnings: Vec::new(),
        }
    }

    /// Attach accumulated warnings.
    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    /// Process exit code: 0 unless failed.
    pub fn exit_code(&self) -> i32 {
        i32::from(self.failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_and_change_shapes() {
        let ok = Envelope::ok(json!({"id": "X"}), "no changes needed");
        assert!(!ok.changed);
        assert!(!ok.failed);
        assert_eq!(ok.exit_code(), 0);

        let changed = Envelope::changed(json!({"id": "X"}), "created");
        assert!(changed.changed);
        assert!(!changed.failed);
    }

    #[test]
    fn error_envelope_names_kind() {
        let error = Error::Client {
            status: 400,
            body: json!({"detail": "bad request"}),
        };
        let envelope = Envelope::from_error(&error);
        assert!(envelope.failed);
        assert!(!envelope.changed);
        assert_eq!(envelope.exit_code(), 1);
        assert!(envelope.msg.as_deref().unwrap().starts_with("kind=client"));
        assert_eq!(envelope.controller_response, json!({"detail": "bad request"}));
    }

    #[test]
    fn validation_envelope_carries_breadcrumb() {
        let errors = vec![ValidationError {
            kind: ErrorKind::Type,
            breadcrumb: "vlan".to_string(),
            message: "expected integer, got 'abc'".to_string(),
        }];
        let envelope = Envelope::from_validation(&errors);
        assert!(envelope.failed);
        let msg = envelope.msg.unwrap();
        assert!(msg.contains("kind=type"));
        assert!(msg.contains("'vlan'"));
    }

    #[test]
    fn cancelled_diagnostics_are_neutral() {
        let envelope = Envelope::from_error(&Error::Cancelled { last: None });
        assert!(envelope.diagnostics.contains("cancelled"));
        assert!(!envelope.diagnostics.contains("fail"));
    }

    #[test]
    fn warnings_serialize_only_when_present() {
        let bare = serde_json::to_value(Envelope::ok(Value::Null, "done")).unwrap();
        assert!(bare.get("warnings").is_none());

        let with = serde_json::to_value(
            Envelope::ok(Value::Null, "done").with_warnings(vec!["deprecated".to_string()]),
        )
        .unwrap();
        assert_eq!(with["warnings"], json!(["deprecated"]));
    }
}
