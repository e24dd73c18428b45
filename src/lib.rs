//! # Netible - Declarative Automation for a Network Controller
//!
//! Netible exposes a network controller's REST API as declarative and
//! imperative automation modules. Each module validates an input record
//! against a declarative schema, calls one or more controller endpoints,
//! polls long-running tasks to completion, and returns a normalized result
//! envelope.
//!
//! ## Core Concepts
//!
//! - **Schemas**: ordered, typed parameter descriptions with sub-schemas,
//!   aliases, and wire names
//! - **Validation**: pure, structured, breadcrumbed; no I/O until input passes
//! - **Endpoint registry**: `(family, function)` resolved once per invocation
//!   into a typed descriptor, with version gates and deprecation aliases
//! - **Session**: per-invocation connection state; token login; secrets in a
//!   self-redacting container
//! - **Pipeline**: sequential dispatch with response classification and
//!   bounded retry
//! - **Task poller**: cancellable loop driving asynchronous operations to a
//!   terminal state
//! - **Reconciliation**: exists / create / update / delete with honest
//!   `changed` reporting
//! - **Envelope**: the single canonical return value of every invocation
//!
//! ## Invocation Flow
//!
//! ```text
//! runtime input
//!      │
//!      ▼
//! ┌────────────┐    ┌─────────────┐    ┌──────────────┐
//! │  Validator │───▶│   Session   │───▶│   Registry   │
//! │ (schema +  │    │ (login +    │    │ ((family,fn) │
//! │  coercion) │    │  log sink)  │    │  → endpoint) │
//! └────────────┘    └─────────────┘    └──────────────┘
//!                                             │
//!                                             ▼
//! ┌────────────┐    ┌─────────────┐    ┌──────────────┐
//! │  Envelope  │◀───│ Reconciler/ │◀───│   Pipeline   │
//! │            │    │ Task poller │    │ (dispatch +  │
//! │            │    │             │    │  retry)      │
//! └────────────┘    └─────────────┘    └──────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use netible::modules::{run_module, ModuleContext, ModuleRegistry};
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = ModuleRegistry::with_builtins();
//!     let module = registry.get("vlan").unwrap();
//!     let input = serde_json::json!({
//!         "host": "controller.example.com",
//!         "password": "secret",
//!         "name": "Lab",
//!         "vlan": 10,
//!         "state": "present",
//!     });
//!     let ctx = ModuleContext::new();
//!     let envelope = run_module(module.as_ref(), input.as_object().unwrap(), &ctx).await;
//!     println!("{}", serde_json::to_string_pretty(&envelope).unwrap());
//!     std::process::exit(envelope.exit_code());
//! }
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::catalog::builtin_registry;
    pub use crate::client::{ControllerResponse, Outcome, Pipeline, TaskHandle};
    pub use crate::endpoint::{EndpointRegistry, EndpointSpec, HttpMethod, TaskPolling};
    pub use crate::envelope::Envelope;
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::modules::{
        run_module, ControllerModule, ModuleContext, ModuleOutcome, ModuleRegistry,
    };
    pub use crate::reconcile::{reconcile, CrudResource, DesiredState};
    pub use crate::schema::validator::{validate, ValidationError};
    pub use crate::schema::{Constraints, ParamKind, ParamSpec, Schema};
    pub use crate::secrets::Secret;
    pub use crate::session::{Session, SessionConfig};
    pub use crate::task::{poll_task, PollSettings, TaskRecord};
}

// ============================================================================
// Core Modules
// ============================================================================

/// Error taxonomy and result aliases.
///
/// Every failure carries an [`ErrorKind`](error::ErrorKind) from a closed
/// taxonomy plus, for validation failures, a breadcrumb locating the
/// offending input.
pub mod error;

/// Secret containers for credentials.
pub mod secrets;

/// Declarative parameter schemas, validation, and wire-name translation.
pub mod schema;

// ============================================================================
// Controller Interface
// ============================================================================

/// Endpoint descriptors and the `(family, function)` registry.
pub mod endpoint;

/// The built-in endpoint catalog the registry is built from.
pub mod catalog;

/// Session configuration, authentication, and lifecycle.
pub mod session;

/// Session-scoped file logging.
pub mod logging;

/// Request pipeline: dispatch, classification, retry.
pub mod client;

/// Retry policy with exponential backoff and jitter.
pub mod retry;

/// Asynchronous task records and the polling loop.
pub mod task;

// ============================================================================
// Module Layer
// ============================================================================

/// Desired-vs-actual reconciliation for CRUD modules.
pub mod reconcile;

/// The result envelope returned to the runtime.
pub mod envelope;

/// Module trait, registry, built-in modules, and the invocation driver.
pub mod modules;

// ============================================================================
// Version Information
// ============================================================================

/// Returns the current version of netible.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
