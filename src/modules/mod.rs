//! Module system for netible.
//!
//! A module is one declarative unit of automation over the controller:
//! schema plus constraints plus an async `run`. The shared driver
//! [`run_module`] owns the invocation pipeline — start-up schema checks,
//! validation, session construction, execution, envelope shaping — so a
//! module only describes its parameters and its semantics. Validation
//! failures return before any network I/O.

pub mod device_info;
pub mod site;
pub mod vlan;

use crate::envelope::Envelope;
use crate::error::Result;
use crate::reconcile::ReconcileOutcome;
use crate::schema::validator::validate;
use crate::schema::{Constraints, Schema};
use crate::session::{Session, SessionConfig};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Per-invocation execution context.
pub struct ModuleContext {
    /// Check mode: compute decisions, never issue a mutating endpoint.
    pub check_mode: bool,
    /// Cooperative cancellation signal from the runtime.
    pub cancel: CancellationToken,
    warnings: Mutex<Vec<String>>,
}

impl ModuleContext {
    /// Context with check mode off and a fresh cancellation token.
    pub fn new() -> Self {
        Self {
            check_mode: false,
            cancel: CancellationToken::new(),
            warnings: Mutex::new(Vec::new()),
        }
    }

    /// Enable or disable check mode.
    pub fn with_check_mode(mut self, check_mode: bool) -> Self {
        self.check_mode = check_mode;
        self
    }

    /// Use the runtime's cancellation token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Record a warning for the envelope. Duplicates collapse, which makes
    /// deprecation diagnostics one-shot per invocation.
    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        let mut warnings = self.warnings.lock();
        if !warnings.contains(&message) {
            warnings.push(message);
        }
    }

    /// Drain accumulated warnings.
    pub fn take_warnings(&self) -> Vec<String> {
        std::mem::take(&mut *self.warnings.lock())
    }
}

impl Default for ModuleContext {
    fn default() -> Self {
        Self::new()
    }
}

/// What a module's `run` produced, before envelope shaping.
#[derive(Debug, Clone)]
pub struct ModuleOutcome {
    /// Whether a mutating endpoint returned success.
    pub changed: bool,
    /// Raw payload of the primary call.
    pub response: Value,
    /// Human-readable account.
    pub diagnostics: String,
}

impl From<ReconcileOutcome> for ModuleOutcome {
    fn from(outcome: ReconcileOutcome) -> Self {
        Self {
            changed: outcome.changed,
            response: outcome.response,
            diagnostics: outcome.diagnostics,
        }
    }
}

/// Trait implemented by every controller module.
#[async_trait]
pub trait ControllerModule: Send + Sync {
    /// Module name, as invoked by the runtime.
    fn name(&self) -> &'static str;

    /// One-line description.
    fn description(&self) -> &'static str;

    /// The module's own parameter schema, without session options.
    fn schema(&self) -> Schema;

    /// Conditional constraints over the schema.
    fn constraints(&self) -> Constraints {
        Constraints::new()
    }

    /// Execute against an authenticated session.
    ///
    /// `params` is the validated, normalized module slice of the input —
    /// session options are already stripped.
    async fn run(
        &self,
        params: &IndexMap<String, Value>,
        session: &Session,
        ctx: &ModuleContext,
    ) -> Result<ModuleOutcome>;
}

/// Registry for looking up modules by name.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: IndexMap<String, Arc<dyn ControllerModule>>,
}

impl ModuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with all built-in modules.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(vlan::VlanModule));
        registry.register(Arc::new(site::SiteModule));
        registry.register(Arc::new(device_info::DeviceInfoModule));
        registry
    }

    /// Register a module.
    pub fn register(&mut self, module: Arc<dyn ControllerModule>) {
        self.modules.insert(module.name().to_string(), module);
    }

    /// Get a module by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ControllerModule>> {
        self.modules.get(name).cloned()
    }

    /// All registered module names.
    pub fn names(&self) -> Vec<&str> {
        self.modules.keys().map(String::as_str).collect()
    }
}

/// Drive one module invocation end to end and shape the envelope.
///
/// Order: merge the session base schema, verify schema and constraints
/// (start-up checks), validate input, build the session, run the module.
/// Any validation failure aborts before the first network call.
pub async fn run_module(
    module: &dyn ControllerModule,
    input: &Map<String, Value>,
    ctx: &ModuleContext,
) -> Envelope {
    let schema = match module.schema().merged(&SessionConfig::base_schema()) {
        Ok(schema) => schema,
        Err(e) => return Envelope::from_error(&e),
    };
    if let Err(e) = schema.verify_aliases() {
        return Envelope::from_error(&e);
    }
    let constraints = module.constraints();
    if let Err(e) = constraints.verify(&schema) {
        return Envelope::from_error(&e);
    }

    let normalized = match validate(&schema, &constraints, input) {
        Ok(normalized) => normalized,
        Err(errors) => return Envelope::from_validation(&errors),
    };
    let (params, options) = schema.split_session_options(&normalized);

    let config = match SessionConfig::from_normalized(&options) {
        Ok(config) => config,
        Err(e) => return Envelope::from_error(&e),
    };
    let session = match Session::connect(config).await {
        Ok(session) => session,
        Err(e) => return Envelope::from_error(&e),
    };

    debug!(module = module.name(), check_mode = ctx.check_mode, "running module");
    match module.run(&params, &session, ctx).await {
        Ok(outcome) => {
            session.log().info(&format!(
                "{}: {} (changed={})",
                module.name(),
                outcome.diagnostics,
                outcome.changed
            ));
            let envelope = if outcome.changed {
                Envelope::changed(outcome.response, outcome.diagnostics)
            } else {
                Envelope::ok(outcome.response, outcome.diagnostics)
            };
            envelope.with_warnings(ctx.take_warnings())
        }
        Err(e) => {
            session
                .log()
                .error(&format!("{}: {}", module.name(), e));
            Envelope::from_error(&e).with_warnings(ctx.take_warnings())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_lists_modules() {
        let registry = ModuleRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["vlan", "site", "device_info"]);
        assert!(registry.get("vlan").is_some());
        assert!(registry.get("bogus").is_none());
    }

    #[test]
    fn warnings_are_one_shot() {
        let ctx = ModuleContext::new();
        ctx.warn("endpoint function 'network.getVlanByNameV1' is deprecated");
        ctx.warn("endpoint function 'network.getVlanByNameV1' is deprecated");
        ctx.warn("another notice");
        assert_eq!(ctx.take_warnings().len(), 2);
    }

    #[test]
    fn builtin_module_schemas_pass_startup_checks() {
        let registry = ModuleRegistry::with_builtins();
        for name in registry.names() {
            let module = registry.get(name).unwrap();
            let schema = module
                .schema()
                .merged(&SessionConfig::base_schema())
                .unwrap();
            schema.verify_aliases().unwrap();
            module.constraints().verify(&schema).unwrap();
        }
    }
}
