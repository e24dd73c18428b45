//! Controller session: configuration, authentication, logging.
//!
//! A [`Session`] is created per module invocation and carries no state
//! across invocations. Construction parses the connection options, opens the
//! log sink, builds the HTTP client, and performs the token login — after
//! which every request carries the bearer token. The password and the token
//! live in [`Secret`] containers and redact themselves on every diagnostic
//! path.

use crate::endpoint::parse_controller_version;
use crate::error::{Error, Result};
use crate::logging::{FileLogSink, LogLevel, LogSink, NoopSink, DEFAULT_LOG_FILE};
use crate::schema::{ParamSpec, Schema};
use crate::secrets::Secret;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use indexmap::IndexMap;
use semver::Version;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Controller version assumed when the caller does not supply one.
pub const DEFAULT_CONTROLLER_VERSION: &str = "2.3.7";

/// Login endpoint; returns `{"Token": "..."}` for Basic credentials.
const AUTH_TOKEN_PATH: &str = "/dna/system/api/v1/auth/token";

/// Per-request deadline enforced by the HTTP client. Independent of the
/// task-polling deadline.
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Recognized connection options, parsed from validated input.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Controller hostname.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// URL scheme; `https` against real controllers.
    pub scheme: String,
    /// Login username.
    pub username: String,
    /// Login password; never logged.
    pub password: Secret,
    /// Certificate verification toggle.
    pub verify_tls: bool,
    /// Drives endpoint version selection.
    pub controller_version: String,
    /// Verbose request/response diagnostics.
    pub debug: bool,
    /// File logging toggle.
    pub log_enabled: bool,
    /// Minimum level written to the log file.
    pub log_level: LogLevel,
    /// Log file path; defaults to `controller.log` in the working directory.
    pub log_path: Option<PathBuf>,
    /// Append to an existing log file instead of overwriting once.
    pub log_append: bool,
    /// Upper bound for task polling.
    pub task_timeout_seconds: u64,
    /// Delay between task polls.
    pub task_poll_interval_seconds: u64,
    /// Validate server payloads against the declared response shape, and
    /// re-verify reconciled resources after mutation.
    pub validate_response_schema: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 443,
            scheme: "https".to_string(),
            username: "admin".to_string(),
            password: Secret::default(),
            verify_tls: true,
            controller_version: DEFAULT_CONTROLLER_VERSION.to_string(),
            debug: false,
            log_enabled: false,
            log_level: LogLevel::Warning,
            log_path: None,
            log_append: true,
            task_timeout_seconds: 1200,
            task_poll_interval_seconds: 2,
            validate_response_schema: true,
        }
    }
}

impl SessionConfig {
    /// The connection option schema merged into every module schema.
    pub fn base_schema() -> Schema {
        Schema::new()
            .with(ParamSpec::str("host").required().session_option())
            .with(
                ParamSpec::int("port")
                    .with_default(Value::from(443))
                    .session_option(),
            )
            .with(
                ParamSpec::str("scheme")
                    .with_choices([Value::from("https"), Value::from("http")])
                    .with_default(Value::from("https"))
                    .session_option(),
            )
            .with(
                ParamSpec::str("username")
                    .with_default(Value::from("admin"))
                    .session_option(),
            )
            .with(ParamSpec::str("password").no_log().session_option())
            .with(
                ParamSpec::bool("verify_tls")
                    .alias("validate_certs")
                    .with_default(Value::from(true))
                    .session_option(),
            )
            .with(
                ParamSpec::str("controller_version")
                    .with_default(Value::from(DEFAULT_CONTROLLER_VERSION))
                    .session_option(),
            )
            .with(
                ParamSpec::bool("debug")
                    .with_default(Value::from(false))
                    .session_option(),
            )
            .with(
                ParamSpec::bool("log_enabled")
                    .with_default(Value::from(false))
                    .session_option(),
            )
            .with(
                ParamSpec::str("log_level")
                    .with_choices(LogLevel::CHOICES.iter().map(|s| Value::from(*s)))
                    .with_default(Value::from("WARNING"))
                    .session_option(),
            )
            .with(ParamSpec::str("log_path").session_option())
            .with(
                ParamSpec::bool("log_append")
                    .with_default(Value::from(true))
                    .session_option(),
            )
            .with(
                ParamSpec::int("task_timeout_seconds")
                    .with_default(Value::from(1200))
                    .session_option(),
            )
            .with(
                ParamSpec::int("task_poll_interval_seconds")
                    .with_default(Value::from(2))
                    .session_option(),
            )
            .with(
                ParamSpec::bool("validate_response_schema")
                    .with_default(Value::from(true))
                    .session_option(),
            )
    }

    /// Build a config from the session-option slice of validated input.
    pub fn from_normalized(options: &IndexMap<String, Value>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(host) = options.get("host").and_then(Value::as_str) {
            config.host = host.to_string();
        }
        if let Some(port) = options.get("port").and_then(Value::as_i64) {
            config.port = u16::try_from(port).map_err(|_| Error::Type {
                breadcrumb: "port".to_string(),
                message: format!("{} is out of range for a TCP port", port),
            })?;
        }
        if let Some(scheme) = options.get("scheme").and_then(Value::as_str) {
            config.scheme = scheme.to_string();
        }
        if let Some(username) = options.get("username").and_then(Value::as_str) {
            config.username = username.to_string();
        }
        if let Some(password) = options.get("password").and_then(Value::as_str) {
            config.password = Secret::new(password);
        }
        if let Some(verify) = options.get("verify_tls").and_then(Value::as_bool) {
            config.verify_tls = verify;
        }
        if let Some(version) = options.get("controller_version").and_then(Value::as_str) {
            config.controller_version = version.to_string();
        }
        if let Some(debug) = options.get("debug").and_then(Value::as_bool) {
            config.debug = debug;
        }
        if let Some(enabled) = options.get("log_enabled").and_then(Value::as_bool) {
            config.log_enabled = enabled;
        }
        if let Some(level) = options.get("log_level").and_then(Value::as_str) {
            config.log_level = level.parse()?;
        }
        if let Some(path) = options.get("log_path").and_then(Value::as_str) {
            config.log_path = Some(PathBuf::from(path));
        }
        if let Some(append) = options.get("log_append").and_then(Value::as_bool) {
            config.log_append = append;
        }
        if let Some(timeout) = options.get("task_timeout_seconds").and_then(Value::as_i64) {
            config.task_timeout_seconds = timeout.max(0) as u64;
        }
        if let Some(interval) = options
            .get("task_poll_interval_seconds")
            .and_then(Value::as_i64)
        {
            config.task_poll_interval_seconds = interval.max(0) as u64;
        }
        if let Some(validate) = options
            .get("validate_response_schema")
            .and_then(Value::as_bool)
        {
            config.validate_response_schema = validate;
        }
        Ok(config)
    }

    /// Base URL of the controller.
    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&format!("{}://{}:{}", self.scheme, self.host, self.port)).map_err(|e| {
            Error::Type {
                breadcrumb: "host".to_string(),
                message: format!("cannot build controller URL: {}", e),
            }
        })
    }

    fn build_log_sink(&self) -> Result<Arc<dyn LogSink>> {
        if !self.log_enabled {
            return Ok(Arc::new(NoopSink));
        }
        let path = self
            .log_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));
        let sink = FileLogSink::open(&path, self.log_level, self.log_append)?;
        Ok(Arc::new(sink))
    }
}

/// An authenticated controller session.
pub struct Session {
    config: SessionConfig,
    http: reqwest::Client,
    base: Url,
    token: Secret,
    version: Version,
    log: Arc<dyn LogSink>,
}

impl Session {
    /// Build the HTTP client, open the log sink, and log in.
    ///
    /// The token obtained here is attached as a bearer header on every
    /// subsequent request.
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        let log = config.build_log_sink()?;
        let version = parse_controller_version(&config.controller_version)?;
        let base = config.base_url()?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| Error::Transport {
                attempts: 0,
                message: format!("cannot build HTTP client: {}", e),
            })?;

        let url = join_path(&base, AUTH_TOKEN_PATH)?;
        let credentials = BASE64.encode(format!(
            "{}:{}",
            config.username,
            config.password.expose()
        ));
        let response = http
            .post(url)
            .header(reqwest::header::AUTHORIZATION, format!("Basic {}", credentials))
            .send()
            .await
            .map_err(|e| Error::Transport {
                attempts: 1,
                message: format!("login failed: {}", e),
            })?;

        let status = response.status().as_u16();
        let raw = response.text().await.map_err(|e| Error::Transport {
            attempts: 1,
            message: format!("login response unreadable: {}", e),
        })?;
        if status >= 500 {
            return Err(Error::Server {
                status,
                attempts: 1,
                body: serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
            });
        }
        if status >= 400 {
            return Err(Error::Client {
                status,
                body: serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
            });
        }
        let body: Value = serde_json::from_str(&raw)
            .map_err(|e| Error::protocol(format!("login body is not JSON: {}", e), raw.clone()))?;
        let token = body
            .get("Token")
            .or_else(|| body.get("token"))
            .and_then(Value::as_str)
            .ok_or_else(|| Error::protocol("login response carries no token", raw))?;

        log.info(&format!(
            "session established with {} as {}",
            config.host, config.username
        ));

        Ok(Self {
            config,
            http,
            base,
            token: Secret::new(token),
            version,
            log,
        })
    }

    /// The parsed connection options.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The HTTP client shared by the pipeline.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Base URL of the controller.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// The bearer token obtained at login.
    pub fn token(&self) -> &Secret {
        &self.token
    }

    /// Controller version driving endpoint selection.
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// The session log sink.
    pub fn log(&self) -> &Arc<dyn LogSink> {
        &self.log
    }
}

/// Join a path (possibly absolute, possibly a full URL) onto the base.
pub fn join_path(base: &Url, path: &str) -> Result<Url> {
    if path.starts_with("http://") || path.starts_with("https://") {
        return Url::parse(path).map_err(|e| {
            Error::protocol(format!("invalid status URL '{}': {}", path, e), path.to_string())
        });
    }
    base.join(path).map_err(|e| {
        Error::protocol(format!("cannot join path '{}': {}", path, e), path.to_string())
    })
}
