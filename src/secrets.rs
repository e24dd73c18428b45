//! Secret handling for credentials.
//!
//! Passwords and bearer tokens live in a [`Secret`] container whose `Display`,
//! `Debug`, and `Serialize` implementations all redact. The value only leaves
//! the container through an explicit [`Secret::expose`] call at the point it
//! is written onto the wire.

use std::fmt;

/// A string wrapper that prevents the value from being logged.
///
/// When used in format strings, logging, or serialization this type renders
/// as `[REDACTED]` instead of the actual value. Use `expose()` to access the
/// underlying value when building a request.
#[derive(Clone, Default)]
pub struct Secret {
    value: String,
}

impl Secret {
    /// Create a new secret.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Expose the underlying value.
    ///
    /// Call this only at the point the value is attached to a request; never
    /// feed the result into a log line or an envelope.
    pub fn expose(&self) -> &str {
        &self.value
    }

    /// Consume and return the underlying value.
    pub fn into_inner(self) -> String {
        self.value
    }

    /// Check if the value is empty.
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

// Display shows redacted value
impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

// Debug shows redacted value
impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

// No Deref to String - force use of expose()

impl From<String> for Secret {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Secret {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for Secret {}

// Serializes as [REDACTED] so a secret can never leak through an envelope
impl serde::Serialize for Secret {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> serde::Deserialize<'de> for Secret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(Self::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_redacts() {
        let secret = Secret::new("hunter2");
        assert_eq!(format!("{}", secret), "[REDACTED]");
    }

    #[test]
    fn debug_redacts() {
        let secret = Secret::new("hunter2");
        assert!(!format!("{:?}", secret).contains("hunter2"));
    }

    #[test]
    fn expose_returns_value() {
        let secret = Secret::new("hunter2");
        assert_eq!(secret.expose(), "hunter2");
        assert_eq!(secret.into_inner(), "hunter2");
    }

    #[test]
    fn serializes_as_redacted() {
        let secret = Secret::new("hunter2");
        let json = serde_json::to_string(&secret).unwrap();
        assert_eq!(json, "\"[REDACTED]\"");
    }

    #[test]
    fn deserializes_plain_string() {
        let secret: Secret = serde_json::from_str("\"hunter2\"").unwrap();
        assert_eq!(secret.expose(), "hunter2");
    }
}
