use std::fmt;

use bytes::Bytes;
use imgwire_frame::SENTINEL_SHAPE;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{PeerError, Result};

/// Key whose presence marks a failure reply.
pub const ERROR_KEY: &str = "Error";
/// Key of the handshake acknowledgement.
pub const HELLO_KEY: &str = "Hello";

/// Structured result of one request: a JSON object.
///
/// Apart from [`ERROR_KEY`] the keys are an opaque payload defined by the
/// classifier and passed through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reply(Map<String, Value>);

impl Reply {
    pub fn new() -> Self {
        Self::default()
    }

    /// A failure reply carrying `diagnostic`.
    pub fn error(diagnostic: impl fmt::Display) -> Self {
        Self::new().with(ERROR_KEY, diagnostic.to_string())
    }

    /// The handshake acknowledgement `{"Hello": [1, 1, 3]}`.
    pub fn hello() -> Self {
        Self::new().with(HELLO_KEY, SENTINEL_SHAPE.to_vec())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_error(&self) -> bool {
        self.0.contains_key(ERROR_KEY)
    }

    /// The diagnostic of a failure reply.
    pub fn error_message(&self) -> Option<String> {
        self.0.get(ERROR_KEY).map(|value| match value {
            Value::String(message) => message.clone(),
            other => other.to_string(),
        })
    }

    pub fn is_hello(&self) -> bool {
        self.0.contains_key(HELLO_KEY)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Serialize as the single JSON part of a reply message, with the
    /// spaced separators of the frame headers.
    pub fn to_message(&self) -> Result<Vec<Bytes>> {
        Ok(vec![Bytes::from(imgwire_frame::to_wire_json(&self.0)?)])
    }

    /// Parse a reply message: exactly one part holding a JSON object.
    pub fn from_message(parts: &[Bytes]) -> Result<Self> {
        let [part] = parts else {
            return Err(PeerError::InvalidReply(format!(
                "expected 1 part, got {}",
                parts.len()
            )));
        };
        match serde_json::from_slice::<Value>(part)? {
            Value::Object(map) => Ok(Self(map)),
            other => Err(PeerError::InvalidReply(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl From<Map<String, Value>> for Reply {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.0) {
            Ok(json) => f.write_str(&json),
            Err(_) => f.write_str("{}"),
        }
    }
}

/// Human-readable description of an application fault.
///
/// Returned by a classifier that could not produce a result; the server
/// turns it into an `{"Error": ...}` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic(String);

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Diagnostic {}

impl From<String> for Diagnostic {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for Diagnostic {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

impl From<imgwire_frame::FrameError> for Diagnostic {
    fn from(err: imgwire_frame::FrameError) -> Self {
        Self(err.to_string())
    }
}

impl From<PeerError> for Diagnostic {
    fn from(err: PeerError) -> Self {
        Self(err.to_string())
    }
}
