//! Wire protocol shared by the HTTP and WebSocket transports
//!
//! Every client request (HTTP body or WebSocket text frame) becomes an
//! [`ActionInvocation`]. Every server reply or push is a JSON object with a
//! `type` discriminator, modelled by [`ServerFrame`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Field name → JSON value mapping (state snapshots, action payloads)
pub type Fields = Map<String, Value>;

// ============================================================================
// Requests
// ============================================================================

/// One request to run a named action: `{action, ...params}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionInvocation {
    /// Action name
    pub action: String,

    /// All other keys of the request object
    #[serde(flatten)]
    pub params: Fields,
}

impl ActionInvocation {
    /// Create an invocation without parameters
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            params: Fields::new(),
        }
    }

    /// Builder-style parameter insertion
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Merge a request body with an action name taken from elsewhere (the URL
    /// path). The explicit name wins over an `action` key inside the body.
    pub fn from_parts(action: impl Into<String>, mut body: Fields) -> Self {
        body.remove("action");
        Self {
            action: action.into(),
            params: body,
        }
    }

    /// Parse a WebSocket text frame. The frame must be a JSON object carrying
    /// a string `action`.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::InvalidMessage(e.to_string()))
    }

    /// Look up a parameter by name
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// Flatten back into a single JSON object
    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::with_capacity(self.params.len() + 1);
        fields.insert("action".to_string(), Value::String(self.action.clone()));
        for (key, value) in &self.params {
            fields.insert(key.clone(), value.clone());
        }
        fields
    }
}

/// Outcome of running a registered action handler
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Fields>,
}

impl ActionResult {
    /// Successful result with a response body
    pub fn ok(response: Fields) -> Self {
        Self {
            success: true,
            response: Some(response),
        }
    }

    /// Successful result with nothing to report
    pub fn done() -> Self {
        Self {
            success: true,
            response: None,
        }
    }

    /// Failed result (validation or handler failure)
    pub fn failed() -> Self {
        Self::default()
    }
}

// ============================================================================
// Replies and pushes
// ============================================================================

/// Server → client message, discriminated by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    /// Action accepted. `payload` is flattened next to `action`
    /// (echoed parameters, or `data` for engine-delegated actions).
    Ok {
        action: String,
        #[serde(flatten)]
        payload: Fields,
    },

    /// Request rejected
    Error { error: String },

    /// State change pushed to a subscriber
    Update {
        all: bool,
        #[serde(flatten)]
        change: UpdateChange,
    },

    /// Subscription replaced
    Subscribed { fields: Vec<String>, all: bool },

    /// Subscription cleared
    Unsubscribed,
}

/// Body of an `update` frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UpdateChange {
    /// One field changed (field-level subscribers)
    Field { field: String, value: Value },

    /// Entire current state (`all` subscribers)
    Snapshot { fields: Fields },
}

impl ServerFrame {
    pub fn ok(action: impl Into<String>, payload: Fields) -> Self {
        Self::Ok {
            action: action.into(),
            payload,
        }
    }

    /// Reply for an action answered by the player engine
    pub fn ok_with_data(action: impl Into<String>, data: Value) -> Self {
        let mut payload = Fields::new();
        payload.insert("data".to_string(), data);
        Self::ok(action, payload)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    pub fn field_update(field: impl Into<String>, value: Value) -> Self {
        Self::Update {
            all: false,
            change: UpdateChange::Field {
                field: field.into(),
                value,
            },
        }
    }

    pub fn snapshot_update(fields: Fields) -> Self {
        Self::Update {
            all: true,
            change: UpdateChange::Snapshot { fields },
        }
    }

    /// Encode as a single-line JSON text frame
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Encode as a JSON value
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

// ============================================================================
// JSON helpers
// ============================================================================

/// Encode a float as a JSON number, using the integer form when the value is
/// integral (so `42.0` is sent as `42`). Non-finite values become `null`.
pub fn json_number(value: f64) -> Value {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// Loose truthiness of a JSON value: `null`, `false`, `0` and `""` are false,
/// everything else is true. A missing value is false.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map_or(false, |f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}
