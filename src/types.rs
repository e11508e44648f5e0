//! Core identifier and value types shared across the crate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Call ID type - the stable identifier the telephony provider assigns to
/// one continuous call.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct CallId(pub String);

impl CallId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a unique id, for tests and locally originated calls.
    pub fn generate() -> Self {
        Self(format!("call-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CallId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CallId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Machine ID type - names a registered state machine definition.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct MachineId(pub String);

impl MachineId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for MachineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MachineId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MachineId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// State name type - identifies one state within a machine.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct StateName(pub String);

impl StateName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StateName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StateName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for StateName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Call status as reported by the provider on each request.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    Queued,
    Ringing,
    InProgress,
    Completed,
    Busy,
    Failed,
    NoAnswer,
    Canceled,
}

impl CallStatus {
    /// True when the provider has ended the call and no further requests
    /// for this call id will carry the same conversation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallStatus::Completed
                | CallStatus::Busy
                | CallStatus::Failed
                | CallStatus::NoAnswer
                | CallStatus::Canceled
        )
    }
}

/// One inbound request from the telephony provider.
///
/// Anything beyond the call id and status (digits pressed, recording URLs,
/// caller number) is carried as opaque string fields and only interpreted
/// by application transition rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallInput {
    pub call_id: CallId,
    pub call_status: CallStatus,
    #[serde(flatten)]
    pub fields: HashMap<String, String>,
}

impl CallInput {
    pub fn new(call_id: impl Into<CallId>, call_status: CallStatus) -> Self {
        Self {
            call_id: call_id.into(),
            call_status,
            fields: HashMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(|s| s.as_str())
    }
}

/// Accumulated per-call context, threaded through every resolver and
/// transition rule for the life of a call.
pub type Options = HashMap<String, serde_json::Value>;

/// Merge two option maps; keys in `overlay` win on conflict.
pub fn merge_options(base: &Options, overlay: &Options) -> Options {
    let mut merged = base.clone();
    merged.extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Build an options map from key/value pairs.
pub fn options_from<K, V, I>(entries: I) -> Options
where
    K: Into<String>,
    V: Into<serde_json::Value>,
    I: IntoIterator<Item = (K, V)>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// An immutable snapshot of where a call is in its flow, plus the rendered
/// instruction the transport writes back to the provider.
///
/// A transition always produces a new `State`; nothing mutates one in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct State {
    pub machine: MachineId,
    pub name: StateName,
    pub options: Options,
    rendered: String,
}

impl State {
    // Only the rule engine constructs states, so `rendered` is always the
    // output of the markup collaborator.
    pub(crate) fn new(
        machine: MachineId,
        name: StateName,
        options: Options,
        rendered: String,
    ) -> Self {
        Self {
            machine,
            name,
            options,
            rendered,
        }
    }

    /// The opaque markup produced by the rendering collaborator.
    pub fn rendered(&self) -> &str {
        &self.rendered
    }
}
