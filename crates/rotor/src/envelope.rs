//! Message envelope exchanged with executors
//!
//! Requests travel as `{ "runId"?: u64, "data": ... }`. Executors echo the run
//! id back when they want the reply correlated. Replies are resolved exactly
//! once at the boundary into a [`Reply`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Correlation token for a callback-bearing submission
///
/// Issued from 1 upwards; 0 is never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(u64);

impl RunId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Envelope posted to an executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "runId", default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,

    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Fire-and-forget envelope
    pub fn broadcast(data: Value) -> Self {
        Self { run_id: None, data }
    }

    /// Envelope carrying a run id
    pub fn correlated(run_id: RunId, data: Value) -> Self {
        Self {
            run_id: Some(run_id),
            data,
        }
    }

    /// Build the reply envelope for this request, echoing its run id
    pub fn reply(&self, data: Value) -> Self {
        Self {
            run_id: self.run_id,
            data,
        }
    }

    /// Wire form of this envelope
    pub fn into_value(self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

/// A reply from an executor, resolved once at the boundary
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Reply carrying a run id
    Correlated { run_id: RunId, data: Value },
    /// Reply without a run id
    Uncorrelated { data: Value },
}

impl Reply {
    /// Resolve a raw reply value
    ///
    /// The value must be an object; `runId` must be absent, null, or a
    /// non-negative integer; a missing `data` field reads as null.
    pub fn parse(raw: Value) -> Result<Self, MalformedReply> {
        let mut map = match raw {
            Value::Object(map) => map,
            other => return Err(MalformedReply::NotAnObject(kind(&other))),
        };

        let data = map.remove("data").unwrap_or(Value::Null);

        match map.remove("runId") {
            None | Some(Value::Null) => Ok(Self::Uncorrelated { data }),
            Some(Value::Number(n)) => match n.as_u64() {
                Some(id) => Ok(Self::Correlated {
                    run_id: RunId(id),
                    data,
                }),
                None => Err(MalformedReply::InvalidRunId(n.to_string())),
            },
            Some(other) => Err(MalformedReply::InvalidRunId(other.to_string())),
        }
    }

    pub fn run_id(&self) -> Option<RunId> {
        match self {
            Self::Correlated { run_id, .. } => Some(*run_id),
            Self::Uncorrelated { .. } => None,
        }
    }

    /// Strip the envelope
    pub fn into_data(self) -> Value {
        match self {
            Self::Correlated { data, .. } | Self::Uncorrelated { data } => data,
        }
    }
}

/// Reasons a reply cannot be resolved
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MalformedReply {
    #[error("reply is {0}, expected an object")]
    NotAnObject(&'static str),

    #[error("invalid runId: {0}")]
    InvalidRunId(String),
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
