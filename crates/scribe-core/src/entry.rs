//! Audit entry model.
//!
//! An [`AuditEntry`] is a flat JSON object: a small mandatory envelope
//! (correlation identifiers, operation kind, latency, outcome) plus whatever
//! operation-specific fields the emitter attached. Entries are carried as a
//! raw field map rather than a closed struct so that malformed records can
//! still be inspected, validated, and forwarded instead of being rejected at
//! the type boundary.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Wire names for the well-known entry fields.
pub mod field {
    pub const TRACE_ID: &str = "trace_id";
    pub const REQUEST_ID: &str = "request_id";
    pub const WORKFLOW_ID: &str = "workflow_id";
    pub const TENANT_ID: &str = "tenant_id";
    pub const OPERATION: &str = "operation";
    pub const LATENCY_MS: &str = "latency_ms";
    pub const SUCCESS: &str = "success";
    pub const TIMESTAMP: &str = "timestamp";

    pub const STEP_NAME: &str = "step_name";
    pub const OUTPUT_SUMMARY: &str = "output_summary";
    pub const ERROR: &str = "error";
    pub const ERROR_TYPE: &str = "error_type";

    pub const MODEL: &str = "model";
    pub const TOKENS_ESTIMATE: &str = "tokens_estimate";
    pub const SUB_OPERATION: &str = "sub_operation";
    pub const RETRIES: &str = "retries";

    pub const QUERY_LENGTH: &str = "query_length";
    pub const N_RESULTS: &str = "n_results";
    pub const STRATEGY: &str = "strategy";
    pub const CACHE_HIT: &str = "cache_hit";

    pub const ENDPOINT: &str = "endpoint";
    pub const STATUS_CODE: &str = "status_code";
}

/// The operation kinds an audit entry can describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    LlmCall,
    Retrieval,
    WorkflowStep,
    ApiRequest,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::LlmCall,
        Operation::Retrieval,
        Operation::WorkflowStep,
        Operation::ApiRequest,
    ];

    /// The wire name of the operation, as stored in the `operation` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::LlmCall => "llm_call",
            Operation::Retrieval => "retrieval",
            Operation::WorkflowStep => "workflow_step",
            Operation::ApiRequest => "api_request",
        }
    }

    /// Parse a wire name back into an operation kind.
    pub fn parse(name: &str) -> Option<Operation> {
        Operation::ALL.into_iter().find(|op| op.as_str() == name)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One audit record.
///
/// Serializes transparently as the underlying JSON object, so an entry and
/// its wire form are the same shape. Entries are assembled by the emitting
/// side and treated as immutable once handed to a sink.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditEntry {
    fields: Map<String, Value>,
}

impl AuditEntry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an already-assembled field map.
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Insert a field, returning the previous value if the name was taken.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.str_field(field::TRACE_ID)
    }

    pub fn request_id(&self) -> Option<&str> {
        self.str_field(field::REQUEST_ID)
    }

    pub fn workflow_id(&self) -> Option<&str> {
        self.str_field(field::WORKFLOW_ID)
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.str_field(field::TENANT_ID)
    }

    pub fn operation(&self) -> Option<&str> {
        self.str_field(field::OPERATION)
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.str_field(field::TIMESTAMP)
    }

    pub fn latency_ms(&self) -> Option<f64> {
        self.fields.get(field::LATENCY_MS).and_then(Value::as_f64)
    }

    pub fn success(&self) -> Option<bool> {
        self.fields.get(field::SUCCESS).and_then(Value::as_bool)
    }

    fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Render the entry as one compact JSON line, without the trailing
    /// newline. Compact serialization never emits raw newlines (they are
    /// escaped inside strings), which is what keeps the file format one
    /// entry per line.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Render the entry as indented JSON for human consumption.
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
