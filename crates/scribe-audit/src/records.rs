//! Builders for the caller-emitted operation records.
//!
//! Three of the four operation kinds are reported after the fact by the
//! code that performed them: model calls, retrievals, and outbound API
//! requests. (`workflow_step` entries come only from [`crate::StepSpan`].)
//! Each builder collects the operation-specific fields and hands the
//! finished map to a context, which stamps the envelope.

use serde_json::{Map, Value};

use scribe_core::entry::{field, Operation};

use crate::context::AuditContext;

/// One model invocation.
#[derive(Debug, Clone)]
pub struct LlmCall {
    model: String,
    latency_ms: f64,
    success: bool,
    tokens_estimate: Option<u64>,
    sub_operation: Option<String>,
    retries: Option<u32>,
    error: Option<String>,
    error_type: Option<String>,
    extra: Map<String, Value>,
}

impl LlmCall {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            latency_ms: 0.0,
            success: true,
            tokens_estimate: None,
            sub_operation: None,
            retries: None,
            error: None,
            error_type: None,
            extra: Map::new(),
        }
    }

    pub fn latency_ms(mut self, latency_ms: f64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn tokens_estimate(mut self, tokens: u64) -> Self {
        self.tokens_estimate = Some(tokens);
        self
    }

    /// Which stage of the workflow issued the call, e.g. `"summarize"`.
    pub fn sub_operation(mut self, sub_operation: impl Into<String>) -> Self {
        self.sub_operation = Some(sub_operation.into());
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Mark the call failed, recording the error text and its kind.
    pub fn failed(mut self, error: impl Into<String>, error_type: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self.error_type = Some(error_type.into());
        self
    }

    /// Attach a free-form extra field.
    pub fn extra(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extra.insert(name.into(), value);
        self
    }

    fn into_fields(self) -> Map<String, Value> {
        let mut fields = self.extra;
        fields.insert(field::MODEL.to_string(), Value::String(self.model));
        if let Some(tokens) = self.tokens_estimate {
            fields.insert(field::TOKENS_ESTIMATE.to_string(), Value::from(tokens));
        }
        if let Some(sub_operation) = self.sub_operation {
            fields.insert(
                field::SUB_OPERATION.to_string(),
                Value::String(sub_operation),
            );
        }
        if let Some(retries) = self.retries {
            fields.insert(field::RETRIES.to_string(), Value::from(retries));
        }
        if let Some(error) = self.error {
            fields.insert(field::ERROR.to_string(), Value::String(error));
        }
        if let Some(error_type) = self.error_type {
            fields.insert(field::ERROR_TYPE.to_string(), Value::String(error_type));
        }
        fields.insert(field::LATENCY_MS.to_string(), Value::from(self.latency_ms));
        fields.insert(field::SUCCESS.to_string(), Value::Bool(self.success));
        fields
    }

    /// Emit through an explicit context.
    pub fn emit(self, ctx: &AuditContext) {
        ctx.emit(Operation::LlmCall, self.into_fields());
    }

    /// Emit through [`AuditContext::current`].
    pub fn emit_current(self) {
        emit_with_current(Operation::LlmCall, self.into_fields());
    }
}

/// One retrieval against a document or memory store.
#[derive(Debug, Clone)]
pub struct Retrieval {
    n_results: u64,
    latency_ms: f64,
    success: bool,
    query_length: Option<u64>,
    strategy: Option<String>,
    cache_hit: bool,
    extra: Map<String, Value>,
}

impl Retrieval {
    pub fn new(n_results: u64) -> Self {
        Self {
            n_results,
            latency_ms: 0.0,
            success: true,
            query_length: None,
            strategy: None,
            cache_hit: false,
            extra: Map::new(),
        }
    }

    pub fn latency_ms(mut self, latency_ms: f64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Length of the query text in characters; the text itself is never
    /// recorded.
    pub fn query_length(mut self, query_length: u64) -> Self {
        self.query_length = Some(query_length);
        self
    }

    pub fn strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    pub fn cache_hit(mut self, cache_hit: bool) -> Self {
        self.cache_hit = cache_hit;
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    pub fn extra(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extra.insert(name.into(), value);
        self
    }

    fn into_fields(self) -> Map<String, Value> {
        let mut fields = self.extra;
        fields.insert(field::N_RESULTS.to_string(), Value::from(self.n_results));
        if let Some(query_length) = self.query_length {
            fields.insert(field::QUERY_LENGTH.to_string(), Value::from(query_length));
        }
        if let Some(strategy) = self.strategy {
            fields.insert(field::STRATEGY.to_string(), Value::String(strategy));
        }
        fields.insert(field::CACHE_HIT.to_string(), Value::Bool(self.cache_hit));
        fields.insert(field::LATENCY_MS.to_string(), Value::from(self.latency_ms));
        fields.insert(field::SUCCESS.to_string(), Value::Bool(self.success));
        fields
    }

    pub fn emit(self, ctx: &AuditContext) {
        ctx.emit(Operation::Retrieval, self.into_fields());
    }

    pub fn emit_current(self) {
        emit_with_current(Operation::Retrieval, self.into_fields());
    }
}

/// One outbound API request made on the workflow's behalf.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    endpoint: String,
    status_code: u16,
    latency_ms: f64,
    success: bool,
    extra: Map<String, Value>,
}

impl ApiRequest {
    /// `success` defaults to `true`; whether a given status counts as a
    /// failure is the caller's call, not inferred from the code.
    pub fn new(endpoint: impl Into<String>, status_code: u16) -> Self {
        Self {
            endpoint: endpoint.into(),
            status_code,
            latency_ms: 0.0,
            success: true,
            extra: Map::new(),
        }
    }

    pub fn latency_ms(mut self, latency_ms: f64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    pub fn extra(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extra.insert(name.into(), value);
        self
    }

    fn into_fields(self) -> Map<String, Value> {
        let mut fields = self.extra;
        fields.insert(field::ENDPOINT.to_string(), Value::String(self.endpoint));
        fields.insert(
            field::STATUS_CODE.to_string(),
            Value::from(self.status_code),
        );
        fields.insert(field::LATENCY_MS.to_string(), Value::from(self.latency_ms));
        fields.insert(field::SUCCESS.to_string(), Value::Bool(self.success));
        fields
    }

    pub fn emit(self, ctx: &AuditContext) {
        ctx.emit(Operation::ApiRequest, self.into_fields());
    }

    pub fn emit_current(self) {
        emit_with_current(Operation::ApiRequest, self.into_fields());
    }
}

/// Route a record through the ambient context. Without one the entry is
/// unattributable, so it is reported and dropped; in builds with debug
/// assertions this panics to make the missing context impossible to miss.
fn emit_with_current(operation: Operation, fields: Map<String, Value>) {
    match AuditContext::current() {
        Ok(ctx) => ctx.emit(operation, fields),
        Err(e) => {
            tracing::error!(
                target: "scribe_audit",
                operation = %operation,
                error = %e,
                "no active audit context; audit entry dropped"
            );
            debug_assert!(false, "emit_current() called outside an active audit context");
        }
    }
}
