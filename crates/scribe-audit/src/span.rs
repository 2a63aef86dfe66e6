//! Workflow step spans.
//!
//! A [`StepSpan`] measures one logical stage of a workflow and emits exactly
//! one `workflow_step` entry when it ends, no matter how it ends: explicit
//! completion, an early return, a panic, or a dropped future all converge on
//! the same emission path. The `Drop` implementation is the backstop, which
//! is why sinks are synchronous.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Number, Value};

use scribe_core::entry::{field, Operation};

use crate::context::AuditContext;

/// An in-progress workflow step tied to an [`AuditContext`].
///
/// Created through [`AuditContext::step`]. Dropping the span emits the
/// entry; [`StepSpan::complete`] and [`StepSpan::fail`] set the outcome
/// explicitly, while a plain drop records success unless the thread is
/// unwinding. Use [`StepSpan::run`] or [`StepSpan::run_async`] to derive
/// the outcome from a `Result` instead of calling those by hand.
pub struct StepSpan {
    ctx: Arc<AuditContext>,
    step_name: String,
    started: Instant,
    metadata: Option<Map<String, Value>>,
    output_summary: Option<String>,
    outcome: Option<bool>,
    error: Option<String>,
    fail_on_drop: bool,
    emitted: bool,
}

impl StepSpan {
    /// Start a span now. Prefer [`AuditContext::step`].
    pub fn start(ctx: Arc<AuditContext>, step_name: impl Into<String>) -> Self {
        Self {
            ctx,
            step_name: step_name.into(),
            started: Instant::now(),
            metadata: None,
            output_summary: None,
            outcome: None,
            error: None,
            fail_on_drop: false,
            emitted: false,
        }
    }

    pub fn step_name(&self) -> &str {
        &self.step_name
    }

    /// Attach step metadata, flattened into the emitted entry. A second
    /// call replaces the first.
    pub fn set_metadata(&mut self, metadata: Map<String, Value>) {
        self.metadata = Some(metadata);
    }

    /// Attach a short human-readable description of what the step produced.
    pub fn set_output_summary(&mut self, summary: impl Into<String>) {
        self.output_summary = Some(summary.into());
    }

    /// End the span as successful and emit.
    pub fn complete(mut self) {
        self.outcome = Some(true);
        self.finish();
    }

    /// End the span as failed and emit.
    pub fn fail(mut self) {
        self.outcome = Some(false);
        self.finish();
    }

    /// End the span as failed, recording the error text.
    pub fn fail_with(mut self, error: impl Into<String>) {
        self.outcome = Some(false);
        self.error = Some(error.into());
        self.finish();
    }

    /// Run a closure and derive the outcome from its `Result`. The closure
    /// can decorate the span through the borrow it receives.
    pub fn run<T, E, F>(mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut StepSpan) -> Result<T, E>,
        E: fmt::Display,
    {
        self.fail_on_drop = true;
        let result = f(&mut self);
        match &result {
            Ok(_) => self.complete(),
            Err(e) => self.fail_with(e.to_string()),
        }
        result
    }

    /// Drive a future and derive the outcome from its `Result`.
    ///
    /// The returned future owns the span, so cancellation (the future being
    /// dropped before completion, as `tokio` does on task abort) emits a
    /// failed step rather than losing it.
    pub fn run_async<T, E, F>(mut self, fut: F) -> impl Future<Output = Result<T, E>>
    where
        F: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        // Armed before the future first polls: a span that went through
        // here and then got dropped did not finish its work.
        self.fail_on_drop = true;
        async move {
            let result = fut.await;
            match &result {
                Ok(_) => self.complete(),
                Err(e) => self.fail_with(e.to_string()),
            }
            result
        }
    }

    fn finish(&mut self) {
        if self.emitted {
            return;
        }
        self.emitted = true;

        let success = match self.outcome {
            Some(explicit) => explicit,
            None => !self.fail_on_drop && !std::thread::panicking(),
        };
        let latency_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let latency = Number::from_f64(latency_ms).unwrap_or_else(|| Number::from(0u32));

        // Metadata first, step fields afterwards, so metadata keys cannot
        // shadow the measured values.
        let mut fields = self.metadata.take().unwrap_or_default();
        fields.insert(
            field::STEP_NAME.to_string(),
            Value::String(self.step_name.clone()),
        );
        if let Some(summary) = self.output_summary.take() {
            fields.insert(field::OUTPUT_SUMMARY.to_string(), Value::String(summary));
        }
        if let Some(error) = self.error.take() {
            fields.insert(field::ERROR.to_string(), Value::String(error));
        }
        fields.insert(field::LATENCY_MS.to_string(), Value::Number(latency));
        fields.insert(field::SUCCESS.to_string(), Value::Bool(success));

        self.ctx.emit(Operation::WorkflowStep, fields);
    }
}

impl Drop for StepSpan {
    fn drop(&mut self) {
        self.finish();
    }
}

impl fmt::Debug for StepSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepSpan")
            .field("step_name", &self.step_name)
            .field("outcome", &self.outcome)
            .field("emitted", &self.emitted)
            .finish_non_exhaustive()
    }
}
