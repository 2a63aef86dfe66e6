//! Audit context: the identity of one logical request.
//!
//! An [`AuditContext`] carries the correlation identifiers that tie a
//! request's audit entries together and a handle to the sink they are
//! written to. Contexts are cheap `Arc` handles; passing the handle around
//! is always sufficient and always correct. For code that cannot thread a
//! handle through, two ambient mechanisms exist:
//!
//! * [`AuditContext::scope`] pins the context to a future, following it
//!   across `.await` points and into whatever task runs it;
//! * [`AuditContext::enter`] pushes the context onto a thread-local stack
//!   for synchronous call trees, popped when the returned guard drops.
//!
//! [`AuditContext::current`] consults the task-local slot first, then the
//! thread's stack. A guard is deliberately `!Send`: holding one across an
//! `.await` would leave the context on whichever worker thread happened to
//! run the future, so async code uses `scope` instead.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use scribe_core::entry::{field, AuditEntry, Operation};
use scribe_core::validator::validate;

use crate::error::AuditError;
use crate::sink::{default_sink, AuditSink};
use crate::span::StepSpan;

tokio::task_local! {
    static ACTIVE_TASK: Arc<AuditContext>;
}

thread_local! {
    static ACTIVE_THREAD: RefCell<Vec<Arc<AuditContext>>> = const { RefCell::new(Vec::new()) };
}

/// Correlation identity for one logical request, bound to a sink.
///
/// Every entry emitted through a context inherits its `trace_id`,
/// `request_id`, `workflow_id`, and optional `tenant_id`. The sink is
/// captured when the context is built, so swapping the process-wide
/// default sink never redirects a request that is already in flight.
pub struct AuditContext {
    trace_id: String,
    request_id: String,
    workflow_id: String,
    tenant_id: Option<String>,
    sink: Arc<dyn AuditSink>,
}

/// Builder for [`AuditContext`].
pub struct AuditContextBuilder {
    workflow_id: String,
    tenant_id: Option<String>,
    sink: Option<Arc<dyn AuditSink>>,
}

impl AuditContextBuilder {
    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Write through this sink instead of the process-wide default.
    pub fn sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Arc<AuditContext> {
        Arc::new(AuditContext {
            trace_id: Uuid::new_v4().to_string(),
            request_id: Uuid::new_v4().to_string(),
            workflow_id: self.workflow_id,
            tenant_id: self.tenant_id,
            sink: self.sink.unwrap_or_else(default_sink),
        })
    }
}

impl AuditContext {
    /// Fresh context with random `trace_id` and `request_id`, writing to
    /// the process-wide default sink.
    pub fn new(workflow_id: impl Into<String>) -> Arc<Self> {
        Self::builder(workflow_id).build()
    }

    pub fn builder(workflow_id: impl Into<String>) -> AuditContextBuilder {
        AuditContextBuilder {
            workflow_id: workflow_id.into(),
            tenant_id: None,
            sink: None,
        }
    }

    /// Derive a context for a sub-request: same `trace_id`, same workflow
    /// and tenant, fresh `request_id`, same sink.
    pub fn chain(self: &Arc<Self>) -> Arc<Self> {
        Arc::new(Self {
            trace_id: self.trace_id.clone(),
            request_id: Uuid::new_v4().to_string(),
            workflow_id: self.workflow_id.clone(),
            tenant_id: self.tenant_id.clone(),
            sink: Arc::clone(&self.sink),
        })
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    /// The context active for the current task or thread.
    ///
    /// Task-local bindings (from [`AuditContext::scope`]) win over the
    /// thread-local stack (from [`AuditContext::enter`]). Returns
    /// [`AuditError::NoActiveContext`] when neither is set, which callers
    /// on audit paths should report rather than bubble into request
    /// handling.
    pub fn current() -> Result<Arc<AuditContext>, AuditError> {
        if let Ok(ctx) = ACTIVE_TASK.try_with(Arc::clone) {
            return Ok(ctx);
        }
        ACTIVE_THREAD
            .with(|stack| stack.borrow().last().cloned())
            .ok_or(AuditError::NoActiveContext)
    }

    /// Make this context current for a synchronous call tree. The context
    /// stays active until the returned guard is dropped; guards nest.
    #[must_use = "the context is only current while the guard is held"]
    pub fn enter(self: &Arc<Self>) -> ContextGuard {
        ACTIVE_THREAD.with(|stack| stack.borrow_mut().push(Arc::clone(self)));
        ContextGuard {
            _not_send: PhantomData,
        }
    }

    /// Make this context current for every poll of `fut`, including after
    /// the future migrates between worker threads or is spawned as its own
    /// task. The returned future holds its own handle to the context, so it
    /// is `'static` whenever `fut` is.
    pub fn scope<F>(self: &Arc<Self>, fut: F) -> impl Future<Output = F::Output> + use<F>
    where
        F: Future,
    {
        ACTIVE_TASK.scope(Arc::clone(self), fut)
    }

    /// Start a [`StepSpan`] for one stage of this context's workflow.
    pub fn step(self: &Arc<Self>, step_name: impl Into<String>) -> StepSpan {
        StepSpan::start(Arc::clone(self), step_name)
    }

    /// Assemble and deliver one audit entry.
    ///
    /// The caller supplies the operation-specific fields; the context
    /// stamps the wall-clock timestamp and writes the correlation envelope
    /// last, so no field can masquerade as the request identity. The entry
    /// is validated against the mandatory schema and forwarded to the sink
    /// whether or not it passes; violations and sink failures are reported
    /// on the `scribe_audit` tracing target and never reach the caller.
    pub fn emit(&self, operation: Operation, fields: Map<String, Value>) {
        let mut entry = AuditEntry::from_fields(fields);
        entry.insert(
            field::TIMESTAMP,
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        entry.insert(field::TRACE_ID, Value::String(self.trace_id.clone()));
        entry.insert(field::REQUEST_ID, Value::String(self.request_id.clone()));
        entry.insert(field::WORKFLOW_ID, Value::String(self.workflow_id.clone()));
        if let Some(tenant_id) = &self.tenant_id {
            entry.insert(field::TENANT_ID, Value::String(tenant_id.clone()));
        }
        entry.insert(
            field::OPERATION,
            Value::String(operation.as_str().to_string()),
        );

        let violations = validate(&entry);
        if !violations.is_empty() {
            tracing::warn!(
                target: "scribe_audit",
                trace_id = %self.trace_id,
                operation = %operation,
                violations = ?violations,
                "audit entry failed mandatory-field validation; forwarding anyway"
            );
        }

        if let Err(e) = self.sink.write(&entry) {
            tracing::error!(
                target: "scribe_audit",
                trace_id = %self.trace_id,
                operation = %operation,
                error = %e,
                "failed to write audit entry"
            );
        }
    }
}

impl fmt::Debug for AuditContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditContext")
            .field("trace_id", &self.trace_id)
            .field("request_id", &self.request_id)
            .field("workflow_id", &self.workflow_id)
            .field("tenant_id", &self.tenant_id)
            .finish_non_exhaustive()
    }
}

/// Keeps an [`AuditContext`] current on this thread. Dropping pops the
/// context off the thread's stack.
#[must_use = "the context is only current while the guard is held"]
pub struct ContextGuard {
    // Not Send: the guard must drop on the thread whose stack it pushed.
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        ACTIVE_THREAD.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

impl fmt::Debug for ContextGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextGuard").finish()
    }
}
