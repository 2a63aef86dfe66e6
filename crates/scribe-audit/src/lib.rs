//! # scribe-audit
//!
//! Trace-correlated audit pipeline for Scribe workflows.
//!
//! This crate provides functionality for:
//! - Correlating every audit entry of one logical request under a shared `trace_id`
//! - Recording model calls, retrievals, workflow steps, and outbound API requests
//! - Writing JSON Lines to stdout or a size-rotated file, per configuration
//! - Measuring workflow stages with spans that emit on every exit path
//!
//! Auditing is deliberately fail-open: a malformed entry is still written
//! (and the violation reported), a failing sink never breaks the operation
//! being audited, and pipeline problems surface as structured wire entries
//! or `tracing` diagnostics on the `scribe_audit` target, never as errors
//! in the caller's path.
//!
//! ## Operation Kinds
//!
//! | Operation | Emitted by | Carries |
//! |-----------|------------|---------|
//! | `llm_call` | [`LlmCall`] | `model`, `tokens_estimate`, `sub_operation`, `retries` |
//! | `retrieval` | [`Retrieval`] | `query_length`, `n_results`, `strategy`, `cache_hit` |
//! | `workflow_step` | [`StepSpan`] | `step_name`, metadata, `output_summary` |
//! | `api_request` | [`ApiRequest`] | `endpoint`, `status_code` |
//!
//! Every entry additionally carries the mandatory envelope: `trace_id`,
//! `request_id`, `workflow_id`, `operation`, `latency_ms`, and `success`.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use scribe_audit::{install_default_sink, AuditContext, LlmCall, Retrieval};
//! use scribe_core::AuditConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Route audit output according to configuration
//! let config = AuditConfig::from_env()?;
//! install_default_sink(&config)?;
//!
//! // One context per incoming request
//! let ctx = AuditContext::builder("chat").tenant_id("acme").build();
//!
//! ctx.scope(async {
//!     // Stages of the workflow are measured by spans
//!     let span = AuditContext::current()?.step("retrieve_context");
//!     let result: Result<(), std::io::Error> = span
//!         .run_async(async {
//!             // ... perform the retrieval ...
//!             Ok(())
//!         })
//!         .await;
//!     result?;
//!
//!     // Individual operations report themselves as they happen
//!     Retrieval::new(5).query_length(42).latency_ms(8.2).emit_current();
//!     LlmCall::new("gpt-4o-mini")
//!         .tokens_estimate(512)
//!         .latency_ms(201.4)
//!         .emit_current();
//!     Ok::<_, Box<dyn std::error::Error>>(())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod error;
pub mod records;
pub mod rotate;
pub mod sink;
pub mod span;

pub use context::{AuditContext, AuditContextBuilder, ContextGuard};
pub use error::{AuditError, SinkWriteError};
pub use records::{ApiRequest, LlmCall, Retrieval};
pub use rotate::RotatingFileSink;
pub use sink::{
    default_sink, install_default_sink, shutdown_default_sink, sink_from_config,
    swap_default_sink, AuditSink, ConsoleSink, MemorySink, NullSink,
};
pub use span::StepSpan;
