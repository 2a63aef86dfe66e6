//! Audit sink backends and the process-wide default sink.

use std::io::Write;
use std::sync::{Arc, Mutex, Once, OnceLock, RwLock};

use scribe_core::config::{AuditConfig, SinkKind};
use scribe_core::entry::AuditEntry;

use crate::error::{AuditError, SinkWriteError};
use crate::rotate::RotatingFileSink;

/// Trait for audit entry destinations.
///
/// `write` is synchronous on purpose: step spans emit from `Drop`, which
/// cannot await, so a sink must be callable from any exit path. Every
/// implementation must tolerate concurrent callers.
pub trait AuditSink: Send + Sync {
    /// Deliver one entry.
    fn write(&self, entry: &AuditEntry) -> Result<(), SinkWriteError>;

    /// Flush buffered state. The built-in sinks write through on every
    /// call, so the default is a no-op.
    fn flush(&self) -> Result<(), SinkWriteError> {
        Ok(())
    }
}

/// Create a sink based on configuration.
pub fn sink_from_config(config: &AuditConfig) -> Result<Arc<dyn AuditSink>, AuditError> {
    match config.sink {
        SinkKind::Null => Ok(Arc::new(NullSink)),
        SinkKind::Stdout => {
            let sink = if config.pretty {
                ConsoleSink::pretty()
            } else {
                ConsoleSink::new()
            };
            Ok(Arc::new(sink))
        }
        SinkKind::File => {
            let sink = RotatingFileSink::new(&config.file_path, config.max_file_size_bytes())
                .map_err(AuditError::Sink)?
                .with_retention(config.retention)
                .with_max_files(config.max_files);
            Ok(Arc::new(sink))
        }
    }
}

/// Sink that discards every entry.
pub struct NullSink;

impl AuditSink for NullSink {
    fn write(&self, _entry: &AuditEntry) -> Result<(), SinkWriteError> {
        Ok(())
    }
}

/// Sink that prints entries to stdout, one JSON document per entry.
pub struct ConsoleSink {
    pretty: bool,
}

impl ConsoleSink {
    /// Compact JSON lines.
    pub fn new() -> Self {
        Self { pretty: false }
    }

    /// Indented JSON for interactive use.
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for ConsoleSink {
    fn write(&self, entry: &AuditEntry) -> Result<(), SinkWriteError> {
        let mut rendered = if self.pretty {
            entry.to_pretty_json()?
        } else {
            entry.to_json_line()?
        };
        rendered.push('\n');

        let mut out = std::io::stdout().lock();
        out.write_all(rendered.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

/// Sink that captures entries in memory, for tests and inspection.
#[derive(Default)]
pub struct MemorySink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far, in write order.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last(&self) -> Option<AuditEntry> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.last().cloned())
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl AuditSink for MemorySink {
    fn write(&self, entry: &AuditEntry) -> Result<(), SinkWriteError> {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry.clone());
        }
        Ok(())
    }
}

// The process-wide default sink. Contexts capture it at creation, so a
// swap affects subsequently created contexts while in-flight ones keep
// writing to the sink they were born with.
static DEFAULT_SINK: RwLock<Option<Arc<dyn AuditSink>>> = RwLock::new(None);

static UNINITIALIZED_WARNING: Once = Once::new();

/// Build the configured sink and install it as the process-wide default.
pub fn install_default_sink(config: &AuditConfig) -> Result<(), AuditError> {
    let sink = sink_from_config(config)?;
    swap_default_sink(sink);
    Ok(())
}

/// Replace the process-wide default sink, returning the previous one.
pub fn swap_default_sink(sink: Arc<dyn AuditSink>) -> Option<Arc<dyn AuditSink>> {
    match DEFAULT_SINK.write() {
        Ok(mut slot) => slot.replace(sink),
        Err(poisoned) => poisoned.into_inner().replace(sink),
    }
}

/// The current process-wide default sink.
///
/// Before [`install_default_sink`] runs, this is a discard sink; the first
/// such use is reported once on the `scribe_audit` tracing target so a
/// misconfigured process is visible without being disturbed.
pub fn default_sink() -> Arc<dyn AuditSink> {
    if let Ok(slot) = DEFAULT_SINK.read() {
        if let Some(sink) = slot.as_ref() {
            return Arc::clone(sink);
        }
    }

    UNINITIALIZED_WARNING.call_once(|| {
        tracing::warn!(
            target: "scribe_audit",
            "no default audit sink installed; audit entries will be discarded"
        );
    });
    shared_null_sink()
}

/// Remove and flush the default sink. Later entries from contexts created
/// after this point are discarded.
pub fn shutdown_default_sink() {
    let previous = match DEFAULT_SINK.write() {
        Ok(mut slot) => slot.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    };

    if let Some(sink) = previous {
        if let Err(e) = sink.flush() {
            tracing::warn!(
                target: "scribe_audit",
                error = %e,
                "failed to flush audit sink during shutdown"
            );
        }
    }
}

fn shared_null_sink() -> Arc<dyn AuditSink> {
    static NULL: OnceLock<Arc<dyn AuditSink>> = OnceLock::new();
    Arc::clone(NULL.get_or_init(|| Arc::new(NullSink)))
}
