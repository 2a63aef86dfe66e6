//! Mandatory-field validation for audit entries.
//!
//! Validation never blocks emission. The pipeline forwards every entry to
//! its sink regardless of the verdict; callers use the returned field list
//! to report the violation on the side. `validate` is pure, so checking an
//! entry twice yields the same answer and emitting is unaffected either way.

use serde_json::Value;

use crate::entry::{field, AuditEntry};

/// Fields every audit entry must carry, in reporting order.
pub const MANDATORY_FIELDS: [&str; 6] = [
    field::TRACE_ID,
    field::REQUEST_ID,
    field::WORKFLOW_ID,
    field::OPERATION,
    field::LATENCY_MS,
    field::SUCCESS,
];

const STRING_FIELDS: [&str; 4] = [
    field::TRACE_ID,
    field::REQUEST_ID,
    field::WORKFLOW_ID,
    field::OPERATION,
];

/// Check an entry against the mandatory schema.
///
/// Returns the names of fields that are missing, empty, or of the wrong
/// type; an empty vector means the entry is well formed. `latency_ms` must
/// be a non-negative number and `success` a boolean. The four identity
/// fields must be non-empty strings; `operation` values outside the known
/// set are left to the JSON Schema contract, since new operation kinds are
/// added by extending [`crate::entry::Operation`].
pub fn validate(entry: &AuditEntry) -> Vec<&'static str> {
    let mut violations = Vec::new();

    for name in STRING_FIELDS {
        let ok = entry
            .get(name)
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty());
        if !ok {
            violations.push(name);
        }
    }

    let latency_ok = entry
        .get(field::LATENCY_MS)
        .and_then(Value::as_f64)
        .is_some_and(|ms| ms >= 0.0);
    if !latency_ok {
        violations.push(field::LATENCY_MS);
    }

    let success_ok = entry
        .get(field::SUCCESS)
        .is_some_and(|value| value.is_boolean());
    if !success_ok {
        violations.push(field::SUCCESS);
    }

    violations
}
