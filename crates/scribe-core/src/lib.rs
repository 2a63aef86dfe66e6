// Configuration types shared across all Scribe crates
pub mod config;

// Audit entry model and field names
pub mod entry;

// Mandatory-field validation
pub mod validator;

// Re-export commonly used types for convenience
pub use config::{
    AuditConfig,
    ConfigError,
    RetentionPolicy,
    SinkKind,
};
pub use entry::{AuditEntry, Operation};
pub use validator::{validate, MANDATORY_FIELDS};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn emitted_entry() -> AuditEntry {
        let value = json!({
            "timestamp": "2026-08-23T10:15:00.000Z",
            "trace_id": "5f1c7a4e-0c4b-4b8e-9f6a-2d3b9c1e8a70",
            "request_id": "0a9e6d2b-7c41-4f0a-8b3d-5e1f2a6c9d84",
            "workflow_id": "chat",
            "tenant_id": "acme",
            "operation": "llm_call",
            "model": "gpt-4o-mini",
            "tokens_estimate": 512,
            "latency_ms": 201.4,
            "success": true,
        });
        match value {
            serde_json::Value::Object(map) => AuditEntry::from_fields(map),
            _ => unreachable!(),
        }
    }

    fn schema_validator() -> jsonschema::Validator {
        let schema: serde_json::Value =
            serde_json::from_str(include_str!("../../../schemas/audit-entry.schema.json"))
                .expect("schema must parse");

        jsonschema::draft202012::options()
            .build(&schema)
            .expect("schema must compile")
    }

    /// The published JSON Schema and `validator::validate` must agree on
    /// what a well-formed entry looks like.
    #[test]
    fn test_emitted_entry_matches_published_schema() {
        let entry = emitted_entry();
        assert!(validate(&entry).is_empty());

        let instance = serde_json::to_value(&entry).expect("audit entry must serialize");
        let validator = schema_validator();

        if !validator.is_valid(&instance) {
            let mut msgs = Vec::new();
            for (idx, err) in validator.iter_errors(&instance).take(20).enumerate() {
                msgs.push(format!("{}: {}", idx + 1, err));
            }
            panic!("audit entry did not validate: {}", msgs.join("; "));
        }
    }

    #[test]
    fn test_schema_rejects_incomplete_entry() {
        let validator = schema_validator();

        let missing_success = json!({
            "trace_id": "t-1",
            "request_id": "r-1",
            "workflow_id": "chat",
            "operation": "retrieval",
            "latency_ms": 3.0,
        });
        assert!(!validator.is_valid(&missing_success));

        let unknown_operation = json!({
            "trace_id": "t-1",
            "request_id": "r-1",
            "workflow_id": "chat",
            "operation": "telemetry",
            "latency_ms": 3.0,
            "success": true,
        });
        assert!(!validator.is_valid(&unknown_operation));

        let negative_latency = json!({
            "trace_id": "t-1",
            "request_id": "r-1",
            "workflow_id": "chat",
            "operation": "retrieval",
            "latency_ms": -1.0,
            "success": true,
        });
        assert!(!validator.is_valid(&negative_latency));
    }

    #[test]
    fn test_schema_allows_operation_specific_fields() {
        let validator = schema_validator();

        let retrieval = json!({
            "trace_id": "t-1",
            "request_id": "r-1",
            "workflow_id": "chat",
            "operation": "retrieval",
            "latency_ms": 8.25,
            "success": true,
            "query_length": 42,
            "n_results": 5,
            "strategy": "hybrid",
            "cache_hit": false,
        });
        assert!(validator.is_valid(&retrieval));
    }
}
