use serde_json::Value;

/// Checks tool arguments against a tool's parameter schema.
///
/// Injectable so callers can swap in their own schema dialect.
pub trait SchemaValidator: Send + Sync {
    /// `Err` carries a human readable description of every violation.
    fn validate(&self, schema: &Value, value: &Value) -> Result<(), String>;
}

/// JSON Schema validation backed by the `jsonschema` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSchemaValidator;

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, schema: &Value, value: &Value) -> Result<(), String> {
        let validator = jsonschema::validator_for(schema)
            .map_err(|e| format!("invalid JSON schema: {e}"))?;
        let errors: Vec<String> = validator.iter_errors(value).map(|e| e.to_string()).collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }
}
