//! JSON Schema validation for security pattern tables.
//!
//! Tables are validated against schema/pattern-table.schema.json before
//! any regex is compiled.

use std::sync::OnceLock;

/// Embedded pattern table schema (loaded at compile time).
const PATTERN_TABLE_SCHEMA_JSON: &str =
    include_str!("../../../../schema/pattern-table.schema.json");

/// Compiled JSON Schema validator (initialized once, reused).
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

fn get_validator() -> Result<&'static jsonschema::Validator, String> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = serde_json::from_str(PATTERN_TABLE_SCHEMA_JSON)
            .map_err(|e| format!("Invalid schema JSON: {}", e))?;

        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    result.as_ref().map_err(Clone::clone)
}

/// Validate a pattern table document.
///
/// Returns every violation, each suffixed with its instance path.
pub fn validate_pattern_table(table: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e])?;

    let errors: Vec<String> = validator
        .iter_errors(table)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
