use crate::error::ToolError;
use serde_json::Value;

/// Check `params` against a JSON-Schema-like object schema: required keys,
/// declared property types and `enum` membership. Unknown keys are allowed.
pub fn validate_params(schema: &Value, params: &Value) -> Result<(), ToolError> {
    let obj = params
        .as_object()
        .ok_or_else(|| ToolError::Validation("Parameters must be a JSON object".into()))?;

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            match obj.get(key) {
                None | Some(Value::Null) => {
                    return Err(ToolError::Validation(format!(
                        "Missing required parameter: {}",
                        key
                    )))
                }
                Some(_) => {}
            }
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };

    for (key, value) in obj {
        let Some(prop) = properties.get(key) else {
            continue;
        };
        if value.is_null() {
            continue;
        }

        if let Some(expected) = prop.get("type").and_then(Value::as_str) {
            if !type_matches(expected, value) {
                return Err(ToolError::Validation(format!(
                    "Parameter '{}' must be of type {}",
                    key, expected
                )));
            }
        }

        if let Some(allowed) = prop.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                return Err(ToolError::Validation(format!(
                    "Parameter '{}' has unsupported value {}",
                    key, value
                )));
            }
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {"type": "string", "enum": ["read", "write"]},
                "path": {"type": "string"},
                "recursive": {"type": "boolean"},
                "max_results": {"type": "integer"}
            },
            "required": ["operation", "path"]
        })
    }

    #[test]
    fn test_valid_params() {
        let params = json!({"operation": "read", "path": "a.txt", "extra": 1});
        assert!(validate_params(&schema(), &params).is_ok());
    }

    #[test]
    fn test_missing_required() {
        let err = validate_params(&schema(), &json!({"operation": "read"})).unwrap_err();
        assert_eq!(err, ToolError::Validation("Missing required parameter: path".into()));
    }

    #[test]
    fn test_wrong_type() {
        let params = json!({"operation": "read", "path": "a", "recursive": "yes"});
        assert!(matches!(validate_params(&schema(), &params), Err(ToolError::Validation(_))));

        let params = json!({"operation": "read", "path": "a", "max_results": 2.5});
        assert!(validate_params(&schema(), &params).is_err());
    }

    #[test]
    fn test_enum_violation() {
        let params = json!({"operation": "format", "path": "/"});
        assert!(validate_params(&schema(), &params).is_err());
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(validate_params(&schema(), &json!(["read"])).is_err());
    }
}
