use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Types that can be requested from the model as a tool-call payload.
///
/// Implemented for anything that is `JsonSchema + DeserializeOwned`.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    /// JSON schema used as the forced tool's `input_schema`.
    ///
    /// One flat document: `$ref`s are inlined, every object is closed with
    /// `additionalProperties: false` and lists all of its properties as required.
    fn tool_schema() -> Value {
        let root = serde_json::to_value(schema_for!(Self)).unwrap_or_default();
        let Value::Object(mut root) = root else {
            return root;
        };
        let definitions = root.remove("definitions").unwrap_or(Value::Null);
        root.remove("$schema");

        let mut schema = Value::Object(root);
        close(&mut schema, &definitions);
        schema
    }

    fn type_name() -> String {
        <Self as JsonSchema>::schema_name()
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

fn close(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(target) = resolve(map, definitions) {
                *value = target;
                close(value, definitions);
                return;
            }

            for child in map.values_mut() {
                close(child, definitions);
            }

            if map.get("type").and_then(Value::as_str) == Some("object") {
                map.insert("additionalProperties".to_string(), Value::Bool(false));
                let required: Option<Vec<Value>> = map
                    .get("properties")
                    .and_then(Value::as_object)
                    .map(|props| props.keys().cloned().map(Value::String).collect());
                if let Some(required) = required {
                    map.insert("required".to_string(), Value::Array(required));
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                close(item, definitions);
            }
        }
        _ => {}
    }
}

/// What a `$ref` or a single-entry `allOf` wrapper stands for.
fn resolve(map: &Map<String, Value>, definitions: &Value) -> Option<Value> {
    let reference = map
        .get("$ref")
        .and_then(Value::as_str)
        .and_then(|r| r.strip_prefix("#/definitions/"));
    if let Some(name) = reference {
        return definitions.get(name).cloned();
    }

    match map.get("allOf") {
        Some(Value::Array(all_of)) if all_of.len() == 1 => all_of.first().cloned(),
        _ => None,
    }
}
