//! Template variable substitution.
//!
//! Job messages may embed `{{name}}` placeholders in any string-valued
//! receipt element; the values come from the top-level fields of the job
//! record itself (`{{order_id}}`, `{{customer_name}}`, ...). Placeholders
//! with no matching field are left untouched so downstream consumers can
//! spot them.

use serde_json::{Map, Value};

/// Replace `{{key}}` placeholders in `text` using the given source map.
///
/// String values substitute as-is; numbers and booleans substitute via
/// their display form; arrays, objects, and null are not substitutable and
/// leave their placeholder in place.
pub fn substitute(text: &str, source: &Map<String, Value>) -> String {
    if !text.contains("{{") {
        return text.to_string();
    }

    let mut result = text.to_string();
    for (key, value) in source {
        let placeholder = format!("{{{{{}}}}}", key);
        if !result.contains(&placeholder) {
            continue;
        }
        let replacement = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        result = result.replace(&placeholder, &replacement);
    }
    result
}

/// Substitute placeholders throughout a job record's receipt elements.
///
/// Element strings and the string values of directive objects are
/// expanded; everything else passes through unchanged.
pub fn expand_job(mut job: Value) -> Value {
    let Some(source) = job.as_object().cloned() else {
        return job;
    };

    if let Some(Value::Array(elements)) = job.get_mut("receipt_data") {
        for element in elements {
            match element {
                Value::String(text) => *text = substitute(text, &source),
                Value::Object(map) => {
                    for value in map.values_mut() {
                        if let Value::String(text) = value {
                            *text = substitute(text, &source);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    job
}

// ============================================================================
// TESTS
// ============================================================================
