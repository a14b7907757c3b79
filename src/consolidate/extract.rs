// src/consolidate/extract.rs
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("no JSON object delimiters in response")]
    NoObject,
    #[error("brace-delimited slice is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("extracted JSON is not an object")]
    NotAnObject,
}

/// Slice from the first `{` to the last `}` inclusive and parse it.
/// Leading and trailing prose (or code fences) around the object is ignored.
pub fn extract_json_object(text: &str) -> Result<Value, ExtractError> {
    let start = text.find('{').ok_or(ExtractError::NoObject)?;
    let end = text.rfind('}').ok_or(ExtractError::NoObject)?;
    if end < start {
        return Err(ExtractError::NoObject);
    }
    let slice = &text[start..=end];
    let value: Value =
        serde_json::from_str(slice).map_err(|e| ExtractError::InvalidJson(e.to_string()))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(ExtractError::NotAnObject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prose_around_object_is_ignored() {
        let v = extract_json_object("Here is the result: {\"a\":1} Thanks!").unwrap();
        assert_eq!(v, json!({"a": 1}));
    }

    #[test]
    fn bare_object_is_returned_as_is() {
        let raw = r#"{"a":{"b":[1,2]},"c":"}"}"#;
        let v = extract_json_object(raw).unwrap();
        assert_eq!(v, serde_json::from_str::<Value>(raw).unwrap());
        let again = extract_json_object(&v.to_string()).unwrap();
        assert_eq!(again, v);
    }

    #[test]
    fn code_fence_is_tolerated() {
        let v = extract_json_object("```json\n{\"ok\": true}\n```").unwrap();
        assert_eq!(v["ok"], true);
    }

    #[test]
    fn failures_are_typed() {
        assert_eq!(extract_json_object("no braces here"), Err(ExtractError::NoObject));
        assert_eq!(extract_json_object("} backwards {"), Err(ExtractError::NoObject));
        assert!(matches!(
            extract_json_object("{\"a\":1"),
            Err(ExtractError::NoObject)
        ));
        assert!(matches!(
            extract_json_object("{\"a\":} trailing"),
            Err(ExtractError::InvalidJson(_))
        ));
    }

    #[test]
    fn two_objects_make_invalid_json() {
        assert!(matches!(
            extract_json_object("{\"a\":1} and {\"b\":2}"),
            Err(ExtractError::InvalidJson(_))
        ));
    }
}
