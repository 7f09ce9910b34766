use serde_json::Value;

use crate::ExtractionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonShape {
    Object,
    Array,
}

impl JsonShape {
    fn delimiters(self) -> (char, char) {
        match self {
            JsonShape::Object => ('{', '}'),
            JsonShape::Array => ('[', ']'),
        }
    }
}

/// Pull the JSON payload out of free-form model output.
///
/// Takes the span from the first opening delimiter of `shape` to the last
/// closing one, inclusive, and parses it strictly. Prose and markdown fences
/// around the payload are ignored. There is no bracket balancing: two
/// separate blobs in one response are sliced as a single span.
pub fn extract(raw: &str, shape: JsonShape) -> Result<Value, ExtractionError> {
    let (open, close) = shape.delimiters();
    let start = raw.find(open).ok_or(ExtractionError::MissingOpen(open))?;
    let end = raw.rfind(close).ok_or(ExtractionError::MissingClose(close))?;
    if end < start {
        return Err(ExtractionError::Inverted { open, close });
    }
    Ok(serde_json::from_str(&raw[start..=end])?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_array() {
        let v = extract(r#"[{"a": 1}]"#, JsonShape::Array).unwrap();
        assert_eq!(v, json!([{"a": 1}]));
    }

    #[test]
    fn code_fence_and_prose() {
        let raw = "Here you go:\n```json\n{\"palette\": [\"#abc\"]}\n```\nEnjoy!";
        let v = extract(raw, JsonShape::Object).unwrap();
        assert_eq!(v, json!({"palette": ["#abc"]}));
    }

    #[test]
    fn nested_braces_inside_strings() {
        let raw = r#"Result: {"venues": [{"name": "The {Grand} Hall"}]} done"#;
        let v = extract(raw, JsonShape::Object).unwrap();
        assert_eq!(v["venues"][0]["name"], "The {Grand} Hall");
    }

    #[test]
    fn tolerance_over_prefixes_and_suffixes() {
        let payload = json!([{"task": "Book DJ", "dueDate": "2026-05-01"}, {"n": [1, 2]}]);
        let body = serde_json::to_string_pretty(&payload).unwrap();
        let prefixes = ["", "Sure!\n", "```json\n", "Tasks (see below):\n```\n"];
        let suffixes = ["", "\n```", "\nLet me know if you need more.", "\n``` (end)"];
        for prefix in prefixes {
            for suffix in suffixes {
                let raw = format!("{prefix}{body}{suffix}");
                assert_eq!(extract(&raw, JsonShape::Array).unwrap(), payload, "{raw:?}");
            }
        }
    }

    #[test]
    fn no_json_at_all() {
        let err = extract("I cannot help with that.", JsonShape::Array).unwrap_err();
        assert!(matches!(err, ExtractionError::MissingOpen('[')));
        let err = extract("I cannot help with that.", JsonShape::Object).unwrap_err();
        assert!(matches!(err, ExtractionError::MissingOpen('{')));
    }

    #[test]
    fn missing_close() {
        let err = extract("[{\"task\": \"x\"", JsonShape::Array).unwrap_err();
        assert!(matches!(err, ExtractionError::MissingClose(']')));
    }

    #[test]
    fn inverted_delimiters() {
        let err = extract("] nothing [", JsonShape::Array).unwrap_err();
        assert!(matches!(err, ExtractionError::Inverted { .. }));
    }

    #[test]
    fn wrong_shape_is_not_found() {
        // An object response when an array was requested.
        let err = extract(r#"{"tasks": "none"}"#, JsonShape::Array).unwrap_err();
        assert!(matches!(err, ExtractionError::MissingOpen('[')));
    }

    #[test]
    fn two_blobs_are_sliced_together_and_fail() {
        let raw = r#"{"a": 1} and also {"b": 2}"#;
        let err = extract(raw, JsonShape::Object).unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidJson(_)));
    }

    #[test]
    fn stray_closer_in_trailing_prose_fails() {
        let raw = "[1, 2] (see notes]";
        assert!(matches!(
            extract(raw, JsonShape::Array),
            Err(ExtractionError::InvalidJson(_))
        ));
    }

    #[test]
    fn multibyte_prose_is_sliced_on_char_boundaries() {
        let raw = "Voilà 💐 → {\"ok\": true} ✨";
        assert_eq!(extract(raw, JsonShape::Object).unwrap(), json!({"ok": true}));
    }
}
