//! Detection of echoed schema templates.

use regex::Regex;
use std::sync::LazyLock;

/// `"field": number,` style type placeholders outside of string values.
static TYPE_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)"\s*:\s*(?:string|number|boolean|integer|array|object)\b\s*(?:[,}\]|(]|$)"#,
    )
    .expect("TYPE_PLACEHOLDER regex should compile")
});

/// `"field": [string]` style array placeholders.
static ARRAY_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""\s*:\s*\[\s*(?:string|number|boolean|integer|object)\s*\]"#)
        .expect("ARRAY_PLACEHOLDER regex should compile")
});

const INSTRUCTION_MARKERS: [&str; 2] = ["MUST", "CRITICAL:"];

/// Whether `text` looks like the requested output shape rather than an answer.
pub fn is_schema_template(text: &str) -> bool {
    if TYPE_PLACEHOLDER.is_match(text) || ARRAY_PLACEHOLDER.is_match(text) {
        return true;
    }

    let has_placeholder = text.contains("${") || text.contains("\"...\"");
    has_placeholder && INSTRUCTION_MARKERS.iter().any(|m| text.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_placeholder_is_template() {
        assert!(is_schema_template(r#"{"count": number, "name": string}"#));
        assert!(is_schema_template("{\n  \"ok\": boolean\n}"));
        assert!(is_schema_template(r#"{"change": string (diff or summary)}"#));
        assert!(is_schema_template(r#"{"tags": [string]}"#));
    }

    #[test]
    fn test_quoted_type_names_are_real_values() {
        assert!(!is_schema_template(r#"{"type": "string", "kind": "number"}"#));
        assert!(!is_schema_template(r#"{"count": 3, "note": "a number, sadly"}"#));
    }

    #[test]
    fn test_placeholder_with_instructions_is_template() {
        assert!(is_schema_template(
            r#"{"id": "${ISSUE_ID}"} You MUST fill every field"#
        ));
        assert!(!is_schema_template(r#"{"cmd": "echo ${HOME}"}"#));
    }
}
