//! Extraction of JSON payloads from free-form model output.
//!
//! Models wrap JSON in fenced blocks, prefix it with prose, or return it bare.
//! The helpers here try a fenced block first and then scan for the first
//! balanced object or array that parses.

use serde_json::Value;

/// Extract the first JSON object containing any of `keys`.
pub fn extract_object_with_keys(output: &str, keys: &[&str]) -> Option<Value> {
    let has_key = |v: &Value| v.is_object() && keys.iter().any(|k| v.get(*k).is_some());

    if let Some(val) = extract_fenced_json(output) {
        if has_key(&val) {
            return Some(val);
        }
    }
    scan_balanced(output, '{', '}', |v| has_key(v))
}

/// Extract a list of items: a bare array, or the first array-valued property
/// of a wrapping object (`{"ideas": [...]}`, `{"variations": [...]}`, …).
pub fn extract_array(output: &str) -> Option<Vec<Value>> {
    if let Some(val) = extract_fenced_json(output) {
        if let Some(items) = array_of(val) {
            return Some(items);
        }
    }

    let trimmed = output.trim();
    if let Ok(val) = serde_json::from_str::<Value>(trimmed) {
        if let Some(items) = array_of(val) {
            return Some(items);
        }
    }

    // Whichever balanced structure appears first in the text wins.
    let array = first_balanced(output, '[', ']');
    let object = first_balanced(output, '{', '}');
    let ordered = match (array, object) {
        (Some(a), Some(o)) if o.0 < a.0 => vec![o, a],
        (Some(a), Some(o)) => vec![a, o],
        (Some(a), None) => vec![a],
        (None, Some(o)) => vec![o],
        (None, None) => vec![],
    };
    ordered.into_iter().find_map(|(_, v)| array_of(v))
}

/// Read a string field, trimmed; empty strings count as missing.
pub fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Read a list of non-empty strings. Tolerates a single comma-separated string.
pub fn string_list(value: &Value, key: &str) -> Vec<String> {
    match value.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn array_of(val: Value) -> Option<Vec<Value>> {
    match val {
        Value::Array(items) => Some(items),
        Value::Object(map) => map.into_iter().find_map(|(_, v)| match v {
            Value::Array(items) => Some(items),
            _ => None,
        }),
        _ => None,
    }
}

/// Content of the last ```json fenced block that parses.
fn extract_fenced_json(output: &str) -> Option<Value> {
    let mut in_block = false;
    let mut content = String::new();
    let mut best: Option<Value> = None;

    for line in output.lines() {
        let trimmed = line.trim();
        if !in_block && (trimmed.eq_ignore_ascii_case("```json") || trimmed == "```") {
            in_block = true;
            content.clear();
            continue;
        }
        if in_block && trimmed == "```" {
            in_block = false;
            if let Ok(val) = serde_json::from_str::<Value>(&content) {
                if val.is_object() || val.is_array() {
                    best = Some(val);
                }
            }
            continue;
        }
        if in_block {
            content.push_str(line);
            content.push('\n');
        }
    }

    best
}

/// Longest prefix of the output the balanced scans look at.
const MAX_SCAN_CHARS: usize = 256 * 1024;
/// Opening delimiters tried per scan. Each try may walk to the end of the
/// text, so this bounds a scan at `MAX_SCAN_STARTS * MAX_SCAN_CHARS` steps.
const MAX_SCAN_STARTS: usize = 128;

fn first_balanced(output: &str, open: char, close: char) -> Option<(usize, Value)> {
    balanced_candidates(output, open, close).next()
}

fn scan_balanced(
    output: &str,
    open: char,
    close: char,
    accept: impl Fn(&Value) -> bool,
) -> Option<Value> {
    balanced_candidates(output, open, close)
        .find(|(_, val)| accept(val))
        .map(|(_, val)| val)
}

/// Every balanced `open..close` span that parses as JSON, by start offset.
fn balanced_candidates(
    output: &str,
    open: char,
    close: char,
) -> impl Iterator<Item = (usize, Value)> {
    let chars: Vec<char> = output.chars().take(MAX_SCAN_CHARS).collect();
    let starts: Vec<usize> = chars
        .iter()
        .enumerate()
        .filter(|(_, ch)| **ch == open)
        .map(|(i, _)| i)
        .take(MAX_SCAN_STARTS)
        .collect();

    starts.into_iter().filter_map(move |start| {
        let end = find_matching(&chars, start, open, close)?;
        let candidate: String = chars[start..=end].iter().collect();
        serde_json::from_str::<Value>(&candidate)
            .ok()
            .map(|v| (start, v))
    })
}

/// Index of the delimiter closing the one at `start`, skipping string content.
fn find_matching(chars: &[char], start: usize, open: char, close: char) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, &ch) in chars.iter().enumerate().skip(start) {
        if escape_next {
            escape_next = false;
            continue;
        }
        if ch == '\\' && in_string {
            escape_next = true;
            continue;
        }
        if ch == '"' {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        if ch == open {
            depth += 1;
        } else if ch == close {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_object_with_key() {
        let out = "Here you go:\n```json\n{\"mergedTitle\": \"A\"}\n```\nThanks";
        let val = extract_object_with_keys(out, &["mergedTitle"]).unwrap();
        assert_eq!(val["mergedTitle"], "A");
    }

    #[test]
    fn test_bare_object_after_prose() {
        let out = "Sure {not json} then {\"mergedTitle\": \"B\", \"x\": \"}\"}";
        let val = extract_object_with_keys(out, &["mergedTitle"]).unwrap();
        assert_eq!(val["mergedTitle"], "B");
        assert!(extract_object_with_keys(out, &["missing"]).is_none());
    }

    #[test]
    fn test_bare_array() {
        let items = extract_array("[{\"title\": \"a\"}, {\"title\": \"b\"}]").unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_wrapped_array_uses_first_array_property() {
        let out = "{\"note\": \"hi\", \"whatever\": [{\"theme\": \"AI-Powered\"}]}";
        let items = extract_array(out).unwrap();
        assert_eq!(items[0]["theme"], "AI-Powered");
    }

    #[test]
    fn test_array_embedded_in_prose() {
        let out = "Ideas below.\n[{\"title\": \"x\"}]\nEnjoy!";
        assert_eq!(extract_array(out).unwrap().len(), 1);
        assert!(extract_array("no json here").is_none());
    }

    #[test]
    fn test_string_list_accepts_csv() {
        let val: Value = serde_json::json!({"tags": "ai, social ,", "list": ["a", " ", "b"]});
        assert_eq!(string_list(&val, "tags"), vec!["ai", "social"]);
        assert_eq!(string_list(&val, "list"), vec!["a", "b"]);
        assert!(string_list(&val, "nope").is_empty());
    }

    #[test]
    fn test_unbalanced_flood_gives_up() {
        let out = "{".repeat(200_000);
        assert!(extract_object_with_keys(&out, &["mergedTitle"]).is_none());
        assert!(extract_array(&"[".repeat(200_000)).is_none());
    }

    #[test]
    fn test_stray_brace_before_object() {
        let out = "Use { to start. {\"mergedTitle\": \"C\"}";
        let val = extract_object_with_keys(out, &["mergedTitle"]).unwrap();
        assert_eq!(val["mergedTitle"], "C");
    }
}
