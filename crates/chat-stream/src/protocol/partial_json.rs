use serde_json::Value;

#[derive(Debug, Clone, Copy)]
enum Scope {
    Object { expecting_key: bool },
    Array,
}

impl Scope {
    fn closer(&self) -> char {
        match self {
            Scope::Object { .. } => '}',
            Scope::Array => ']',
        }
    }
}

/// Parse JSON text that may have been cut off mid-value.
///
/// Complete text parses as-is. Otherwise unterminated strings, objects and
/// arrays are closed, and anything that cannot stand as a value yet (a dangling
/// key, a trailing comma, a half-written literal) is dropped. Returns `None`
/// when nothing usable has arrived.
pub fn parse_partial_json(text: &str) -> Option<Value> {
    if text.trim().is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }

    repair_candidates(text)
        .into_iter()
        .find_map(|candidate| serde_json::from_str(&candidate).ok())
}

fn close(prefix: &str, stack: &[Scope]) -> String {
    let mut repaired = prefix.to_string();
    repaired.extend(stack.iter().rev().map(Scope::closer));
    repaired
}

/// Candidate completions, most complete first
fn repair_candidates(text: &str) -> Vec<String> {
    let mut stack: Vec<Scope> = Vec::new();
    // longest prefix that closes into valid JSON, with the scopes open at that point
    let mut safe: Option<(usize, Vec<Scope>)> = None;
    let mut in_string = false;
    let mut string_is_key = false;
    let mut escaped = false;
    let mut literal_start: Option<usize> = None;

    for (index, ch) in text.char_indices() {
        let end = index + ch.len_utf8();

        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
                if !string_is_key {
                    safe = Some((end, stack.clone()));
                }
            }
            continue;
        }

        if let Some(start) = literal_start {
            if matches!(ch, ',' | '}' | ']' | ':') || ch.is_whitespace() {
                literal_start = None;
                if is_complete_literal(&text[start..index]) {
                    safe = Some((index, stack.clone()));
                }
            }
        }

        match ch {
            '{' => {
                stack.push(Scope::Object {
                    expecting_key: true,
                });
                safe = Some((end, stack.clone()));
            }
            '[' => {
                stack.push(Scope::Array);
                safe = Some((end, stack.clone()));
            }
            '}' | ']' => {
                stack.pop();
                safe = Some((end, stack.clone()));
            }
            '"' => {
                in_string = true;
                string_is_key = matches!(
                    stack.last(),
                    Some(Scope::Object {
                        expecting_key: true
                    })
                );
            }
            ':' => {
                if let Some(Scope::Object { expecting_key }) = stack.last_mut() {
                    *expecting_key = false;
                }
            }
            ',' => {
                if let Some(Scope::Object { expecting_key }) = stack.last_mut() {
                    *expecting_key = true;
                }
            }
            c if c.is_whitespace() => {}
            _ => {
                literal_start.get_or_insert(index);
            }
        }
    }

    let mut candidates = Vec::new();

    if in_string && !string_is_key {
        let prefix = if escaped {
            &text[..text.len() - 1]
        } else {
            text
        };
        candidates.push(close(&format!("{}\"", prefix), &stack));
    }

    if let Some(start) = literal_start {
        if is_complete_literal(&text[start..]) {
            candidates.push(close(text, &stack));
        }
    }

    if let Some((len, scopes)) = safe {
        candidates.push(close(&text[..len], &scopes));
    }

    candidates
}

fn is_complete_literal(literal: &str) -> bool {
    matches!(
        serde_json::from_str::<Value>(literal),
        Ok(Value::Number(_) | Value::Bool(_) | Value::Null)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_complete_json_is_unchanged() {
        assert_eq!(
            parse_partial_json(r#"{"location":"SF"}"#),
            Some(json!({"location": "SF"}))
        );
    }

    #[test]
    fn test_empty_text_has_no_value() {
        assert_eq!(parse_partial_json(""), None);
        assert_eq!(parse_partial_json("   "), None);
    }

    #[test]
    fn test_open_object_and_string_value() {
        assert_eq!(parse_partial_json("{"), Some(json!({})));
        assert_eq!(
            parse_partial_json(r#"{"location":"San Fr"#),
            Some(json!({"location": "San Fr"}))
        );
    }

    #[test]
    fn test_dangling_key_is_dropped() {
        assert_eq!(parse_partial_json(r#"{"loc"#), Some(json!({})));
        assert_eq!(parse_partial_json(r#"{"location""#), Some(json!({})));
        assert_eq!(parse_partial_json(r#"{"location":"#), Some(json!({})));
        assert_eq!(
            parse_partial_json(r#"{"a":1,"b"#),
            Some(json!({"a": 1}))
        );
    }

    #[test]
    fn test_trailing_comma_is_dropped() {
        assert_eq!(parse_partial_json(r#"{"a":1,"#), Some(json!({"a": 1})));
        assert_eq!(parse_partial_json("[1,2,"), Some(json!([1, 2])));
    }

    #[test]
    fn test_nested_scopes_are_closed() {
        assert_eq!(
            parse_partial_json(r#"{"a":{"b":[1,{"c":"d"#),
            Some(json!({"a": {"b": [1, {"c": "d"}]}}))
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse_partial_json(r#"{"a":12"#), Some(json!({"a": 12})));
        assert_eq!(parse_partial_json(r#"{"a":tr"#), Some(json!({})));
        assert_eq!(
            parse_partial_json(r#"{"a":true,"b":nu"#),
            Some(json!({"a": true}))
        );
        assert_eq!(parse_partial_json(r#"{"a":1."#), Some(json!({})));
    }

    #[test]
    fn test_escape_at_end_of_string() {
        assert_eq!(
            parse_partial_json(r#"{"path":"C:\"#),
            Some(json!({"path": "C:"}))
        );
        assert_eq!(
            parse_partial_json(r#"{"quote":"say \"hi"#),
            Some(json!({"quote": "say \"hi"}))
        );
    }
}
