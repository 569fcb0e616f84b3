//! Best-effort repair for JSON truncated mid-stream by a token limit.
//!
//! LLM completions are occasionally cut off before the JSON object closes.
//! Rather than discard the whole chapter's extraction, we walk the raw text
//! tracking bracket depth and string state, remember every point after which
//! the document was a complete, well-formed value, and cut back to the last
//! such point before closing out whatever brackets remain open.

#[derive(Clone, Copy, PartialEq, Eq)]
enum StringState {
    None,
    InString,
    Escaped,
}

/// Attempt to repair truncated JSON so it parses. Returns the input unchanged
/// if it already looks complete (brackets balanced outside of strings).
pub fn repair_truncated_json(raw: &str) -> String {
    let text = extract_json_span(raw);
    let chars: Vec<char> = text.chars().collect();

    let mut stack: Vec<char> = Vec::new();
    let mut string_state = StringState::None;
    let mut after_colon = false;
    let mut safe_cut_points: Vec<usize> = Vec::new();

    for (i, &c) in chars.iter().enumerate() {
        match string_state {
            StringState::Escaped => {
                string_state = StringState::InString;
                continue;
            }
            StringState::InString => {
                if c == '\\' {
                    string_state = StringState::Escaped;
                } else if c == '"' {
                    string_state = StringState::None;
                    // A string is a safe cut point when it's an array
                    // element or an object *value* (after a colon) — never
                    // when it's a bare key awaiting its value.
                    if stack.last() != Some(&'{') || after_colon {
                        safe_cut_points.push(i + 1);
                        after_colon = false;
                    }
                }
                continue;
            }
            StringState::None => {}
        }

        match c {
            '"' => string_state = StringState::InString,
            '{' | '[' => {
                stack.push(c);
                after_colon = false;
            }
            '}' => {
                if stack.last() == Some(&'{') {
                    stack.pop();
                }
                safe_cut_points.push(i + 1);
                after_colon = false;
            }
            ']' => {
                if stack.last() == Some(&'[') {
                    stack.pop();
                }
                safe_cut_points.push(i + 1);
                after_colon = false;
            }
            ':' => after_colon = true,
            ',' => {
                after_colon = false;
                if stack.is_empty() {
                    safe_cut_points.push(i);
                }
            }
            _ => {}
        }
    }

    if stack.is_empty() && string_state == StringState::None {
        // Already structurally complete.
        if serde_json::from_str::<serde_json::Value>(&text).is_ok() {
            return text;
        }
    }

    let cut = safe_cut_points.into_iter().max().unwrap_or(chars.len());
    let mut truncated: String = chars[..cut.min(chars.len())].iter().collect();

    truncated = strip_trailing_comma(&truncated);
    truncated = strip_incomplete_primitive(&truncated);
    truncated = strip_dangling_key(&truncated);
    truncated = close_open_brackets(&truncated);

    truncated
}

/// Drop anything before the first `{` or `[` and after the corresponding
/// outermost close, if present — models sometimes wrap JSON in prose or
/// markdown fences.
fn extract_json_span(raw: &str) -> String {
    let trimmed = raw.trim();
    let start = trimmed.find(['{', '[']);
    match start {
        Some(s) => trimmed[s..].to_string(),
        None => trimmed.to_string(),
    }
}

fn strip_trailing_comma(s: &str) -> String {
    let trimmed = s.trim_end();
    trimmed.strip_suffix(',').unwrap_or(trimmed).to_string()
}

/// If the text ends mid-primitive (an incomplete number/bool/null literal
/// following a `:`), drop it back to the preceding comma or open bracket.
fn strip_incomplete_primitive(s: &str) -> String {
    let trimmed = s.trim_end();
    // A value that already terminated with a closing bracket or quote is
    // complete; only a bare unquoted token (number/true/false/null) in
    // progress needs inspecting here.
    match trimmed.chars().last() {
        Some('}') | Some(']') | Some('"') => return trimmed.to_string(),
        _ => {}
    }
    let tail_start = trimmed
        .rfind([':', ',', '{', '['])
        .map(|i| i + 1)
        .unwrap_or(0);
    let tail = trimmed[tail_start..].trim();
    if tail.is_empty() || tail.contains('"') {
        return trimmed.to_string();
    }
    if is_valid_primitive(tail) {
        return trimmed.to_string();
    }
    trimmed[..tail_start].trim_end().to_string()
}

fn is_valid_primitive(tail: &str) -> bool {
    matches!(tail, "true" | "false" | "null") || tail.parse::<f64>().is_ok()
}

/// Strip a trailing dangling `"key":` or `{"key":` with no value at all.
fn strip_dangling_key(s: &str) -> String {
    let trimmed = s.trim_end();
    let re = regex::Regex::new(r#"(,|\{)\s*"[^"]*"\s*:\s*$"#).unwrap();
    if let Some(m) = re.find(trimmed) {
        return trimmed[..m.start() + 1].trim_end().to_string();
    }
    trimmed.to_string()
}

/// Close any brackets left open, in reverse (innermost-first) order.
fn close_open_brackets(s: &str) -> String {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in s.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => stack.push(c),
            '}' if !in_string => {
                if stack.last() == Some(&'{') {
                    stack.pop();
                }
            }
            ']' if !in_string => {
                if stack.last() == Some(&'[') {
                    stack.pop();
                }
            }
            _ => {}
        }
    }

    let mut out = s.trim_end().to_string();
    if in_string {
        out.push('"');
    }
    let trimmed_comma = out.strip_suffix(',').map(str::to_string);
    if let Some(t) = trimmed_comma {
        out = t;
    }
    for bracket in stack.iter().rev() {
        out.push(match bracket {
            '{' => '}',
            '[' => ']',
            _ => unreachable!(),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_through_complete_json() {
        let input = r#"{"a": 1, "b": [1, 2, 3]}"#;
        assert_eq!(repair_truncated_json(input), input);
    }

    #[test]
    fn closes_unclosed_object() {
        let input = r#"{"characters": [{"name": "张三"}"#;
        let repaired = repair_truncated_json(input);
        let parsed: serde_json::Value = serde_json::from_str(&repaired).unwrap();
        assert_eq!(parsed["characters"][0]["name"], "张三");
    }

    #[test]
    fn drops_dangling_key() {
        let input = r#"{"characters": [{"name": "张三"}], "locations": "#;
        let repaired = repair_truncated_json(input);
        let _: serde_json::Value = serde_json::from_str(&repaired).unwrap();
    }

    #[test]
    fn closes_dangling_number_value() {
        let input = r#"{"count": 4"#;
        let repaired = repair_truncated_json(input);
        let parsed: serde_json::Value = serde_json::from_str(&repaired).unwrap();
        assert_eq!(parsed["count"], 4);
    }

    #[test]
    fn drops_truly_incomplete_primitive() {
        let input = r#"{"active": tru"#;
        let repaired = repair_truncated_json(input);
        let parsed: serde_json::Value = serde_json::from_str(&repaired).unwrap();
        assert!(parsed.get("active").is_none());
    }

    #[test]
    fn strips_markdown_fence_prefix() {
        let input = "```json\n{\"a\": 1}\n```";
        let repaired = repair_truncated_json(input);
        let parsed: serde_json::Value = serde_json::from_str(&repaired).unwrap();
        assert_eq!(parsed["a"], 1);
    }
}
