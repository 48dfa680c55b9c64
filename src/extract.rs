//! Candidate extraction for lenient parsing.
//!
//! Models wrap JSON in reasoning blocks, markdown fences and prose. In
//! [`ParseMode::Lenient`](crate::schema::ParseMode) the validator runs the
//! raw text through [`json_candidate`] before parsing. Nothing here rewrites
//! the payload itself: a malformed object stays malformed and goes back to
//! the model through the repair loop.

/// Strips `<think>`/`<thinking>` blocks, then trims whitespace.
pub fn preprocess(text: &str) -> String {
    let stripped = strip_think_tags(text);
    stripped.trim().to_string()
}

/// Strip all `<think>...</think>` and `<thinking>...</thinking>` blocks from text.
///
/// An unclosed block swallows everything after its opening tag.
///
/// # Examples
///
/// ```
/// use llm_repair_loop::extract::strip_think_tags;
///
/// assert_eq!(strip_think_tags("<think>reasoning</think>result"), "result");
/// assert_eq!(strip_think_tags("<think>no closing tag"), "");
/// ```
pub fn strip_think_tags(text: &str) -> String {
    let result = strip_tag_variant(text, "<think>", "</think>");
    strip_tag_variant(&result, "<thinking>", "</thinking>")
}

fn strip_tag_variant(text: &str, open: &str, close: &str) -> String {
    let mut result = text.to_string();
    while let Some(start) = result.find(open) {
        match result[start..].find(close) {
            Some(end_offset) => {
                let end = start + end_offset + close.len();
                result = format!("{}{}", &result[..start], &result[end..]);
            }
            None => {
                result.truncate(start);
                break;
            }
        }
    }
    result
}

/// Content of the first fenced code block, preferring one tagged `json`.
///
/// # Examples
///
/// ```
/// use llm_repair_loop::extract::fenced_block;
///
/// let text = "Here you go:\n```json\n{\"a\": 1}\n```";
/// assert_eq!(fenced_block(text), Some("{\"a\": 1}"));
/// ```
pub fn fenced_block(text: &str) -> Option<&str> {
    let mut fallback = None;
    let mut rest = text;
    let mut offset = 0;

    while let Some(open) = rest.find("```") {
        let after_ticks = offset + open + 3;
        let Some(nl) = text[after_ticks..].find('\n') else {
            break;
        };
        let line_end = after_ticks + nl;
        let lang = text[after_ticks..line_end].trim();
        let body_start = line_end + 1;
        let Some(end) = text[body_start..].find("```") else {
            break;
        };
        let close = body_start + end;
        let body = text[body_start..close].trim();

        if lang.eq_ignore_ascii_case("json") {
            return Some(body);
        }
        if fallback.is_none() {
            fallback = Some(body);
        }

        offset = close + 3;
        rest = &text[offset..];
    }

    fallback
}

/// Find the last top-level `open ... close` region, ignoring brackets
/// inside JSON strings.
///
/// # Examples
///
/// ```
/// use llm_repair_loop::extract::find_bracketed;
///
/// let input = r#"Result: {"a": [1, 2]}"#;
/// assert_eq!(find_bracketed(input, '{', '}'), Some(r#"{"a": [1, 2]}"#));
/// ```
pub fn find_bracketed(text: &str, open: char, close: char) -> Option<&str> {
    let mut best: Option<&str> = None;
    let mut scan_from = 0;

    while scan_from < text.len() {
        let Some(offset) = text[scan_from..].find(open) else {
            break;
        };
        let start = scan_from + offset;
        let mut depth = 0;
        let mut in_string = false;
        let mut escape_next = false;
        let mut found_end = None;

        for (i, ch) in text[start..].char_indices() {
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
                    found_end = Some(start + i);
                    break;
                }
            }
        }

        match found_end {
            Some(end) => {
                best = Some(&text[start..=end]);
                scan_from = end + 1;
            }
            None => break,
        }
    }

    best
}

/// Best guess at the JSON object inside a model response.
///
/// Order: think-stripped text if it already parses, a fenced block, the last
/// bracketed object, then the think-stripped text as-is.
pub fn json_candidate(raw: &str) -> String {
    let cleaned = preprocess(raw);

    if serde_json::from_str::<serde_json::Value>(&cleaned).is_ok() {
        return cleaned;
    }
    if let Some(block) = fenced_block(&cleaned) {
        return block.to_string();
    }
    if let Some(object) = find_bracketed(&cleaned, '{', '}') {
        return object.to_string();
    }
    cleaned
}
