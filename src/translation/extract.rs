//! Pulls the first JSON value out of noisy model output.

const FENCE: &str = "```";

/// First balanced top-level JSON object or array in `text`.
///
/// A fenced block (```` ``` ```` or ```` ```json ````) is preferred when it
/// holds one; otherwise the whole text is scanned. Returns `None` for blank
/// input or when the first opener is never balanced.
pub fn extract_first_json(text: &str) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }
    let text = unify_fences(text);

    if let Some(start) = text.find(FENCE) {
        let body = text.get(start + FENCE.len()..).unwrap_or_default();
        if let Some(inside) = body.find(FENCE).and_then(|end| body.get(..end)) {
            if let Some(found) = extract_by_braces(inside.trim()) {
                return Some(found);
            }
        }
    }
    extract_by_braces(&text)
}

/// Rewrites every "```json" (any case) to a bare fence.
fn unify_fences(text: &str) -> String {
    const TAGGED: &str = "```json";
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = find_ignore_ascii_case(rest, TAGGED) {
        let (before, after) = rest.split_at(pos);
        out.push_str(before);
        out.push_str(FENCE);
        rest = after.get(TAGGED.len()..).unwrap_or_default();
    }
    out.push_str(rest);
    out
}

fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle.as_bytes()))
}

/// Scan from the earliest `{` or `[`, tracking nesting of that bracket kind
/// only. Brackets inside string literals (with `\` escapes) do not count.
fn extract_by_braces(text: &str) -> Option<String> {
    let start = text.find(['{', '['])?;
    let bytes = text.as_bytes();
    let open = *bytes.get(start)?;
    let close = if open == b'{' { b'}' } else { b']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape = false;
    for (offset, &c) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escape {
                escape = false;
            } else if c == b'\\' {
                escape = true;
            } else if c == b'"' {
                in_string = false;
            }
            continue;
        }
        if c == b'"' {
            in_string = true;
        } else if c == open {
            depth += 1;
        } else if c == close {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return text.get(start..=offset).map(|s| s.trim().to_string());
            }
        }
    }
    None
}
