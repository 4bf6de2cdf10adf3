//! Bracket and fence scanning helpers.
//!
//! All delimiters are ASCII, so byte offsets returned here always fall on
//! UTF-8 character boundaries.

/// Byte offset one past the literal opened at `start`, tracking string and
/// escape state so braces inside strings are ignored.
pub fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if !matches!(bytes.get(start), Some(b'{') | Some(b'[')) {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + offset + 1);
                }
            }
            _ => {}
        }
    }

    None
}

/// Balanced top-level `{...}` regions in document order.
///
/// An opening brace that never closes is skipped rather than allowed to
/// swallow the rest of the text.
pub fn object_regions(text: &str) -> Vec<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut regions = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'{'
            && let Some(end) = balanced_end(text, i)
        {
            regions.push((i, end));
            i = end;
            continue;
        }
        i += 1;
    }

    regions
}

/// Offsets of `{` that enclose `pos`, innermost first, looking back at most
/// `window` bytes.
pub fn enclosing_openers(text: &str, pos: usize, window: usize) -> Vec<usize> {
    let bytes = text.as_bytes();
    let floor = pos.saturating_sub(window);
    let mut depth = 0usize;
    let mut openers = Vec::new();

    for j in (floor..pos.min(bytes.len())).rev() {
        match bytes[j] {
            b'}' => depth += 1,
            b'{' if depth == 0 => openers.push(j),
            b'{' => depth -= 1,
            _ => {}
        }
    }

    openers
}

/// Contents of fenced code blocks (```` ``` ```` with optional info string),
/// in document order.
pub fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut open: Option<usize> = None;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim();
        match open {
            Some(start) if trimmed == "```" => {
                blocks.push(&text[start..offset]);
                open = None;
            }
            Some(_) => {}
            None => {
                if let Some(info) = trimmed.strip_prefix("```")
                    && !info.contains('`')
                {
                    open = Some(offset + line.len());
                }
            }
        }
        offset += line.len();
    }

    blocks
}
