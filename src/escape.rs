//! Shell-safe quoting of file paths.
//! Paths are rendered into command lines by the external collaborators, so
//! the quoting must be exact POSIX sh single-quoting.

/// True for bytes that never need quoting in a POSIX shell word.
fn is_plain_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, b'_' | b'+' | b'-' | b'.' | b'/')
}

/// Quote a path for use as a single shell word.
/// Returns None when the path is already safe as-is, so callers can alias
/// the original string instead of copying it. Otherwise the result is the
/// path wrapped in single quotes with every embedded quote rendered as
/// `'\''`, sized up front at exactly len + 2 + 3*quotes bytes.
pub fn escape(path: &str) -> Option<String> {
    let mut needs_escape = false;
    let mut nquote = 0;
    for &c in path.as_bytes() {
        if !is_plain_char(c) {
            needs_escape = true;
        }
        if c == b'\'' {
            nquote += 1;
        }
    }
    if !needs_escape {
        return None;
    }

    let mut out = String::with_capacity(path.len() + 2 + 3 * nquote);
    out.push('\'');
    for c in path.chars() {
        out.push(c);
        if c == '\'' {
            out.push_str("\\''");
        }
    }
    out.push('\'');
    Some(out)
}
