//! Keeping only the tail of command output.

/// Returns the last `max_lines` lines of `output`.
///
/// Lines are split on `\n`. A single trailing terminator (`\n` or `\r\n`) does not count as a
/// line and is removed. Lines are returned as a suffix of the input, so interior line breaks
/// keep whatever convention the remote side used. `max_lines <= 0` means no limit.
pub fn truncate(output: &str, max_lines: i64) -> &str {
    let body = trim_terminator(output);
    if max_lines <= 0 {
        return body;
    }

    // Every newline found walking backwards starts one more line.
    let mut remaining = max_lines;
    for pos in memchr::memrchr_iter(b'\n', body.as_bytes()) {
        remaining -= 1;
        if remaining == 0 {
            return &body[pos + 1..];
        }
    }
    body
}

fn trim_terminator(output: &str) -> &str {
    match output.strip_suffix('\n') {
        Some(rest) => rest.strip_suffix('\r').unwrap_or(rest),
        None => output,
    }
}
