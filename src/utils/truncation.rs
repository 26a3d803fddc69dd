const MAX_STDERR_LENGTH: usize = 2_000;

/// Keep the tail of a tool's stderr. Fatal messages usually come last.
pub fn stderr_excerpt(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.len() <= MAX_STDERR_LENGTH {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - MAX_STDERR_LENGTH;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &trimmed[start..])
}
