//! Captures a plugin's stdout/stderr and parses its structured output.

use stavily_core::domain::log::{LogEntry, LogLevel};

/// Bytes from the tail of stdout examined for a trailing JSON value.
const JSON_TAIL_BYTES: usize = 16 * 1024;

/// Marker appended when captured output is truncated at the configured
/// size limit.
const TRUNCATION_MARKER: &str = "\n...[output truncated]";

/// Truncates `buf` to `max_bytes`, appending a marker if anything was
/// dropped. Operates on whole bytes; multi-byte UTF-8 sequences may be
/// cut and are lossily replaced on conversion to `String`.
pub fn truncate_output(buf: &[u8], max_bytes: usize) -> (String, bool) {
    if buf.len() <= max_bytes {
        return (String::from_utf8_lossy(buf).into_owned(), false);
    }
    let mut truncated = String::from_utf8_lossy(&buf[..max_bytes]).into_owned();
    truncated.push_str(TRUNCATION_MARKER);
    (truncated, true)
}

/// Parses the final [`JSON_TAIL_BYTES`] of stdout as JSON. If that
/// parses, it becomes `output_data` directly. Otherwise `output_data` is
/// an object wrapping the raw tail text.
pub fn parse_output_data(stdout: &str) -> serde_json::Value {
    let tail_start = stdout.len().saturating_sub(JSON_TAIL_BYTES);
    let tail = &stdout[floor_char_boundary(stdout, tail_start)..];
    let trimmed = tail.trim();

    if trimmed.is_empty() {
        return serde_json::Value::Object(Default::default());
    }

    match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(_) => serde_json::json!({ "raw": trimmed }),
    }
}

fn floor_char_boundary(s: &str, idx: usize) -> usize {
    let mut i = idx;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Splits stderr into ordered `LogEntry` lines, all at `Info` level;
/// the executor does not attempt to parse plugin-specific log levels.
pub fn stderr_to_logs(stderr: &str) -> Vec<LogEntry> {
    stderr
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| LogEntry {
            timestamp: chrono::Utc::now(),
            level: LogLevel::Info,
            message: line.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_trailing_json_object() {
        let stdout = "starting up\n{\"doubled\": 6}\n";
        let value = parse_output_data(stdout);
        assert_eq!(value["doubled"], 6);
    }

    #[test]
    fn non_json_tail_is_wrapped_raw() {
        let value = parse_output_data("plain text output");
        assert_eq!(value["raw"], "plain text output");
    }

    #[test]
    fn empty_stdout_yields_empty_object() {
        let value = parse_output_data("");
        assert_eq!(value, serde_json::json!({}));
    }

    #[test]
    fn truncation_adds_marker() {
        let buf = vec![b'a'; 100];
        let (text, truncated) = truncate_output(&buf, 10);
        assert!(truncated);
        assert!(text.contains("truncated"));
    }

    #[test]
    fn under_limit_is_untouched() {
        let buf = b"short".to_vec();
        let (text, truncated) = truncate_output(&buf, 100);
        assert!(!truncated);
        assert_eq!(text, "short");
    }
}
