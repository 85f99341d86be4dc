//! Recovering error codes from a processor's diagnostic output.

use regex::Regex;
use std::sync::LazyLock;
use xtdriver_traits::{EngineError, Phase};

static ERROR_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:XTSE|XTDE|XTTE|XTRE|XTMM|XPST|XPTY|XPDY|XQST|XQDY|FO[A-Z]{2}|SXXP|SESU)\d{4}\b")
        .expect("BUG: invalid ERROR_CODE regex literal")
});

/// Every distinct error code mentioned in `stderr`, in order of first appearance.
pub fn error_codes(stderr: &str) -> Vec<String> {
    let mut codes: Vec<String> = Vec::new();
    for found in ERROR_CODE.find_iter(stderr) {
        if !codes.iter().any(|c| c == found.as_str()) {
            codes.push(found.as_str().to_string());
        }
    }
    codes
}

/// Static codes report as static errors whatever phase the caller was in.
fn phase_of(code: &str, fallback: Phase) -> Phase {
    if code.starts_with("XTSE") || code.starts_with("XPST") || code.starts_with("XQST") {
        Phase::Static
    } else {
        fallback
    }
}

/// Builds the error for a failed invocation. The first code found becomes the
/// primary code; the last non-empty line of output becomes the message.
pub fn engine_error(fallback: Phase, stderr: &str, status: &str) -> EngineError {
    let message = stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("processor exited with {}", status));
    let codes = error_codes(stderr);
    match codes.first() {
        Some(code) => {
            let mut error = match phase_of(code, fallback) {
                Phase::Static => EngineError::static_error(code.clone(), message),
                Phase::Dynamic => EngineError::dynamic_error(code.clone(), message),
            };
            error.reported_codes = codes;
            error
        }
        None => EngineError::uncoded(fallback, message),
    }
}

/// Whether a diagnostic line is a warning rather than `xsl:message` output.
pub fn is_warning(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with("Warning") || line.starts_with("SXWN")
}
