//! Utility helpers shared by the Testbench crates: configuration loading,
//! secret redaction for logs, and time formatting for the run console.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

pub mod config;
pub mod date_handling;

pub use config::{ConfigError, PlatformConfig};
pub use date_handling::{format_elapsed, format_log_time};

static SENSITIVE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(authorization: )([\w\-\.=:/+ ]+)",
        r"(?i)([A-Z0-9_]*?(KEY|TOKEN|SECRET|PASSWORD)=)([^\s]+)",
        r#"(?i)("[a-z0-9_]*?(token|secret|password)"\s*:\s*)("[^"]*")"#,
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Redacts values that look like secrets in a string.
///
/// Covers `Authorization:` headers, `*_TOKEN=`/`*_KEY=` style pairs and JSON
/// members whose key mentions a token, secret, or password.
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for pattern in SENSITIVE_PATTERNS.iter() {
        redacted = pattern
            .replace_all(&redacted, |caps: &Captures| {
                let prefix = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                format!("{prefix}<redacted>")
            })
            .to_string();
    }
    redacted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_authorization_headers() {
        assert_eq!(redact_sensitive("authorization: Bearer abc.def"), "authorization: <redacted>");
    }

    #[test]
    fn redacts_env_style_pairs() {
        assert_eq!(
            redact_sensitive("TESTBENCH_API_TOKEN=abc123 other=1"),
            "TESTBENCH_API_TOKEN=<redacted> other=1"
        );
    }

    #[test]
    fn redacts_json_members() {
        assert_eq!(
            redact_sensitive(r#"{"authToken": "eyJhbGci", "userId": 7}"#),
            r#"{"authToken": <redacted>, "userId": 7}"#
        );
    }

    #[test]
    fn leaves_plain_text_alone() {
        assert_eq!(redact_sensitive("step Login finished"), "step Login finished");
    }
}
