use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Greedy match of the outermost `{...}` or `[...]` run on a line.
static JSON_FRAGMENT: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\{.*\}|\[.*\]").ok());

/// Pretty-prints a JSON fragment embedded in a log message.
///
/// The fragment is replaced by a newline followed by its indented form. When
/// no fragment is found, or it does not parse, the message is returned as is.
pub fn format_message(message: &str) -> Cow<'_, str> {
    let Some(pattern) = JSON_FRAGMENT.as_ref() else {
        return Cow::Borrowed(message);
    };
    let Some(found) = pattern.find(message) else {
        return Cow::Borrowed(message);
    };
    let Ok(parsed) = serde_json::from_str::<Value>(found.as_str()) else {
        return Cow::Borrowed(message);
    };
    let Ok(pretty) = serde_json::to_string_pretty(&parsed) else {
        return Cow::Borrowed(message);
    };

    let mut formatted = String::with_capacity(message.len() + pretty.len());
    formatted.push_str(&message[..found.start()]);
    formatted.push('\n');
    formatted.push_str(&pretty);
    formatted.push_str(&message[found.end()..]);
    Cow::Owned(formatted)
}
