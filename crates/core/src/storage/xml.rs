//! Field extraction from AWS XML responses.

use regex_lite::Regex;

/// Text of the first `<name>...</name>` element in `body`.
pub(crate) fn field(body: &str, name: &str) -> Option<String> {
    Regex::new(&format!(r"<{0}>([^<]*)</{0}>", name))
        .ok()
        .and_then(|re| re.captures(body))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Pull `<Code>` and `<Message>` out of an AWS XML error body.
pub(crate) fn error_message(body: &str) -> String {
    match (field(body, "Code"), field(body, "Message")) {
        (Some(code), Some(message)) => format!("{}: {}", code, message),
        (Some(code), None) => code,
        (None, Some(message)) => message,
        (None, None) => body.trim().to_string(),
    }
}
