//! Small text helpers shared by the identity, client and CLI layers.

/// Longest error body echoed back from a peer
const MAX_SNIPPET_CHARS: usize = 180;

/// Trimmed `value`, or `None` when nothing but whitespace is left.
pub fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Whether `value` already carries an `http://` or `https://` scheme.
pub fn has_http_scheme(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// First characters of a peer's response body, for error messages.
pub fn error_snippet(body: &str) -> String {
    body.trim().chars().take(MAX_SNIPPET_CHARS).collect()
}

/// Base URL of a peer's sync API.
///
/// Peers are usually configured as `host:port`; a full URL is kept as is.
pub fn peer_base_url(address: &str) -> Option<String> {
    let address = non_blank(address)?;
    let base = if has_http_scheme(address) {
        address.to_string()
    } else {
        format!("http://{address}")
    };
    Some(base.trim_end_matches('/').to_string())
}
