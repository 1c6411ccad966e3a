use percent_encoding::{AsciiSet, CONTROLS, NON_ALPHANUMERIC, utf8_percent_encode};

/// Characters escaped in the uri produced by a redirecting rule
/// unless the rule carries the `NE` flag.
const REDIRECT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'|')
    .add(b'\\')
    .add(b'^');

#[inline]
pub(crate) fn split_query(uri: &str) -> (&str, &str) {
    uri.split_once('?').unwrap_or((uri, ""))
}

#[inline]
pub(crate) fn join_query(mut uri: String, query: &str) -> String {
    if query.is_empty() {
        return uri;
    }
    match uri.contains('?') {
        true => uri.push('&'),
        false => uri.push('?'),
    }
    uri.push_str(query);
    uri
}

/// Escape a backreference value for the `B` flag.
#[inline]
pub(crate) fn escape_backreference(value: &str) -> String {
    utf8_percent_encode(value, NON_ALPHANUMERIC).to_string()
}

/// Escape a redirect target, leaving uri delimiters intact.
#[inline]
pub(crate) fn escape_redirect(uri: &str) -> String {
    utf8_percent_encode(uri, REDIRECT).to_string()
}
