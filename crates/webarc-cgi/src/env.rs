//! CGI environment synthesis.
//!
//! The child interpreter never inherits the full parent environment or
//! arbitrary client headers; both pass through constant allow-lists so
//! the security posture stays auditable.

use crate::request::CgiRequest;

/// Request headers forwarded to the script as `HTTP_*` variables.
/// Everything else a client sends is dropped.
pub const FORWARDED_HEADERS: &[&str] = &[
    "accept",
    "accept-charset",
    "accept-encoding",
    "accept-language",
    "cache-control",
    "cookie",
    "host",
    "pragma",
    "range",
    "referer",
    "user-agent",
];

/// Parent environment variables the interpreter may inherit.
pub const INHERITED_ENV: &[&str] = &[
    "PATH",
    "TEMP",
    "TMP",
    "TMPDIR",
    "LANG",
    "LC_ALL",
    "LC_CTYPE",
    "SYSTEMROOT",
    "WINDIR",
    "COMSPEC",
];

/// Drop query-string segments that an interpreter could reinterpret as
/// command-line flags: any `&`-delimited segment without an `=` that
/// begins with `-` or its URL-encoded form. Returns the filtered string
/// and the number of dropped segments.
pub fn filter_query(query: &str) -> (String, usize) {
    if query.is_empty() {
        return (String::new(), 0);
    }
    let mut kept = Vec::new();
    let mut dropped = 0usize;
    for segment in query.split('&') {
        let is_flag_like = !segment.contains('=')
            && (segment.starts_with('-')
                || segment.starts_with("%2d")
                || segment.starts_with("%2D"));
        if is_flag_like {
            dropped += 1;
        } else {
            kept.push(segment);
        }
    }
    (kept.join("&"), dropped)
}

/// Synthesize the CGI/1.1 variable set for one request.
///
/// `script_filename` is the symlink-resolved on-disk path; `query` must
/// already be filtered. The executor is only ever reached through the
/// trusted local proxy, so `REMOTE_ADDR` is pinned to loopback.
pub fn cgi_vars(
    request: &CgiRequest,
    script_filename: &str,
    query: &str,
) -> Vec<(String, String)> {
    let mut vars = vec![
        ("GATEWAY_INTERFACE".into(), "CGI/1.1".into()),
        ("SERVER_PROTOCOL".into(), "HTTP/1.1".into()),
        ("SERVER_SOFTWARE".into(), "webarc".into()),
        ("REQUEST_METHOD".into(), request.method.clone()),
        ("SCRIPT_NAME".into(), request.script_name.clone()),
        ("SCRIPT_FILENAME".into(), script_filename.into()),
        ("QUERY_STRING".into(), query.into()),
        ("REMOTE_ADDR".into(), "127.0.0.1".into()),
        // php-cgi refuses to run without force-redirect context.
        ("REDIRECT_STATUS".into(), "1".into()),
    ];

    if let Some(body) = &request.body {
        vars.push(("CONTENT_LENGTH".into(), body.len().to_string()));
        if let Some(content_type) = request.header("content-type") {
            // CR/LF never reaches the environment: header-injection guard.
            let sanitized: String = content_type
                .chars()
                .filter(|c| *c != '\r' && *c != '\n')
                .collect();
            vars.push(("CONTENT_TYPE".into(), sanitized));
        }
    }

    for (name, value) in &request.headers {
        let lower = name.to_ascii_lowercase();
        if FORWARDED_HEADERS.contains(&lower.as_str()) {
            let env_name = format!("HTTP_{}", lower.to_ascii_uppercase().replace('-', "_"));
            vars.push((env_name, value.clone()));
        }
    }

    vars
}

/// The parent environment entries allowed through to the child.
pub fn inherited_vars() -> Vec<(String, String)> {
    INHERITED_ENV
        .iter()
        .filter_map(|name| std::env::var(name).ok().map(|v| (name.to_string(), v)))
        .collect()
}
