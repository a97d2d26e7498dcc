use percent_encoding::percent_decode_str;
use url::Url;

/// A content request reduced to the `hostname/path` form every tier
/// resolves against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestKey {
    /// Hostname with any `:port` suffix stripped.
    pub host: String,
    /// Decoded path, no leading slash.
    pub path: String,
    /// Decoded query string, empty when absent.
    pub query: String,
}

impl RequestKey {
    /// The relative lookup key, `hostname/path`.
    pub fn relative(&self) -> String {
        format!("{}/{}", self.host, self.path)
    }
}

/// Normalize a request target to a [`RequestKey`].
///
/// Three shapes are accepted, matching how legacy clients address the
/// server: a plain path (hostname taken from the Host header), a full
/// proxy-style absolute URL, and an absolute URL tucked behind a leading
/// slash. Path and query are percent-decoded because the legacy server
/// historically decoded before filesystem lookup.
pub fn request_key(target: &str, host_header: Option<&str>) -> Option<RequestKey> {
    let absolute = target
        .strip_prefix('/')
        .filter(|rest| is_absolute(rest))
        .unwrap_or(target);

    if is_absolute(absolute) {
        let url = Url::parse(absolute).ok()?;
        let host = url.host_str()?.to_string();
        return Some(RequestKey {
            host,
            path: decode(url.path().trim_start_matches('/')),
            query: decode(url.query().unwrap_or("")),
        });
    }

    let host = strip_port(host_header?);
    if host.is_empty() {
        return None;
    }
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, query),
        None => (target, ""),
    };
    Some(RequestKey {
        host: host.to_string(),
        path: decode(path.trim_start_matches('/')),
        query: decode(query),
    })
}

fn is_absolute(target: &str) -> bool {
    target.starts_with("http://") || target.starts_with("https://")
}

fn strip_port(host: &str) -> &str {
    host.split(':').next().unwrap_or(host)
}

fn decode(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_path_uses_host_header() {
        let key = request_key("/games/page.html?a=1", Some("example.com:8080")).unwrap();
        assert_eq!(key.host, "example.com");
        assert_eq!(key.path, "games/page.html");
        assert_eq!(key.query, "a=1");
        assert_eq!(key.relative(), "example.com/games/page.html");
    }

    #[test]
    fn absolute_url_form() {
        let key = request_key("http://example.com:80/dir/file.swf", None).unwrap();
        assert_eq!(key.host, "example.com");
        assert_eq!(key.path, "dir/file.swf");
        assert_eq!(key.query, "");
    }

    #[test]
    fn slash_prefixed_absolute_url_form() {
        let key = request_key("/http://example.com/dir/file.swf?id=2", None).unwrap();
        assert_eq!(key.relative(), "example.com/dir/file.swf");
        assert_eq!(key.query, "id=2");
    }

    #[test]
    fn percent_encoding_is_decoded() {
        let key = request_key("/some%20dir/file%2Bname.html", Some("h.com")).unwrap();
        assert_eq!(key.path, "some dir/file+name.html");
    }

    #[test]
    fn missing_host_is_rejected() {
        assert!(request_key("/file.html", None).is_none());
        assert!(request_key("/file.html", Some("")).is_none());
    }
}
