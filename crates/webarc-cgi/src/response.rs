use bytes::Bytes;

/// Content type used when a script emits no headers at all.
pub const DEFAULT_CONTENT_TYPE: &str = "text/html; charset=UTF-8";

/// Parsed output of one script invocation.
#[derive(Clone, Debug)]
pub struct CgiResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl CgiResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> &str {
        self.header("content-type").unwrap_or(DEFAULT_CONTENT_TYPE)
    }
}

/// Parse raw CGI stdout into status, headers, and body.
///
/// Headers end at the first `\r\n\r\n`; non-conforming scripts that emit
/// bare `\n\n` are accepted too. A `Status:` pseudo-header sets the
/// response code (default 200). Output without any separator is treated
/// as an all-body response with the default content type.
pub fn parse_output(output: &[u8]) -> CgiResponse {
    let (header_bytes, body) = match split_headers(output) {
        Some(parts) => parts,
        None => {
            return CgiResponse {
                status: 200,
                headers: vec![("Content-Type".into(), DEFAULT_CONTENT_TYPE.into())],
                body: Bytes::copy_from_slice(output),
            };
        }
    };

    let mut status = 200u16;
    let mut headers = Vec::new();
    for line in String::from_utf8_lossy(header_bytes).lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("status") {
            status = parse_status(value).unwrap_or(200);
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    CgiResponse {
        status,
        headers,
        body: Bytes::copy_from_slice(body),
    }
}

fn split_headers(output: &[u8]) -> Option<(&[u8], &[u8])> {
    if let Some(pos) = find(output, b"\r\n\r\n") {
        return Some((&output[..pos], &output[pos + 4..]));
    }
    find(output, b"\n\n").map(|pos| (&output[..pos], &output[pos + 2..]))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// `Status: 404 Not Found` carries the code before the reason phrase.
fn parse_status(value: &str) -> Option<u16> {
    value
        .split_whitespace()
        .next()?
        .parse::<u16>()
        .ok()
        .filter(|code| (100..=599).contains(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_status_and_headers() {
        let response =
            parse_output(b"Status: 404 Not Found\r\nContent-Type: text/plain\r\n\r\nBody");
        assert_eq!(response.status, 404);
        assert_eq!(response.header("Content-Type"), Some("text/plain"));
        assert_eq!(&response.body[..], b"Body");
    }

    #[test]
    fn defaults_to_200_without_status() {
        let response = parse_output(b"Content-Type: text/html\r\n\r\n<p>hi</p>");
        assert_eq!(response.status, 200);
        assert_eq!(&response.body[..], b"<p>hi</p>");
    }

    #[test]
    fn accepts_bare_lf_separator() {
        let response = parse_output(b"Content-Type: text/plain\n\nplain body");
        assert_eq!(response.header("Content-Type"), Some("text/plain"));
        assert_eq!(&response.body[..], b"plain body");
    }

    #[test]
    fn no_separator_means_all_body() {
        let response = parse_output(b"<html>raw output</html>");
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type(), DEFAULT_CONTENT_TYPE);
        assert_eq!(&response.body[..], b"<html>raw output</html>");
    }

    #[test]
    fn unparseable_status_falls_back_to_200() {
        let response = parse_output(b"Status: banana\r\n\r\nok");
        assert_eq!(response.status, 200);
    }

    #[test]
    fn malformed_header_lines_are_skipped() {
        let response = parse_output(b"NoColonHere\r\nX-Ok: yes\r\n\r\nbody");
        assert_eq!(response.header("X-Ok"), Some("yes"));
        assert_eq!(response.headers.len(), 1);
    }

    #[test]
    fn empty_body_after_separator() {
        let response = parse_output(b"Content-Type: text/plain\r\n\r\n");
        assert!(response.body.is_empty());
    }
}
