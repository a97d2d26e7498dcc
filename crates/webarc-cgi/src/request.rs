use bytes::Bytes;

/// One script invocation's input. Transient; built by the frontend from
/// the incoming HTTP request.
#[derive(Clone, Debug, Default)]
pub struct CgiRequest {
    pub method: String,
    /// URL path of the script as the client addressed it.
    pub script_name: String,
    /// Raw query string, unfiltered. The executor applies the
    /// argument-injection filter before it reaches the child.
    pub query: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl CgiRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
