use enums::{Method, Version};
use query::QueryString;


/// A fully parsed inbound request
///
/// Header names are stored lowercased; a duplicate header appends to
/// the previous value with a comma, so lookups never miss a repeated
/// field. The path is percent-decoded and dot-normalized, the raw query
/// is kept next to its decoded form for CGI.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: Method,
    path: String,
    raw_query: String,
    query: QueryString,
    version: Version,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: Method, path: String, raw_query: String,
               version: Version)
        -> HttpRequest
    {
        let query = QueryString::decode(&raw_query);
        HttpRequest {
            method: method,
            path: path,
            raw_query: raw_query,
            query: query,
            version: version,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Decoded, normalized request path (always starts with `/`)
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The query exactly as it appeared on the request line
    pub fn raw_query(&self) -> &str {
        &self.raw_query
    }

    pub fn query(&self) -> &QueryString {
        &self.query
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn add_header(&mut self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        let value = value.trim();
        if let Some(&mut (_, ref mut existing)) = self.headers.iter_mut()
            .find(|&&mut (ref n, _)| *n == name)
        {
            existing.push_str(", ");
            existing.push_str(value);
            return;
        }
        self.headers.push((name, value.to_string()));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers.iter()
            .find(|&&(ref n, _)| *n == name)
            .map(|&(_, ref v)| &v[..])
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Host header without the optional `:port`
    pub fn host(&self) -> Option<&str> {
        self.header("host").map(|h| {
            if h.starts_with('[') {
                // bracketed IPv6 literal
                h.split(']').next().map(|s| &s[1..]).unwrap_or(h)
            } else {
                h.split(':').next().unwrap_or(h)
            }
        })
    }

    /// Port from the Host header, if spelled there
    pub fn host_port(&self) -> Option<u16> {
        self.header("host")
            .and_then(|h| h.rsplit(':').next())
            .and_then(|p| p.parse().ok())
    }

    pub fn set_body(&mut self, body: Vec<u8>) {
        self.body = body;
    }

    pub fn append_body(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }

    /// Keep-alive policy: HTTP/1.1 stays open unless `Connection:
    /// close`; HTTP/1.0 closes unless `Connection: keep-alive`
    pub fn is_keep_alive(&self) -> bool {
        let connection = self.header("connection").unwrap_or("");
        let mut tokens = connection.split(',').map(|t| t.trim());
        match self.version {
            Version::Http11 => {
                !tokens.any(|t| t.eq_ignore_ascii_case("close"))
            }
            Version::Http10 => {
                tokens.any(|t| t.eq_ignore_ascii_case("keep-alive"))
            }
        }
    }
}
