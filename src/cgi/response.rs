use std::collections::BTreeMap;

use cgi::CgiError;
use server::response::HttpResponse;
use status;
use status::StatusCode;


/// Parsed output of a CGI script
///
/// The header section ends at the first `\r\n\r\n` or `\n\n`; three
/// pseudo-headers shape the HTTP response: `Status:` (default 200),
/// `Location:` (implies 302 when no Status is given) and
/// `Content-Type:` (defaults to `text/html` unless the script
/// redirects). Everything after the separator is the body, byte for
/// byte.
#[derive(Debug, Clone)]
pub struct CgiResponse {
    headers: BTreeMap<String, String>,
    body: Vec<u8>,
    status: Option<StatusCode>,
    location: Option<String>,
    content_type: Option<String>,
}

impl CgiResponse {
    pub fn parse(raw: &[u8]) -> Result<CgiResponse, CgiError> {
        if raw.is_empty() {
            return Err(CgiError::EmptyOutput);
        }
        let (header_len, separator_len) = find_separator(raw)
            .ok_or(CgiError::MissingSeparator)?;
        let header_text = String::from_utf8_lossy(&raw[..header_len]);

        let mut headers = BTreeMap::new();
        for line in header_text.split('\n') {
            let line = line.trim_right_matches('\r');
            if line.is_empty() {
                continue;
            }
            let colon = match line.find(':') {
                Some(pos) => pos,
                None => continue,
            };
            let name = line[..colon].trim();
            let value = line[colon+1..].trim();
            if !valid_header_name(name) {
                continue;
            }
            headers.insert(name.to_ascii_lowercase(), value.to_string());
        }

        let status = headers.get("status")
            .and_then(|value| parse_status(value));
        let location = headers.get("location").cloned();
        let content_type = headers.get("content-type").cloned();

        Ok(CgiResponse {
            headers: headers,
            body: raw[header_len + separator_len..].to_vec(),
            status: status,
            location: location,
            content_type: content_type,
        })
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_ref().map(|s| &s[..])
    }

    pub fn content_type(&self) -> &str {
        self.content_type.as_ref().map(|s| &s[..]).unwrap_or("text/html")
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Shapes the HTTP response the way the pseudo-headers ask
    pub fn to_http_response(&self) -> HttpResponse {
        let status = match (self.status, &self.location) {
            (Some(status), _) => status,
            (None, &Some(_)) => status::FOUND,
            (None, &None) => status::OK,
        };
        let mut response = HttpResponse::new(status);
        for (name, value) in &self.headers {
            match &name[..] {
                "status" | "location" | "content-type" => {}
                _ => response.set_header(name, value),
            }
        }
        response.set_header("Content-Type", self.content_type());
        if let Some(ref location) = self.location {
            response.set_header("Location", location);
        }
        response.set_body(self.body.clone());
        response
    }
}

/// Position and width of the first `\r\n\r\n` or `\n\n`
fn find_separator(data: &[u8]) -> Option<(usize, usize)> {
    for i in 0..data.len() {
        if data[i..].starts_with(b"\r\n\r\n") {
            return Some((i, 4));
        }
        if data[i..].starts_with(b"\n\n") {
            return Some((i, 2));
        }
    }
    None
}

fn valid_header_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| {
        b == b'-' || b == b'_' || (b >= b'0' && b <= b'9') ||
        (b >= b'a' && b <= b'z') || (b >= b'A' && b <= b'Z')
    })
}

/// Leading integer of `NNN reason`, kept only when in range
fn parse_status(value: &str) -> Option<StatusCode> {
    let digits = value.split_whitespace().next()?;
    digits.parse::<u16>().ok().and_then(StatusCode::new)
}

#[cfg(test)]
mod test {
    use cgi::CgiError;
    use super::CgiResponse;

    #[test]
    fn pseudo_headers() {
        let response = CgiResponse::parse(
            b"Status: 404 Not Found\r\nContent-Type: text/plain\r\n\
              X-Script: yes\r\n\r\nmissing").unwrap();
        assert_eq!(response.status().unwrap().as_u16(), 404);
        assert_eq!(response.content_type(), "text/plain");
        assert_eq!(response.body(), b"missing");
        let http = response.to_http_response();
        assert_eq!(http.status().as_u16(), 404);
        assert_eq!(http.header("X-Script"), Some("yes"));
    }

    #[test]
    fn location_implies_found() {
        let response = CgiResponse::parse(
            b"Location: /elsewhere\n\nbody").unwrap();
        let http = response.to_http_response();
        assert_eq!(http.status().as_u16(), 302);
        assert_eq!(http.header("Location"), Some("/elsewhere"));
        // explicit status wins over the implied 302
        let response = CgiResponse::parse(
            b"Status: 301\r\nLocation: /moved\r\n\r\n").unwrap();
        assert_eq!(response.to_http_response().status().as_u16(), 301);
    }

    #[test]
    fn defaults() {
        let response = CgiResponse::parse(
            b"Content-Type: text/plain\r\n\r\nHELLO").unwrap();
        let http = response.to_http_response();
        assert_eq!(http.status().as_u16(), 200);
        assert_eq!(http.body(), b"HELLO");
        // no content type at all: text/html
        let response = CgiResponse::parse(b"X-Other: 1\n\n<p>hi</p>").unwrap();
        assert_eq!(response.content_type(), "text/html");
    }

    #[test]
    fn lflf_separator_and_exact_body() {
        let response = CgiResponse::parse(
            b"Content-Type: application/octet-stream\n\n\x00\x01\r\n\x02")
            .unwrap();
        assert_eq!(response.body(), b"\x00\x01\r\n\x02");
    }

    #[test]
    fn bad_output() {
        assert_matches!(CgiResponse::parse(b""),
                        Err(CgiError::EmptyOutput));
        assert_matches!(CgiResponse::parse(b"no separator here"),
                        Err(CgiError::MissingSeparator));
    }

    #[test]
    fn garbage_lines_are_skipped() {
        let response = CgiResponse::parse(
            b"Content-Type: text/plain\r\nnot a header line\r\n\
              Bad Name!: x\r\n\r\nok").unwrap();
        assert_eq!(response.body(), b"ok");
        assert_eq!(response.content_type(), "text/plain");
    }

    #[test]
    fn out_of_range_status_is_ignored() {
        let response = CgiResponse::parse(
            b"Status: 999\r\nContent-Type: text/plain\r\n\r\n").unwrap();
        assert!(response.status().is_none());
        assert_eq!(response.to_http_response().status().as_u16(), 200);
    }
}
