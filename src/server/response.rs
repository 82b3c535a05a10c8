use std::fmt::Write as FmtWrite;
use std::time::{SystemTime, UNIX_EPOCH};

use netbuf::Buf;
use time;

use enums::Version;
use status;
use status::StatusCode;


/// An outbound response under construction
///
/// Headers keep their insertion order; `set_header` replaces an
/// existing field case-insensitively, `add_header` always appends.
/// `serialize_into` writes the wire form and fills in the
/// `Content-Length`, `Date` and `Server` fields unless the handler
/// already set them.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: StatusCode,
    version: Version,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: StatusCode) -> HttpResponse {
        HttpResponse {
            status: status,
            version: Version::Http11,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_body(status: StatusCode, content_type: &str, body: Vec<u8>)
        -> HttpResponse
    {
        let mut response = HttpResponse::new(status);
        response.set_header("Content-Type", content_type);
        response.body = body;
        response
    }

    pub fn ok(content_type: &str, body: Vec<u8>) -> HttpResponse {
        HttpResponse::with_body(status::OK, content_type, body)
    }

    pub fn no_content() -> HttpResponse {
        HttpResponse::new(status::NO_CONTENT)
    }

    /// The built-in minimal error page
    ///
    /// Used whenever no configured `error_page` resolves to a readable
    /// file. Error responses never keep the connection alive.
    pub fn error(code: StatusCode) -> HttpResponse {
        let body = format!(
            "<html>\n<head><title>{code} {reason}</title></head>\n\
             <body>\n<center><h1>{code} {reason}</h1></center>\n\
             <hr><center>{server}</center>\n</body>\n</html>\n",
            code = code.as_u16(), reason = code.reason(),
            server = ::SERVER_SOFTWARE);
        let mut response = HttpResponse::with_body(
            code, "text/html", body.into_bytes());
        response.set_header("Connection", "close");
        response
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub fn set_header(&mut self, name: &str, value: &str) {
        if let Some(&mut (_, ref mut existing)) = self.headers.iter_mut()
            .find(|&&mut (ref n, _)| n.eq_ignore_ascii_case(name))
        {
            *existing = value.to_string();
            return;
        }
        self.headers.push((name.to_string(), value.to_string()));
    }

    pub fn add_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|&&(ref n, _)| n.eq_ignore_ascii_case(name))
            .map(|&(_, ref v)| &v[..])
    }

    pub fn set_body(&mut self, body: Vec<u8>) {
        self.body = body;
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Writes the status line, headers and body into `out`
    ///
    /// For a HEAD request the body bytes are discarded but
    /// `Content-Length` still reflects what the body would have been.
    pub fn serialize_into(&self, out: &mut Buf, is_head: bool) {
        let mut head = String::with_capacity(256);
        write!(head, "{} {} {}\r\n",
               self.version.as_str(),
               self.status.as_u16(),
               self.status.reason()).unwrap();
        for &(ref name, ref value) in &self.headers {
            write!(head, "{}: {}\r\n", name, value).unwrap();
        }
        if self.header("Content-Length").is_none() {
            write!(head, "Content-Length: {}\r\n", self.body.len()).unwrap();
        }
        if self.header("Date").is_none() {
            write!(head, "Date: {}\r\n", imf_fixdate_now()).unwrap();
        }
        if self.header("Server").is_none() {
            write!(head, "Server: {}\r\n", ::SERVER_SOFTWARE).unwrap();
        }
        head.push_str("\r\n");
        out.extend(head.as_bytes());
        if !is_head {
            out.extend(&self.body);
        }
    }
}

/// `Sun, 06 Nov 1994 08:49:37 GMT`
pub fn imf_fixdate_now() -> String {
    imf_fixdate(SystemTime::now())
}

pub fn imf_fixdate(when: SystemTime) -> String {
    let unix = match when.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs() as i64,
        Err(_) => 0,
    };
    let tm = time::at_utc(time::Timespec::new(unix, 0));
    time::strftime("%a, %d %b %Y %H:%M:%S GMT", &tm)
        .unwrap_or_else(|_| String::new())
}
