use std::fmt;
use std::str::FromStr;


/// Request method
///
/// Only the nine methods of RFC 7231/5789 parse successfully; anything
/// else is a parse error rather than a variant, so a `Method` value is
/// always a known method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Trace,
    Connect,
    Patch,
}

/// Version of HTTP protocol
///
/// Only 1.0 and 1.1 are representable. `HTTP/2.0` and other versions are
/// recognized syntactically by the parser and rejected with a protocol
/// error before a `Version` is ever constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Version {
    Http10,
    Http11,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        use self::Method::*;
        match *self {
            Get => "GET",
            Post => "POST",
            Put => "PUT",
            Delete => "DELETE",
            Head => "HEAD",
            Options => "OPTIONS",
            Trace => "TRACE",
            Connect => "CONNECT",
            Patch => "PATCH",
        }
    }
}

impl FromStr for Method {
    type Err = ();
    /// Case-sensitive: `get` is not a method on the wire
    fn from_str(s: &str) -> Result<Method, ()> {
        use self::Method::*;
        match s {
            "GET" => Ok(Get),
            "POST" => Ok(Post),
            "PUT" => Ok(Put),
            "DELETE" => Ok(Delete),
            "HEAD" => Ok(Head),
            "OPTIONS" => Ok(Options),
            "TRACE" => Ok(Trace),
            "CONNECT" => Ok(Connect),
            "PATCH" => Ok(Patch),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Version {
    pub fn as_str(&self) -> &'static str {
        match *self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
    pub fn major(&self) -> u8 { 1 }
    pub fn minor(&self) -> u8 {
        match *self {
            Version::Http10 => 0,
            Version::Http11 => 1,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod test {
    use super::{Method, Version};

    #[test]
    fn method_parse_is_case_sensitive() {
        assert_eq!("GET".parse::<Method>(), Ok(Method::Get));
        assert_eq!("DELETE".parse::<Method>(), Ok(Method::Delete));
        assert!("get".parse::<Method>().is_err());
        assert!("Get".parse::<Method>().is_err());
        assert!("BREW".parse::<Method>().is_err());
    }

    #[test]
    fn version_text() {
        assert_eq!(Version::Http10.as_str(), "HTTP/1.0");
        assert_eq!(Version::Http11.as_str(), "HTTP/1.1");
        assert_eq!(Version::Http11.minor(), 1);
    }
}
