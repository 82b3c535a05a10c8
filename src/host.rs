use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;


/// Maximum length of a full hostname (RFC 1035)
const MAX_HOST_LENGTH: usize = 253;
/// Maximum length of a single hostname label
const MAX_LABEL_LENGTH: usize = 63;

quick_error! {
    #[derive(Debug, PartialEq)]
    pub enum HostError {
        Empty {
            display("host is empty")
        }
        TooLong(len: usize) {
            display("host is {} characters long (max {})",
                    len, MAX_HOST_LENGTH)
        }
        BadLabel(label: String) {
            display("invalid hostname label {:?}", label)
        }
        BadAddress(addr: String) {
            display("invalid address {:?}", addr)
        }
    }
}

/// A validated host: an address, a hostname or the `*` wildcard
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Host {
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Hostname(String),
    Wildcard,
}

impl Host {
    pub fn wildcard() -> Host {
        Host::Wildcard
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(*self, Host::Wildcard)
    }

    pub fn is_ipv6(&self) -> bool {
        matches!(*self, Host::Ipv6(_))
    }

    /// Parses `*`, dotted IPv4, bracketless IPv6 or a hostname
    ///
    /// Hostnames are validated per RFC 1035: length limits, letters,
    /// digits and hyphens per label, no empty labels (which also rules
    /// out leading/trailing dots and `..`).
    pub fn parse(s: &str) -> Result<Host, HostError> {
        if s.is_empty() {
            return Err(HostError::Empty);
        }
        if s == "*" || s == "0.0.0.0" {
            return Ok(Host::Wildcard);
        }
        if s.len() > MAX_HOST_LENGTH {
            return Err(HostError::TooLong(s.len()));
        }
        if let Ok(addr) = s.parse::<Ipv4Addr>() {
            return Ok(Host::Ipv4(addr));
        }
        if s.contains(':') {
            return s.parse::<Ipv6Addr>().map(Host::Ipv6)
                .map_err(|_| HostError::BadAddress(s.to_string()));
        }
        for label in s.split('.') {
            if !valid_label(label) {
                return Err(HostError::BadLabel(label.to_string()));
            }
        }
        Ok(Host::Hostname(s.to_ascii_lowercase()))
    }
}

fn valid_label(label: &str) -> bool {
    if label.is_empty() || label.len() > MAX_LABEL_LENGTH {
        return false;
    }
    if label.starts_with('-') || label.ends_with('-') {
        return false;
    }
    label.bytes().all(|b| {
        b == b'-' || (b >= b'0' && b <= b'9') ||
        (b >= b'a' && b <= b'z') || (b >= b'A' && b <= b'Z')
    })
}

impl FromStr for Host {
    type Err = HostError;
    fn from_str(s: &str) -> Result<Host, HostError> {
        Host::parse(s)
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Host::Ipv4(ref a) => write!(f, "{}", a),
            Host::Ipv6(ref a) => write!(f, "{}", a),
            Host::Hostname(ref h) => f.write_str(h),
            Host::Wildcard => f.write_str("0.0.0.0"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Host, HostError};

    #[test]
    fn addresses() {
        assert_matches!(Host::parse("127.0.0.1"), Ok(Host::Ipv4(_)));
        assert_matches!(Host::parse("::1"), Ok(Host::Ipv6(_)));
        assert_matches!(Host::parse("*"), Ok(Host::Wildcard));
        assert_matches!(Host::parse("0.0.0.0"), Ok(Host::Wildcard));
        assert_matches!(Host::parse("1:2:3:zz::"), Err(HostError::BadAddress(_)));
    }

    #[test]
    fn hostnames() {
        assert_eq!(Host::parse("LocalHost").unwrap(),
                   Host::Hostname("localhost".to_string()));
        assert_matches!(Host::parse("example.com"), Ok(Host::Hostname(_)));
        assert_matches!(Host::parse(""), Err(HostError::Empty));
        assert_matches!(Host::parse("exa mple"), Err(HostError::BadLabel(_)));
        assert_matches!(Host::parse(".example.com"),
                        Err(HostError::BadLabel(_)));
        assert_matches!(Host::parse("example..com"),
                        Err(HostError::BadLabel(_)));
        assert_matches!(Host::parse("example.com."),
                        Err(HostError::BadLabel(_)));
        assert_matches!(Host::parse("-bad.com"), Err(HostError::BadLabel(_)));
    }

    #[test]
    fn length_limits() {
        let label = ::std::iter::repeat('a').take(64).collect::<String>();
        assert_matches!(Host::parse(&label), Err(HostError::BadLabel(_)));
        let long = ::std::iter::repeat("abcd.").take(51).collect::<String>()
            + "com";
        assert!(long.len() > 253);
        assert_matches!(Host::parse(&long), Err(HostError::TooLong(_)));
    }
}
