use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use config::error::ConfigError;
use host::Host;


/// A TCP port with `0` reserved as the "unspecified" sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Port(u16);

pub const HTTP_PORT: Port = Port(80);

impl Port {
    pub fn new(value: u16) -> Port {
        Port(value)
    }
    pub fn unspecified() -> Port {
        Port(0)
    }
    pub fn is_unspecified(&self) -> bool {
        self.0 == 0
    }
    pub fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One `listen` endpoint of a server
///
/// Accepted string forms: `8080`, `:8080`, `1.2.3.4:80`, `[::1]:8080`,
/// `localhost`, `localhost:8081`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenDirective {
    host: Host,
    port: Port,
}

impl ListenDirective {
    pub fn new(host: Host, port: Port) -> Result<ListenDirective, ConfigError> {
        let directive = ListenDirective { host: host, port: port };
        directive.validate()?;
        Ok(directive)
    }

    pub fn parse(s: &str) -> Result<ListenDirective, ConfigError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ConfigError::BadListen("empty directive".to_string()));
        }
        // bare port: `8080` or `:8080`
        let bare = s.trim_left_matches(':');
        if !bare.is_empty() && bare.bytes().all(|b| b.is_ascii_digit()) {
            let port = parse_port(bare, s)?;
            return ListenDirective::new(Host::Wildcard, port);
        }
        // bracketed IPv6: `[::1]` or `[::1]:8080`
        if s.starts_with('[') {
            let close = s.find(']').ok_or_else(|| {
                ConfigError::BadListen(format!("unterminated '[' in {:?}", s))
            })?;
            let host = Host::parse(&s[1..close])?;
            if !host.is_ipv6() {
                return Err(ConfigError::BadListen(
                    format!("{:?} is not an IPv6 address", &s[1..close])));
            }
            let port = match &s[close+1..] {
                "" => HTTP_PORT,
                rest if rest.starts_with(':') => parse_port(&rest[1..], s)?,
                _ => return Err(ConfigError::BadListen(
                    format!("garbage after ']' in {:?}", s))),
            };
            return ListenDirective::new(host, port);
        }
        // host or host:port
        match s.rfind(':') {
            Some(pos) => {
                let host_part = &s[..pos];
                if host_part.contains(':') {
                    return Err(ConfigError::BadListen(
                        format!("IPv6 address must be bracketed in {:?}", s)));
                }
                let host = Host::parse(host_part)?;
                let port = parse_port(&s[pos+1..], s)?;
                ListenDirective::new(host, port)
            }
            None => ListenDirective::new(Host::parse(s)?, HTTP_PORT),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_wildcard() && self.port.is_unspecified() {
            return Err(ConfigError::BadListen(
                "wildcard host requires an explicit port".to_string()));
        }
        Ok(())
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn port(&self) -> Port {
        self.port
    }

    /// True when a connection accepted on `local` belongs to this
    /// directive (wildcard host matches any local address)
    pub fn matches(&self, local: &ListenDirective) -> bool {
        if self.port != local.port {
            return false;
        }
        self.host.is_wildcard() || local.host.is_wildcard()
            || self.host == local.host
    }

    /// Address to bind; hostnames other than `localhost` need resolving
    /// by the caller
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        let ip = match self.host {
            Host::Wildcard => IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            Host::Ipv4(addr) => IpAddr::V4(addr),
            Host::Ipv6(addr) => IpAddr::V6(addr),
            Host::Hostname(ref name) if name == "localhost" => {
                IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
            }
            Host::Hostname(_) => return None,
        };
        Some(SocketAddr::new(ip, self.port.value()))
    }

    /// The directive a freshly accepted connection was accepted on
    pub fn from_local_addr(addr: &SocketAddr) -> ListenDirective {
        let host = match addr.ip() {
            IpAddr::V4(ip) if ip == Ipv4Addr::new(0, 0, 0, 0) => Host::Wildcard,
            IpAddr::V4(ip) => Host::Ipv4(ip),
            IpAddr::V6(ip) if ip == Ipv6Addr::from([0u8; 16]) => Host::Wildcard,
            IpAddr::V6(ip) => Host::Ipv6(ip),
        };
        ListenDirective { host: host, port: Port(addr.port()) }
    }
}

fn parse_port(digits: &str, whole: &str) -> Result<Port, ConfigError> {
    digits.parse::<u16>()
        .map(Port)
        .map_err(|_| ConfigError::BadListen(
            format!("invalid port in {:?}", whole)))
}

impl fmt::Display for ListenDirective {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.host.is_ipv6() {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod test {
    use host::Host;
    use super::ListenDirective;

    #[test]
    fn string_forms() {
        let d = ListenDirective::parse("8080").unwrap();
        assert!(d.host().is_wildcard());
        assert_eq!(d.port().value(), 8080);

        let d = ListenDirective::parse(":8080").unwrap();
        assert_eq!(d.port().value(), 8080);

        let d = ListenDirective::parse("1.2.3.4:80").unwrap();
        assert_matches!(*d.host(), Host::Ipv4(_));
        assert_eq!(d.port().value(), 80);

        let d = ListenDirective::parse("[::1]:8080").unwrap();
        assert!(d.host().is_ipv6());
        assert_eq!(d.port().value(), 8080);

        let d = ListenDirective::parse("localhost").unwrap();
        assert_eq!(*d.host(), Host::Hostname("localhost".to_string()));
        assert_eq!(d.port().value(), 80);
    }

    #[test]
    fn rejects() {
        assert!(ListenDirective::parse("").is_err());
        assert!(ListenDirective::parse("99999").is_err());
        assert!(ListenDirective::parse("host:name:80").is_err());
        assert!(ListenDirective::parse("[::1").is_err());
        assert!(ListenDirective::parse("[1.2.3.4]:80").is_err());
        // wildcard with unspecified port
        assert!(ListenDirective::parse(":0").is_err());
    }

    #[test]
    fn matching() {
        let wild = ListenDirective::parse("8080").unwrap();
        let local = ListenDirective::parse("127.0.0.1:8080").unwrap();
        let other_port = ListenDirective::parse("127.0.0.1:9090").unwrap();
        assert!(wild.matches(&local));
        assert!(local.matches(&local));
        assert!(!wild.matches(&other_port));
    }

    #[test]
    fn bind_addresses() {
        let d = ListenDirective::parse("localhost:8080").unwrap();
        assert_eq!(d.socket_addr().unwrap().to_string(), "127.0.0.1:8080");
        let d = ListenDirective::parse("8081").unwrap();
        assert_eq!(d.socket_addr().unwrap().to_string(), "0.0.0.0:8081");
    }
}
