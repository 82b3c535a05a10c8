use std::fmt;

use url::Url;

use path::Path;


quick_error! {
    #[derive(Debug)]
    pub enum UriError {
        Empty {
            display("uri is empty")
        }
        Parse(err: ::url::ParseError) {
            from()
            display("invalid uri: {}", err)
        }
        BadPath(err: ::path::PathError) {
            from()
            display("invalid uri path: {}", err)
        }
    }
}

/// A request or redirect target
///
/// Either absolute (`scheme://host[:port]/path?query#fragment`, parsed
/// with the `url` crate) or origin-form (`/path?query`). The scheme is
/// stored lowercased and the path of an absolute http(s) URI defaults
/// to `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    scheme: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    path: String,
    query: Option<String>,
    fragment: Option<String>,
}

impl Uri {
    pub fn parse(s: &str) -> Result<Uri, UriError> {
        if s.is_empty() {
            return Err(UriError::Empty);
        }
        if s.contains("://") {
            let url = Url::parse(s)?;
            return Ok(Uri {
                scheme: Some(url.scheme().to_string()),
                host: url.host_str().map(|h| h.to_string()),
                port: url.port(),
                path: url.path().to_string(),
                query: url.query().map(|q| q.to_string()),
                fragment: url.fragment().map(|f| f.to_string()),
            });
        }
        let (rest, fragment) = split_once(s, '#');
        let (path, query) = split_once(rest, '?');
        Path::parse_absolute(path)?;
        Ok(Uri {
            scheme: None,
            host: None,
            port: None,
            path: path.to_string(),
            query: query.map(|q| q.to_string()),
            fragment: fragment.map(|f| f.to_string()),
        })
    }

    pub fn is_absolute(&self) -> bool {
        self.scheme.is_some()
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_ref().map(|s| &s[..])
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_ref().map(|h| &h[..])
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_ref().map(|q| &q[..])
    }

    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_ref().map(|f| &f[..])
    }

    /// Same URI with `.`/`..` removed from the path (never above root)
    pub fn normalize(&self) -> Uri {
        let mut normalized = self.clone();
        if let Ok(path) = Path::parse(&self.path) {
            normalized.path = path.normalize().as_str().to_string();
        }
        normalized
    }
}

fn split_once(s: &str, delimiter: char) -> (&str, Option<&str>) {
    match s.find(delimiter) {
        Some(pos) => (&s[..pos], Some(&s[pos+1..])),
        None => (s, None),
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(ref scheme) = self.scheme {
            write!(f, "{}://", scheme)?;
            if let Some(ref host) = self.host {
                f.write_str(host)?;
            }
            if let Some(port) = self.port {
                write!(f, ":{}", port)?;
            }
        }
        f.write_str(&self.path)?;
        if let Some(ref query) = self.query {
            write!(f, "?{}", query)?;
        }
        if let Some(ref fragment) = self.fragment {
            write!(f, "#{}", fragment)?;
        }
        Ok(())
    }
}
