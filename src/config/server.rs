use std::collections::BTreeMap;

use config::error::ConfigError;
use config::listen::ListenDirective;
use config::location::LocationConfig;
use config::HARD_MAX_BODY_SIZE;
use path::Path;
use size::Size;
use status::StatusCode;
use uri::Uri;


/// One virtual host: a `server` block
#[derive(Debug, Clone)]
pub struct ServerConfig {
    listens: Vec<ListenDirective>,
    server_names: Vec<String>,
    root: Option<Path>,
    index_files: Vec<String>,
    error_pages: BTreeMap<u16, String>,
    client_max_body_size: Option<Size>,
    return_redirect: Option<(StatusCode, Uri)>,
    return_content: Option<(StatusCode, String)>,
    locations: Vec<LocationConfig>,
}

impl ServerConfig {
    pub fn new() -> ServerConfig {
        ServerConfig {
            listens: Vec::new(),
            server_names: Vec::new(),
            root: None,
            index_files: Vec::new(),
            error_pages: BTreeMap::new(),
            client_max_body_size: None,
            return_redirect: None,
            return_content: None,
            locations: Vec::new(),
        }
    }

    pub fn listen(mut self, directive: ListenDirective) -> ServerConfig {
        self.listens.push(directive);
        self
    }

    pub fn server_name(mut self, name: &str) -> ServerConfig {
        self.server_names.push(name.to_ascii_lowercase());
        self
    }

    pub fn root(mut self, root: Path) -> ServerConfig {
        self.root = Some(root);
        self
    }

    pub fn index(mut self, name: &str) -> ServerConfig {
        self.index_files.push(name.to_string());
        self
    }

    pub fn error_page(mut self, code: StatusCode, uri: &str) -> ServerConfig {
        self.error_pages.insert(code.as_u16(), uri.to_string());
        self
    }

    pub fn client_max_body_size(mut self, size: Size) -> ServerConfig {
        self.client_max_body_size = Some(size);
        self
    }

    pub fn return_redirect(mut self, code: StatusCode, target: Uri)
        -> ServerConfig
    {
        self.return_redirect = Some((code, target));
        self
    }

    pub fn return_content(mut self, code: StatusCode, body: &str)
        -> ServerConfig
    {
        self.return_content = Some((code, body.to_string()));
        self
    }

    pub fn location(mut self, location: LocationConfig) -> ServerConfig {
        self.locations.push(location);
        self
    }

    pub fn get_listens(&self) -> &[ListenDirective] { &self.listens }
    pub fn get_server_names(&self) -> &[String] { &self.server_names }
    pub fn get_root(&self) -> Option<&Path> { self.root.as_ref() }
    pub fn get_index_files(&self) -> &[String] { &self.index_files }
    pub fn get_error_page(&self, code: StatusCode) -> Option<&str> {
        self.error_pages.get(&code.as_u16()).map(|s| &s[..])
    }
    pub fn get_client_max_body_size(&self) -> Option<Size> {
        self.client_max_body_size
    }
    pub fn get_return_redirect(&self) -> Option<&(StatusCode, Uri)> {
        self.return_redirect.as_ref()
    }
    pub fn get_return_content(&self) -> Option<&(StatusCode, String)> {
        self.return_content.as_ref()
    }
    pub fn get_locations(&self) -> &[LocationConfig] { &self.locations }

    /// Does any listen of this server cover the accepting endpoint?
    pub fn matches_listen(&self, local: &ListenDirective) -> bool {
        self.listens.iter().any(|l| l.matches(local))
    }

    /// Does `host` (no port, any case) match one of the server names?
    ///
    /// Wildcard names are `*.suffix`; they match one or more leading
    /// labels but not the bare suffix.
    pub fn matches_server_name(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.server_names.iter().any(|name| {
            if let Some(suffix) = wildcard_suffix(name) {
                host.ends_with(suffix) && host.len() > suffix.len()
            } else {
                *name == host
            }
        })
    }

    /// The catch-all server: no names at all, or a literal `*` name
    pub fn is_default(&self) -> bool {
        self.server_names.is_empty() ||
            self.server_names.iter().any(|n| n == "*")
    }

    pub fn has_listen_on_port(&self, port: u16) -> bool {
        self.listens.iter().any(|l| l.port().value() == port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listens.is_empty() {
            return Err(ConfigError::NoListen);
        }
        if self.locations.is_empty() && self.root.is_none() &&
            self.return_redirect.is_none() && self.return_content.is_none()
        {
            return Err(ConfigError::EmptyServer);
        }
        for name in &self.server_names {
            if !valid_server_name(name) {
                return Err(ConfigError::BadServerName(name.clone()));
            }
        }
        if let Some(size) = self.client_max_body_size {
            if size.bytes() > HARD_MAX_BODY_SIZE {
                return Err(ConfigError::BodySizeTooLarge(
                    size.bytes(), HARD_MAX_BODY_SIZE));
            }
        }
        if let Some(&(code, _)) = self.return_redirect.as_ref() {
            if !code.is_redirect() {
                return Err(ConfigError::BadReturnCode(code.as_u16()));
            }
        }
        for uri in self.error_pages.values() {
            if !uri.starts_with('/') {
                return Err(ConfigError::BadErrorPage(uri.clone()));
            }
        }
        for location in &self.locations {
            location.validate()?;
            if let Some(size) = location.get_client_max_body_size() {
                if size.bytes() > HARD_MAX_BODY_SIZE {
                    return Err(ConfigError::BodySizeTooLarge(
                        size.bytes(), HARD_MAX_BODY_SIZE));
                }
            }
            // a location must be able to resolve a filesystem root unless
            // it answers from config alone
            let answers_inline = location.get_return_redirect().is_some() ||
                location.get_return_content().is_some() ||
                location.get_proxy_pass().is_some();
            if !answers_inline && location.get_root().is_none() &&
                location.get_alias().is_none() && self.root.is_none()
            {
                return Err(ConfigError::MissingRoot(
                    location.get_pattern().to_string()));
            }
        }
        Ok(())
    }
}

/// Do two server-name sets overlap, including `*.suffix` wildcards?
pub fn names_overlap(left: &[String], right: &[String]) -> bool {
    left.iter().any(|a| right.iter().any(|b| name_overlaps(a, b)))
}

fn name_overlaps(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    match (wildcard_suffix(a), wildcard_suffix(b)) {
        (Some(sa), Some(sb)) => sa.ends_with(sb) || sb.ends_with(sa),
        (Some(sa), None) => b.ends_with(sa) && b.len() > sa.len(),
        (None, Some(sb)) => a.ends_with(sb) && a.len() > sb.len(),
        (None, None) => false,
    }
}

/// `*.example.com` → `.example.com`
fn wildcard_suffix(name: &str) -> Option<&str> {
    if name.starts_with("*.") {
        Some(&name[1..])
    } else {
        None
    }
}

fn valid_server_name(name: &str) -> bool {
    if name == "*" {
        return true;
    }
    let bare = if name.starts_with("*.") { &name[2..] } else { name };
    !bare.is_empty() && ::host::Host::parse(bare).is_ok()
}
