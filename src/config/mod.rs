//! The in-memory configuration model
//!
//! This is the contract the rest of the server programs against: an
//! `HttpConfig` owning `ServerConfig`s owning `LocationConfig`s, all
//! immutable once validated. How the tree is produced (config file,
//! test fixture, demo assembly in the binary) is out of scope here.

mod cgi;
mod error;
mod listen;
mod location;
mod server;
mod upload;

pub use self::cgi::CgiConfig;
pub use self::error::ConfigError;
pub use self::listen::{ListenDirective, Port};
pub use self::location::{LocationConfig, MatchType};
pub use self::server::ServerConfig;
pub use self::upload::UploadConfig;

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use size::Size;
use status::StatusCode;

use self::server::names_overlap;


/// Nothing ever accepts a body larger than this, configuration included
pub const HARD_MAX_BODY_SIZE: u64 = 10 << 20;
/// Body limit applied when neither location nor server configures one
pub const DEFAULT_MAX_BODY_SIZE: u64 = 1 << 20;
/// Idle limit while a request is being read or written
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// Idle limit between keep-alive requests
pub const DEFAULT_KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_WORKER_PROCESSES: u32 = 64;
const MAX_WORKER_CONNECTIONS: u32 = 65536;
const MAX_TIMEOUT: Duration = Duration::from_secs(3600);

/// Top of the configuration tree
#[derive(Debug, Clone)]
pub struct HttpConfig {
    worker_processes: u32,
    worker_connections: u32,
    keepalive_timeout: Duration,
    request_timeout: Duration,
    access_log: Option<PathBuf>,
    error_log: Option<PathBuf>,
    mime_types_path: Option<PathBuf>,
    client_max_body_size: Option<Size>,
    error_pages: BTreeMap<u16, String>,
    servers: Vec<ServerConfig>,
}

impl HttpConfig {
    pub fn new() -> HttpConfig {
        HttpConfig {
            worker_processes: 1,
            worker_connections: 1024,
            keepalive_timeout: DEFAULT_KEEPALIVE_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            access_log: None,
            error_log: None,
            mime_types_path: None,
            client_max_body_size: None,
            error_pages: BTreeMap::new(),
            servers: Vec::new(),
        }
    }

    pub fn worker_processes(mut self, count: u32) -> HttpConfig {
        self.worker_processes = count;
        self
    }

    pub fn worker_connections(mut self, count: u32) -> HttpConfig {
        self.worker_connections = count;
        self
    }

    pub fn keepalive_timeout(mut self, timeout: Duration) -> HttpConfig {
        self.keepalive_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> HttpConfig {
        self.request_timeout = timeout;
        self
    }

    pub fn access_log(mut self, path: PathBuf) -> HttpConfig {
        self.access_log = Some(path);
        self
    }

    pub fn error_log(mut self, path: PathBuf) -> HttpConfig {
        self.error_log = Some(path);
        self
    }

    pub fn mime_types_path(mut self, path: PathBuf) -> HttpConfig {
        self.mime_types_path = Some(path);
        self
    }

    pub fn client_max_body_size(mut self, size: Size) -> HttpConfig {
        self.client_max_body_size = Some(size);
        self
    }

    pub fn error_page(mut self, code: StatusCode, uri: &str) -> HttpConfig {
        self.error_pages.insert(code.as_u16(), uri.to_string());
        self
    }

    pub fn server(mut self, server: ServerConfig) -> HttpConfig {
        self.servers.push(server);
        self
    }

    pub fn get_worker_processes(&self) -> u32 { self.worker_processes }
    pub fn get_worker_connections(&self) -> u32 { self.worker_connections }
    pub fn get_keepalive_timeout(&self) -> Duration { self.keepalive_timeout }
    pub fn get_request_timeout(&self) -> Duration { self.request_timeout }
    pub fn get_access_log(&self) -> Option<&PathBuf> {
        self.access_log.as_ref()
    }
    pub fn get_error_log(&self) -> Option<&PathBuf> {
        self.error_log.as_ref()
    }
    pub fn get_mime_types_path(&self) -> Option<&PathBuf> {
        self.mime_types_path.as_ref()
    }
    pub fn get_client_max_body_size(&self) -> Option<Size> {
        self.client_max_body_size
    }
    pub fn get_error_page(&self, code: StatusCode) -> Option<&str> {
        self.error_pages.get(&code.as_u16()).map(|s| &s[..])
    }
    pub fn get_servers(&self) -> &[ServerConfig] { &self.servers }

    /// Every socket address the server set needs bound, deduplicated
    pub fn bind_addresses(&self) -> Vec<::std::net::SocketAddr> {
        let mut seen = HashSet::new();
        let mut addrs = Vec::new();
        for server in &self.servers {
            for listen in server.get_listens() {
                if let Some(addr) = listen.socket_addr() {
                    if seen.insert(addr) {
                        addrs.push(addr);
                    }
                }
            }
        }
        addrs
    }

    /// Checks the whole tree; an `Err` here aborts startup
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.servers.is_empty() {
            return Err(ConfigError::NoServers);
        }
        if self.worker_processes == 0 ||
            self.worker_processes > MAX_WORKER_PROCESSES
        {
            return Err(ConfigError::BadWorkers(self.worker_processes));
        }
        if self.worker_connections == 0 ||
            self.worker_connections > MAX_WORKER_CONNECTIONS
        {
            return Err(ConfigError::BadConnections(self.worker_connections));
        }
        for &timeout in &[self.keepalive_timeout, self.request_timeout] {
            if timeout.as_secs() == 0 || timeout > MAX_TIMEOUT {
                return Err(ConfigError::BadTimeout(timeout.as_secs()));
            }
        }
        if let Some(size) = self.client_max_body_size {
            if size.bytes() > HARD_MAX_BODY_SIZE {
                return Err(ConfigError::BodySizeTooLarge(
                    size.bytes(), HARD_MAX_BODY_SIZE));
            }
        }
        for uri in self.error_pages.values() {
            if !uri.starts_with('/') {
                return Err(ConfigError::BadErrorPage(uri.clone()));
            }
        }
        for server in &self.servers {
            server.validate()?;
        }
        self.validate_listen_conflicts()?;
        self.validate_default_servers()
    }

    /// Two servers must not be reachable through the same listen with
    /// the same (or overlapping wildcard) server name
    fn validate_listen_conflicts(&self) -> Result<(), ConfigError> {
        for (i, a) in self.servers.iter().enumerate() {
            for b in &self.servers[i+1..] {
                let shared = a.get_listens().iter().any(|la| {
                    b.get_listens().iter().any(|lb| la.matches(lb))
                });
                if !shared {
                    continue;
                }
                if names_overlap(a.get_server_names(), b.get_server_names()) {
                    let listen = a.get_listens()[0].to_string();
                    let name = a.get_server_names().first()
                        .cloned().unwrap_or_default();
                    return Err(ConfigError::DuplicateListen(listen, name));
                }
            }
        }
        Ok(())
    }

    /// At most one catch-all server per port
    fn validate_default_servers(&self) -> Result<(), ConfigError> {
        let mut ports: Vec<u16> = self.servers.iter()
            .flat_map(|s| s.get_listens().iter().map(|l| l.port().value()))
            .collect();
        ports.sort();
        ports.dedup();
        for port in ports {
            let defaults = self.servers.iter()
                .filter(|s| s.has_listen_on_port(port) && s.is_default())
                .count();
            if defaults > 1 {
                return Err(ConfigError::MultipleDefaultServers(port));
            }
        }
        Ok(())
    }

    /// Smallest applicable body limit for a routed request
    pub fn effective_max_body_size(&self,
                                   server: &ServerConfig,
                                   location: Option<&LocationConfig>)
        -> u64
    {
        let configured = location.and_then(|l| l.get_client_max_body_size())
            .or_else(|| server.get_client_max_body_size())
            .or(self.client_max_body_size)
            .map(|s| s.bytes())
            .unwrap_or(DEFAULT_MAX_BODY_SIZE);
        ::std::cmp::min(configured, HARD_MAX_BODY_SIZE)
    }
}
