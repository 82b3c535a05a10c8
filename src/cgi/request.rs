use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use config::CgiConfig;
use server::request::HttpRequest;


/// Everything a child process needs: argv material, environment, body
///
/// The environment is CGI/1.1: the fixed variable set, `HTTP_*`
/// mappings of the request headers, and whatever extra parameters the
/// location configures (request-derived variables win over those).
#[derive(Debug, Clone)]
pub struct CgiRequest {
    script_path: PathBuf,
    interpreter: Option<PathBuf>,
    env: BTreeMap<String, String>,
    body: Vec<u8>,
}

impl CgiRequest {
    pub fn new(request: &HttpRequest,
               cgi: &CgiConfig,
               script_path: PathBuf,
               script_name: &str,
               path_info: &str,
               document_root: &str,
               peer: &SocketAddr,
               server_name: &str,
               server_port: u16)
        -> CgiRequest
    {
        let mut cgi_request = CgiRequest {
            script_path: script_path,
            interpreter: cgi.get_interpreter()
                .map(|p| PathBuf::from(p.as_str())),
            env: BTreeMap::new(),
            body: request.body().to_vec(),
        };
        for (name, value) in cgi.get_parameters() {
            cgi_request.set_env(name, value);
        }
        cgi_request.add_server_vars(server_name, server_port);
        cgi_request.add_request_vars(request, script_name, path_info,
                                     document_root);
        cgi_request.add_header_vars(request);
        cgi_request.set_env("REMOTE_ADDR", &peer.ip().to_string());
        cgi_request.set_env("REMOTE_PORT", &peer.port().to_string());
        cgi_request
    }

    fn add_server_vars(&mut self, server_name: &str, server_port: u16) {
        self.set_env("GATEWAY_INTERFACE", "CGI/1.1");
        self.set_env("SERVER_SOFTWARE", ::SERVER_SOFTWARE);
        self.set_env("SERVER_PROTOCOL", "HTTP/1.1");
        self.set_env("SERVER_NAME", server_name);
        self.set_env("SERVER_PORT", &server_port.to_string());
    }

    fn add_request_vars(&mut self, request: &HttpRequest, script_name: &str,
                        path_info: &str, document_root: &str)
    {
        self.set_env("REQUEST_METHOD", request.method().as_str());
        let request_uri = if request.raw_query().is_empty() {
            request.path().to_string()
        } else {
            format!("{}?{}", request.path(), request.raw_query())
        };
        self.set_env("REQUEST_URI", &request_uri);
        self.set_env("SCRIPT_NAME", script_name);
        self.set_env("SCRIPT_FILENAME",
                     &self.script_path.to_string_lossy().into_owned());
        self.set_env("DOCUMENT_ROOT", document_root);
        if !path_info.is_empty() {
            self.set_env("PATH_INFO", path_info);
            self.set_env("PATH_TRANSLATED",
                         &format!("{}{}", document_root, path_info));
        }
        self.set_env("QUERY_STRING", request.raw_query());
        if !request.body().is_empty() {
            self.set_env("CONTENT_LENGTH",
                         &request.body().len().to_string());
            if let Some(content_type) = request.header("content-type") {
                self.set_env("CONTENT_TYPE", content_type);
            }
        }
    }

    /// `X-Custom-Header: v` becomes `HTTP_X_CUSTOM_HEADER=v`; the two
    /// reserved headers already have unprefixed variables
    fn add_header_vars(&mut self, request: &HttpRequest) {
        for &(ref name, ref value) in request.headers() {
            if name == "content-length" || name == "content-type" {
                continue;
            }
            let mut env_name = String::with_capacity(name.len() + 5);
            env_name.push_str("HTTP_");
            for c in name.chars() {
                match c {
                    '-' => env_name.push('_'),
                    c => env_name.push(c.to_ascii_uppercase()),
                }
            }
            self.set_env(&env_name, value);
        }
    }

    /// Inserts a variable, dropping invalid names and stripping control
    /// characters (except tab and newline) from the value
    pub fn set_env(&mut self, name: &str, value: &str) {
        if !valid_env_name(name) {
            warn!("cgi: skipping invalid environment name {:?}", name);
            return;
        }
        let sanitized: String = value.chars()
            .filter(|&c| !c.is_control() || c == '\t' || c == '\n')
            .collect();
        self.env.insert(name.to_string(), sanitized);
    }

    pub fn script_path(&self) -> &PathBuf {
        &self.script_path
    }

    pub fn interpreter(&self) -> Option<&PathBuf> {
        self.interpreter.as_ref()
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

fn valid_env_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| {
        b == b'_' || (b >= b'0' && b <= b'9') ||
        (b >= b'a' && b <= b'z') || (b >= b'A' && b <= b'Z')
    })
}

/// Splits a request path at the script component
///
/// `/cgi/echo.py/extra/info` with a `.py` CGI extension yields
/// `("/cgi/echo.py", "/extra/info")`; a path with no matching
/// component is returned whole with empty path info.
pub fn split_script_path(path: &str, cgi: &CgiConfig) -> (String, String) {
    let mut consumed = 0;
    for segment in path.split('/') {
        let end = consumed + segment.len();
        if cgi.matches_extension(&path[..end]) {
            return (path[..end].to_string(), path[end..].to_string());
        }
        consumed = end + 1; // the slash
        if consumed > path.len() {
            break;
        }
    }
    (path.to_string(), String::new())
}
