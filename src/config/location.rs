use std::collections::BTreeMap;

use regex::{Regex, RegexBuilder};

use config::cgi::CgiConfig;
use config::error::ConfigError;
use config::upload::UploadConfig;
use enums::Method;
use path::Path;
use size::Size;
use status::StatusCode;
use uri::Uri;


/// How a location pattern is applied to a request path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    /// `location = /path`: whole-path equality
    Exact,
    /// `location /path`: prefix with a `/` component boundary
    Prefix,
    /// `location ~ pat`: case-sensitive regular expression
    RegexCaseSensitive,
    /// `location ~* pat`: case-insensitive regular expression
    RegexCaseInsensitive,
}

/// One `location` block
///
/// Holds the routing pattern plus everything the handlers need:
/// filesystem mapping (root/alias/index/try_files), the allowed method
/// set, canned responses, upload and CGI settings, per-location error
/// pages and limits. Regular-expression patterns are compiled here,
/// once, and reused for every request.
#[derive(Debug, Clone)]
pub struct LocationConfig {
    pattern: String,
    match_type: MatchType,
    regex: Option<Regex>,
    root: Option<Path>,
    alias: Option<Path>,
    index_files: Vec<String>,
    allowed_methods: Vec<Method>,
    autoindex: bool,
    try_files: Vec<String>,
    return_redirect: Option<(StatusCode, Uri)>,
    return_content: Option<(StatusCode, String)>,
    upload: Option<UploadConfig>,
    cgi: Option<CgiConfig>,
    error_pages: BTreeMap<u16, String>,
    client_max_body_size: Option<Size>,
    client_body_buffer_size: Option<Size>,
    proxy_pass: Option<Uri>,
    custom_headers: Vec<(String, String)>,
}

/// Response headers a location may never override
const RESERVED_HEADERS: &'static [&'static str] =
    &["content-length", "transfer-encoding", "connection", "host"];

impl LocationConfig {
    /// Creates a location; regex patterns are compiled immediately
    pub fn new(pattern: &str, match_type: MatchType)
        -> Result<LocationConfig, ConfigError>
    {
        if pattern.is_empty() {
            return Err(ConfigError::EmptyLocationPattern);
        }
        let regex = match match_type {
            MatchType::RegexCaseSensitive => {
                Some(Regex::new(pattern).map_err(|e| {
                    ConfigError::BadLocationPattern(pattern.to_string(),
                                                    e.to_string())
                })?)
            }
            MatchType::RegexCaseInsensitive => {
                Some(RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        ConfigError::BadLocationPattern(pattern.to_string(),
                                                        e.to_string())
                    })?)
            }
            MatchType::Exact | MatchType::Prefix => None,
        };
        if pattern.starts_with('@') && match_type != MatchType::Exact {
            return Err(ConfigError::BadLocationPattern(
                pattern.to_string(),
                "named locations must use exact matching".to_string()));
        }
        Ok(LocationConfig {
            pattern: pattern.to_string(),
            match_type: match_type,
            regex: regex,
            root: None,
            alias: None,
            index_files: Vec::new(),
            allowed_methods: vec![Method::Get, Method::Head],
            autoindex: false,
            try_files: Vec::new(),
            return_redirect: None,
            return_content: None,
            upload: None,
            cgi: None,
            error_pages: BTreeMap::new(),
            client_max_body_size: None,
            client_body_buffer_size: None,
            proxy_pass: None,
            custom_headers: Vec::new(),
        })
    }

    pub fn root(mut self, root: Path) -> LocationConfig {
        self.root = Some(root);
        self
    }

    pub fn alias(mut self, alias: Path) -> LocationConfig {
        self.alias = Some(alias);
        self
    }

    pub fn index(mut self, name: &str) -> LocationConfig {
        self.index_files.push(name.to_string());
        self
    }

    pub fn methods(mut self, methods: &[Method]) -> LocationConfig {
        self.allowed_methods = methods.to_vec();
        self
    }

    pub fn autoindex(mut self, enabled: bool) -> LocationConfig {
        self.autoindex = enabled;
        self
    }

    pub fn try_file(mut self, pattern: &str) -> LocationConfig {
        self.try_files.push(pattern.to_string());
        self
    }

    pub fn return_redirect(mut self, code: StatusCode, target: Uri)
        -> LocationConfig
    {
        self.return_redirect = Some((code, target));
        self
    }

    pub fn return_content(mut self, code: StatusCode, body: &str)
        -> LocationConfig
    {
        self.return_content = Some((code, body.to_string()));
        self
    }

    pub fn upload(mut self, config: UploadConfig) -> LocationConfig {
        self.upload = Some(config);
        self
    }

    pub fn cgi(mut self, config: CgiConfig) -> LocationConfig {
        self.cgi = Some(config);
        self
    }

    pub fn error_page(mut self, code: StatusCode, uri: &str) -> LocationConfig {
        self.error_pages.insert(code.as_u16(), uri.to_string());
        self
    }

    pub fn client_max_body_size(mut self, size: Size) -> LocationConfig {
        self.client_max_body_size = Some(size);
        self
    }

    pub fn client_body_buffer_size(mut self, size: Size) -> LocationConfig {
        self.client_body_buffer_size = Some(size);
        self
    }

    pub fn proxy_pass(mut self, target: Uri) -> LocationConfig {
        self.proxy_pass = Some(target);
        self
    }

    pub fn custom_header(mut self, name: &str, value: &str) -> LocationConfig {
        self.custom_headers.push((name.to_string(), value.to_string()));
        self
    }

    // accessors

    pub fn get_pattern(&self) -> &str { &self.pattern }
    pub fn get_match_type(&self) -> MatchType { self.match_type }
    pub fn get_root(&self) -> Option<&Path> { self.root.as_ref() }
    pub fn get_alias(&self) -> Option<&Path> { self.alias.as_ref() }
    pub fn get_index_files(&self) -> &[String] { &self.index_files }
    pub fn get_allowed_methods(&self) -> &[Method] { &self.allowed_methods }
    pub fn get_autoindex(&self) -> bool { self.autoindex }
    pub fn get_try_files(&self) -> &[String] { &self.try_files }
    pub fn get_return_redirect(&self) -> Option<&(StatusCode, Uri)> {
        self.return_redirect.as_ref()
    }
    pub fn get_return_content(&self) -> Option<&(StatusCode, String)> {
        self.return_content.as_ref()
    }
    pub fn get_upload(&self) -> Option<&UploadConfig> { self.upload.as_ref() }
    pub fn get_cgi(&self) -> Option<&CgiConfig> { self.cgi.as_ref() }
    pub fn get_error_page(&self, code: StatusCode) -> Option<&str> {
        self.error_pages.get(&code.as_u16()).map(|s| &s[..])
    }
    pub fn get_client_max_body_size(&self) -> Option<Size> {
        self.client_max_body_size
    }
    pub fn get_client_body_buffer_size(&self) -> Option<Size> {
        self.client_body_buffer_size
    }
    pub fn get_proxy_pass(&self) -> Option<&Uri> { self.proxy_pass.as_ref() }
    pub fn get_custom_headers(&self) -> &[(String, String)] {
        &self.custom_headers
    }

    pub fn is_named(&self) -> bool {
        self.pattern.starts_with('@')
    }

    pub fn is_regex(&self) -> bool {
        matches!(self.match_type,
                 MatchType::RegexCaseSensitive |
                 MatchType::RegexCaseInsensitive)
    }

    /// An upload route is an upload config plus POST in the method set
    pub fn is_upload_route(&self) -> bool {
        self.upload.is_some() &&
            self.allowed_methods.contains(&Method::Post)
    }

    pub fn allows_method(&self, method: Method) -> bool {
        self.allowed_methods.contains(&method)
    }

    /// Pattern match against a request path; named locations never match
    pub fn matches_path(&self, path: &str) -> bool {
        if self.is_named() {
            return false;
        }
        match self.match_type {
            MatchType::Exact => eq_modulo_trailing_slash(&self.pattern, path),
            MatchType::Prefix => prefix_matches(&self.pattern, path),
            MatchType::RegexCaseSensitive |
            MatchType::RegexCaseInsensitive => {
                self.regex.as_ref().map(|re| re.is_match(path)).unwrap_or(false)
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.allowed_methods.is_empty() {
            return Err(ConfigError::NoMethodsAllowed(self.pattern.clone()));
        }
        if self.root.is_some() && self.alias.is_some() {
            return Err(ConfigError::RootConflictsWithAlias(
                self.pattern.clone()));
        }
        if self.proxy_pass.is_some() {
            if self.upload.is_some() {
                return Err(ConfigError::ProxyConflict(
                    self.pattern.clone(), "an upload config"));
            }
            if self.cgi.is_some() {
                return Err(ConfigError::ProxyConflict(
                    self.pattern.clone(), "a cgi config"));
            }
            if self.return_redirect.is_some() {
                return Err(ConfigError::ProxyConflict(
                    self.pattern.clone(), "a return redirect"));
            }
        }
        if self.return_redirect.is_some() {
            if self.upload.is_some() {
                return Err(ConfigError::RedirectConflict(
                    self.pattern.clone(), "an upload config"));
            }
            if self.cgi.is_some() {
                return Err(ConfigError::RedirectConflict(
                    self.pattern.clone(), "a cgi config"));
            }
        }
        if self.upload.is_some() &&
            !self.allowed_methods.contains(&Method::Post)
        {
            return Err(ConfigError::UploadWithoutPost(self.pattern.clone()));
        }
        if let Some(&(code, _)) = self.return_redirect.as_ref() {
            if !code.is_redirect() {
                return Err(ConfigError::BadReturnCode(code.as_u16()));
            }
        }
        if let Some(&(code, _)) = self.return_content.as_ref() {
            if !(code.is_success() || code.is_error()) {
                return Err(ConfigError::BadReturnCode(code.as_u16()));
            }
        }
        for &(ref name, _) in &self.custom_headers {
            let lower = name.to_ascii_lowercase();
            if RESERVED_HEADERS.contains(&&lower[..]) {
                return Err(ConfigError::ReservedCustomHeader(
                    self.pattern.clone(), name.clone()));
            }
        }
        for uri in self.error_pages.values() {
            if !uri.starts_with('/') {
                return Err(ConfigError::BadErrorPage(uri.clone()));
            }
        }
        Ok(())
    }
}

/// `path` equals `path/` at the exact-match step
fn eq_modulo_trailing_slash(pattern: &str, path: &str) -> bool {
    let pattern = if pattern.len() > 1 {
        pattern.trim_right_matches('/')
    } else {
        pattern
    };
    let path = if path.len() > 1 {
        path.trim_right_matches('/')
    } else {
        path
    };
    pattern == path
}

/// Prefix match on a `/` component boundary
fn prefix_matches(pattern: &str, path: &str) -> bool {
    if !path.starts_with(pattern) {
        return false;
    }
    pattern.ends_with('/')
        || path.len() == pattern.len()
        || path.as_bytes()[pattern.len()] == b'/'
}
