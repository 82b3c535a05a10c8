//! From routed request to response
//!
//! `handle` owns the what-happens-to-a-request sequence: virtual
//! host, location, method check, canned returns, body limit, and then
//! a per-method `Action` resolved against the filesystem and executed
//! by match. All failures funnel through `error_response`, which knows
//! about configured error pages.

use std::net::SocketAddr;
use std::path::PathBuf;

use cgi::{CgiExecutor, CgiRequest, split_script_path};
use config::{CgiConfig, HttpConfig, ListenDirective, LocationConfig,
             ServerConfig, UploadConfig};
use enums::Method;
use fs::Fs;
use handlers::{HandlerResult, delete, listing, static_files, upload};
use mime::MimeTypes;
use server::request::HttpRequest;
use server::response::HttpResponse;
use server::router;
use status;
use status::StatusCode;
use uri::Uri;


/// Everything a request needs besides itself
pub struct RequestContext<'a> {
    pub config: &'a HttpConfig,
    pub fs: &'a dyn Fs,
    pub mime: &'a MimeTypes,
    /// The listen endpoint the connection was accepted on
    pub local: ListenDirective,
    pub peer: SocketAddr,
}

/// What a routed request resolved to
enum Action<'a> {
    Static(PathBuf),
    Listing(PathBuf),
    Cgi {
        cgi: &'a CgiConfig,
        script_path: PathBuf,
        script_name: String,
        path_info: String,
        document_root: String,
    },
    Upload(&'a UploadConfig),
    Delete(PathBuf),
    Fail(StatusCode),
}

pub fn handle(request: &HttpRequest, ctx: &RequestContext) -> HttpResponse {
    let server = match router::resolve_server(ctx.config, &ctx.local,
                                              request.host())
    {
        Some(server) => server,
        None => {
            debug!("no server for host {:?} on {}",
                   request.host(), ctx.local);
            return HttpResponse::error(status::NOT_FOUND);
        }
    };

    if let Some(&(code, ref target)) = server.get_return_redirect() {
        return redirect_response(code, target);
    }
    if let Some(&(code, ref body)) = server.get_return_content() {
        return HttpResponse::with_body(code, "text/plain",
                                       body.clone().into_bytes());
    }

    let location = match router::resolve_location(server, request.path()) {
        Some(location) => location,
        None => {
            debug!("no location matches {:?}", request.path());
            return error_response(status::NOT_FOUND, None, Some(server), ctx);
        }
    };
    debug!("routed {:?} to location {:?}",
           request.path(), location.get_pattern());

    if !location.allows_method(request.method()) {
        let mut response = error_response(
            status::METHOD_NOT_ALLOWED, Some(location), Some(server), ctx);
        response.set_header("Allow", &allow_list(location));
        return response;
    }

    if let Some(&(code, ref target)) = location.get_return_redirect() {
        return redirect_response(code, target);
    }
    if let Some(&(code, ref body)) = location.get_return_content() {
        return HttpResponse::with_body(code, "text/plain",
                                       body.clone().into_bytes());
    }

    let limit = ctx.config.effective_max_body_size(server, Some(location));
    if request.body().len() as u64 > limit {
        debug!("body of {} bytes over the limit of {}",
               request.body().len(), limit);
        return error_response(status::PAYLOAD_TOO_LARGE,
                              Some(location), Some(server), ctx);
    }

    if location.get_proxy_pass().is_some() {
        // modeled in configuration, not implemented at runtime
        return error_response(status::NOT_IMPLEMENTED,
                              Some(location), Some(server), ctx);
    }

    let action = match request.method() {
        Method::Get | Method::Head => {
            resolve_get(request, server, location, ctx, 0)
        }
        Method::Post => resolve_post(request, server, location),
        Method::Delete => resolve_delete(request, server, location),
        _ => Action::Fail(status::METHOD_NOT_ALLOWED),
    };

    let result = run_action(action, request, ctx);
    let mut response = match result {
        Ok(response) => response,
        Err(code) => {
            let mut response = error_response(code, Some(location),
                                              Some(server), ctx);
            if code == status::METHOD_NOT_ALLOWED {
                response.set_header("Allow", &allow_list(location));
            }
            return response;
        }
    };
    if !response.status().is_error() {
        for &(ref name, ref value) in location.get_custom_headers() {
            response.set_header(name, value);
        }
    }
    response
}

fn run_action(action: Action, request: &HttpRequest, ctx: &RequestContext)
    -> HandlerResult
{
    match action {
        Action::Static(path) => static_files::serve(ctx.fs, ctx.mime, &path),
        Action::Listing(path) => {
            listing::generate(ctx.fs, &path, request.path())
        }
        Action::Cgi { cgi, script_path, script_name, path_info,
                      document_root } => {
            let server_name = request.host().unwrap_or("localhost")
                .to_string();
            let server_port = request.host_port()
                .unwrap_or_else(|| ctx.local.port().value());
            let cgi_request = CgiRequest::new(
                request, cgi, script_path, &script_name, &path_info,
                &document_root, &ctx.peer, &server_name, server_port);
            let executor = CgiExecutor::new(cgi.get_timeout());
            match executor.execute(ctx.fs, &cgi_request) {
                Ok(cgi_response) => Ok(cgi_response.to_http_response()),
                Err(err) => {
                    error!("cgi failed for {:?}: {}", request.path(), err);
                    Err(err.status())
                }
            }
        }
        Action::Upload(config) => upload::handle(ctx.fs, config, request),
        Action::Delete(path) => delete::handle(ctx.fs, &path),
        Action::Fail(code) => Err(code),
    }
}

/// GET/HEAD: try_files, directories and indexes, CGI, static
fn resolve_get<'a>(request: &HttpRequest, server: &'a ServerConfig,
                   location: &'a LocationConfig, ctx: &RequestContext,
                   depth: u32)
    -> Action<'a>
{
    resolve_get_path(request, request.path(), server, location, ctx, depth)
}

fn resolve_get_path<'a>(request: &HttpRequest, url_path: &str,
                        server: &'a ServerConfig,
                        location: &'a LocationConfig, ctx: &RequestContext,
                        depth: u32)
    -> Action<'a>
{
    let resolved = resolve_fs_path(server, location, url_path);

    if !ctx.fs.exists(&resolved) {
        // a script halfway through the path, with trailing PATH_INFO
        if let Some(cgi) = location.get_cgi() {
            let (script_name, path_info) = split_script_path(url_path, cgi);
            if !path_info.is_empty() {
                let script_path = resolve_fs_path(server, location,
                                                  &script_name);
                if ctx.fs.is_file(&script_path) {
                    return cgi_action(cgi, script_path, script_name,
                                      path_info, server, location);
                }
            }
        }
        if !location.get_try_files().is_empty() && depth < 2 {
            return resolve_try_files(request, server, location, ctx, depth);
        }
        return Action::Fail(status::NOT_FOUND);
    }

    if ctx.fs.is_dir(&resolved) {
        return resolve_directory(url_path, resolved, server, location, ctx);
    }

    if let Some(cgi) = location.get_cgi() {
        if location.is_regex() ||
            cgi.matches_extension(&resolved.to_string_lossy())
        {
            let (script_name, path_info) = split_script_path(url_path, cgi);
            return cgi_action(cgi, resolved, script_name, path_info,
                              server, location);
        }
    }

    Action::Static(resolved)
}

fn resolve_directory<'a>(url_path: &str, dir: PathBuf,
                         server: &'a ServerConfig,
                         location: &'a LocationConfig, ctx: &RequestContext)
    -> Action<'a>
{
    let index_files = if location.get_index_files().is_empty() {
        server.get_index_files()
    } else {
        location.get_index_files()
    };
    for index in index_files {
        let candidate = dir.join(index);
        if ctx.fs.is_file(&candidate) {
            if !ctx.fs.is_readable(&candidate) {
                warn!("index {:?} exists but is not readable", candidate);
                continue;
            }
            if let Some(cgi) = location.get_cgi() {
                if cgi.matches_extension(&candidate.to_string_lossy()) {
                    let script_name = join_url(url_path, index);
                    return cgi_action(cgi, candidate, script_name,
                                      String::new(), server, location);
                }
            }
            return Action::Static(candidate);
        }
    }
    if location.get_autoindex() {
        Action::Listing(dir)
    } else {
        debug!("no index in {:?} and autoindex is off", dir);
        Action::Fail(status::FORBIDDEN)
    }
}

/// `try_files` patterns in order: `$uri` substitution, `=NNN`
/// terminator, `@named` fallback
fn resolve_try_files<'a>(request: &HttpRequest, server: &'a ServerConfig,
                         location: &'a LocationConfig, ctx: &RequestContext,
                         depth: u32)
    -> Action<'a>
{
    for pattern in location.get_try_files() {
        if pattern.starts_with('=') {
            let code = pattern[1..].parse::<u16>().ok()
                .and_then(StatusCode::new)
                .unwrap_or(status::INTERNAL_SERVER_ERROR);
            debug!("try_files: terminating with {}", code);
            return Action::Fail(code);
        }
        if pattern.starts_with('@') {
            if let Some(named) = router::find_named(server, pattern) {
                debug!("try_files: falling back to {}", pattern);
                return resolve_get(request, server, named, ctx, depth + 1);
            }
            continue;
        }
        let substituted = pattern.replace("$uri", request.path());
        let candidate = resolve_fs_path(server, location, &substituted);
        if ctx.fs.exists(&candidate) {
            debug!("try_files: {:?} exists", candidate);
            return resolve_get_path(request, &substituted, server, location,
                                    ctx, depth + 1);
        }
    }
    Action::Fail(status::NOT_FOUND)
}

/// POST: upload route first, then CGI, otherwise nothing accepts it
fn resolve_post<'a>(request: &HttpRequest, server: &'a ServerConfig,
                    location: &'a LocationConfig)
    -> Action<'a>
{
    if location.is_upload_route() {
        if let Some(config) = location.get_upload() {
            return Action::Upload(config);
        }
    }
    if let Some(cgi) = location.get_cgi() {
        let (script_name, path_info) = split_script_path(request.path(), cgi);
        if location.is_regex() || cgi.matches_extension(&script_name) {
            let script_path = resolve_fs_path(server, location, &script_name);
            return cgi_action(cgi, script_path, script_name, path_info,
                              server, location);
        }
    }
    Action::Fail(status::METHOD_NOT_ALLOWED)
}

/// DELETE: upload locations resolve under the upload directory
fn resolve_delete<'a>(request: &HttpRequest, server: &'a ServerConfig,
                      location: &'a LocationConfig)
    -> Action<'a>
{
    if location.is_upload_route() {
        if let Some(config) = location.get_upload() {
            let mut relative = request.path();
            let pattern = location.get_pattern();
            if relative.starts_with(pattern) {
                relative = &relative[pattern.len()..];
            }
            let relative = relative.trim_left_matches('/');
            if relative.is_empty() {
                return Action::Fail(status::BAD_REQUEST);
            }
            return Action::Delete(
                config.directory().join(relative).to_path_buf());
        }
    }
    Action::Delete(resolve_fs_path(server, location, request.path()))
}

fn cgi_action<'a>(cgi: &'a CgiConfig, script_path: PathBuf,
                  script_name: String, path_info: String,
                  server: &ServerConfig, location: &LocationConfig)
    -> Action<'a>
{
    let document_root = cgi.get_script_root()
        .or_else(|| location.get_root())
        .or_else(|| server.get_root())
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| ".".to_string());
    Action::Cgi {
        cgi: cgi,
        script_path: script_path,
        script_name: script_name,
        path_info: path_info,
        document_root: document_root,
    }
}

/// Maps a URL path onto the filesystem
///
/// `alias` replaces the matched prefix; otherwise the path is joined
/// under the location root, falling back to the CGI script root (for
/// regex CGI locations) and then the server root.
fn resolve_fs_path(server: &ServerConfig, location: &LocationConfig,
                   url_path: &str)
    -> PathBuf
{
    if let Some(alias) = location.get_alias() {
        if !location.is_regex() {
            let mut rest = url_path;
            if rest.starts_with(location.get_pattern()) {
                rest = &rest[location.get_pattern().len()..];
            }
            return alias.join(rest.trim_left_matches('/')).to_path_buf();
        }
    }
    let root = location.get_root()
        .or_else(|| {
            if location.is_regex() {
                location.get_cgi().and_then(|c| c.get_script_root())
            } else {
                None
            }
        })
        .or_else(|| server.get_root());
    match root {
        Some(root) => root.join(url_path.trim_left_matches('/'))
            .to_path_buf(),
        None => PathBuf::from(format!("./{}",
                                      url_path.trim_left_matches('/'))),
    }
}

fn join_url(base: &str, name: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, name)
    } else {
        format!("{}/{}", base, name)
    }
}

fn allow_list(location: &LocationConfig) -> String {
    let names: Vec<&str> = location.get_allowed_methods().iter()
        .map(|m| m.as_str())
        .collect();
    names.join(", ")
}

fn redirect_response(code: StatusCode, target: &Uri) -> HttpResponse {
    let target = target.to_string();
    let body = format!(
        "<html><head><title>Redirect</title></head><body>\
         <h1>Redirecting</h1><p>The document has moved <a href=\"{0}\">\
         here</a>.</p></body></html>", target);
    let mut response = HttpResponse::with_body(code, "text/html",
                                               body.into_bytes());
    response.set_header("Location", &target);
    response
}

/// Builds an error response, honoring configured error pages
///
/// The page URI is looked up location-first, then server, then the
/// global table; its file is resolved against the location root, the
/// server root, and finally as an absolute filesystem path. Error
/// responses always close the connection.
pub fn error_response(code: StatusCode, location: Option<&LocationConfig>,
                      server: Option<&ServerConfig>, ctx: &RequestContext)
    -> HttpResponse
{
    let page = location.and_then(|l| l.get_error_page(code))
        .or_else(|| server.and_then(|s| s.get_error_page(code)))
        .or_else(|| ctx.config.get_error_page(code));
    if let Some(page) = page {
        if let Some(body) = load_error_page(page, location, server, ctx) {
            let mut response = HttpResponse::with_body(code, "text/html",
                                                       body);
            response.set_header("Connection", "close");
            return response;
        }
        warn!("configured error page {:?} for {} is unreadable",
              page, code.as_u16());
    }
    HttpResponse::error(code)
}

fn load_error_page(page: &str, location: Option<&LocationConfig>,
                   server: Option<&ServerConfig>, ctx: &RequestContext)
    -> Option<Vec<u8>>
{
    let relative = page.trim_left_matches('/');
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(root) = location.and_then(|l| l.get_root()) {
        candidates.push(root.join(relative).to_path_buf());
    }
    if let Some(root) = server.and_then(|s| s.get_root()) {
        candidates.push(root.join(relative).to_path_buf());
    }
    candidates.push(PathBuf::from(page));
    for candidate in candidates {
        if ctx.fs.is_file(&candidate) && ctx.fs.is_readable(&candidate) {
            match ctx.fs.read(&candidate) {
                Ok(body) => {
                    debug!("serving error page from {:?}", candidate);
                    return Some(body);
                }
                Err(err) => {
                    warn!("failed to read error page {:?}: {}",
                          candidate, err);
                }
            }
        }
    }
    None
}
