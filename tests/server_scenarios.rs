//! End-to-end request/response scenarios
//!
//! These drive `ConnectionHandler` the same way the event loop does,
//! but over an in-memory transport: bytes are pushed into the handler,
//! `process_event` runs the machine, and the serialized response is
//! read back out.

extern crate tempfile;
extern crate tk_httpd;

use std::cell::RefCell;
use std::fs as std_fs;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use tk_httpd::{Method, StatusCode};
use tk_httpd::config::{CgiConfig, HttpConfig, ListenDirective,
                       LocationConfig, MatchType, ServerConfig,
                       UploadConfig};
use tk_httpd::fs::DiskFs;
use tk_httpd::mime::MimeTypes;
use tk_httpd::path::Path;
use tk_httpd::server::{ConnectionHandler, State};
use tk_httpd::size::Size;


struct Inner {
    input: Vec<u8>,
    output: Vec<u8>,
    write_limit: Option<usize>,
    eof: bool,
}

/// A socket stand-in the test can feed and inspect from outside
#[derive(Clone)]
struct MockSock(Rc<RefCell<Inner>>);

impl MockSock {
    fn new() -> MockSock {
        MockSock(Rc::new(RefCell::new(Inner {
            input: Vec::new(),
            output: Vec::new(),
            write_limit: None,
            eof: false,
        })))
    }

    fn close_input(&self) {
        self.0.borrow_mut().eof = true;
    }

    fn push(&self, bytes: &[u8]) {
        self.0.borrow_mut().input.extend_from_slice(bytes);
    }

    fn output(&self) -> Vec<u8> {
        self.0.borrow().output.clone()
    }

    fn output_text(&self) -> String {
        String::from_utf8_lossy(&self.output()).into_owned()
    }

    fn limit_writes(&self, limit: usize) {
        self.0.borrow_mut().write_limit = Some(limit);
    }
}

impl Read for MockSock {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inner = self.0.borrow_mut();
        if inner.input.is_empty() {
            if inner.eof {
                return Ok(0);
            }
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "empty"));
        }
        let n = ::std::cmp::min(buf.len(), inner.input.len());
        buf[..n].copy_from_slice(&inner.input[..n]);
        inner.input.drain(..n);
        Ok(n)
    }
}

impl Write for MockSock {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.0.borrow_mut();
        let n = match inner.write_limit {
            Some(limit) => ::std::cmp::min(limit, buf.len()),
            None => buf.len(),
        };
        inner.output.extend_from_slice(&buf[..n]);
        Ok(n)
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn handler_for(config: HttpConfig, sock: MockSock)
    -> ConnectionHandler<MockSock>
{
    config.validate().expect("test configuration must be valid");
    let peer: SocketAddr = "127.0.0.1:45678".parse().unwrap();
    let local = ListenDirective::parse("8080").unwrap();
    ConnectionHandler::new(sock, peer, local, Rc::new(config),
                           Rc::new(MimeTypes::builtin()), Rc::new(DiskFs))
}

/// Feeds one request and pumps the machine until the response is out
fn exchange(handler: &mut ConnectionHandler<MockSock>, sock: &MockSock,
            request: &[u8])
    -> String
{
    let before = sock.output().len();
    sock.push(request);
    for _ in 0..100 {
        handler.process_event();
        if handler.state() == State::KeepAlive ||
            handler.state() == State::Closing
        {
            break;
        }
    }
    String::from_utf8_lossy(&sock.output()[before..]).into_owned()
}

fn status_line(response: &str) -> &str {
    response.split("\r\n").next().unwrap_or("")
}

fn body_of(response: &str) -> &str {
    match response.find("\r\n\r\n") {
        Some(pos) => &response[pos+4..],
        None => "",
    }
}

fn site_config(root: &std::path::Path) -> HttpConfig {
    let location = LocationConfig::new("/", MatchType::Prefix).unwrap()
        .index("index.html");
    HttpConfig::new().server(
        ServerConfig::new()
            .listen(ListenDirective::parse("8080").unwrap())
            .root(Path::parse(root.to_str().unwrap()).unwrap())
            .location(location))
}

#[test]
fn static_get() {
    let dir = tempfile::tempdir().unwrap();
    std_fs::write(dir.path().join("index.html"), "hello").unwrap();

    let sock = MockSock::new();
    let mut handler = handler_for(site_config(dir.path()), sock.clone());
    let response = exchange(&mut handler, &sock,
                            b"GET /index.html HTTP/1.1\r\nHost: x\r\n\r\n");

    assert_eq!(status_line(&response), "HTTP/1.1 200 OK");
    assert!(response.contains("Content-Length: 5\r\n"));
    assert!(response.contains("Content-Type: text/html; charset=utf-8\r\n"));
    assert_eq!(body_of(&response), "hello");
}

#[test]
fn index_file_is_served_for_directory() {
    let dir = tempfile::tempdir().unwrap();
    std_fs::write(dir.path().join("index.html"), "welcome").unwrap();

    let sock = MockSock::new();
    let mut handler = handler_for(site_config(dir.path()), sock.clone());
    let response = exchange(&mut handler, &sock,
                            b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(status_line(&response), "HTTP/1.1 200 OK");
    assert_eq!(body_of(&response), "welcome");
}

#[test]
fn head_has_no_body_but_correct_length() {
    let dir = tempfile::tempdir().unwrap();
    std_fs::write(dir.path().join("index.html"), "hello").unwrap();

    let sock = MockSock::new();
    let mut handler = handler_for(site_config(dir.path()), sock.clone());
    let response = exchange(&mut handler, &sock,
                            b"HEAD /index.html HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(status_line(&response), "HTTP/1.1 200 OK");
    assert!(response.contains("Content-Length: 5\r\n"));
    assert_eq!(body_of(&response), "");
}

#[test]
fn exact_beats_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let exact = LocationConfig::new("/a", MatchType::Exact).unwrap()
        .return_content(StatusCode::new(200).unwrap(), "exact");
    let prefix = LocationConfig::new("/a", MatchType::Prefix).unwrap()
        .return_content(StatusCode::new(200).unwrap(), "prefix");
    let config = HttpConfig::new().server(
        ServerConfig::new()
            .listen(ListenDirective::parse("8080").unwrap())
            .root(Path::parse(dir.path().to_str().unwrap()).unwrap())
            .location(exact)
            .location(prefix));

    let sock = MockSock::new();
    let mut handler = handler_for(config, sock.clone());
    let response = exchange(&mut handler, &sock,
                            b"GET /a HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(body_of(&response), "exact");

    let response = exchange(&mut handler, &sock,
                            b"GET /a/b HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(body_of(&response), "prefix");
}

#[test]
fn oversized_body_is_413_and_closes() {
    let dir = tempfile::tempdir().unwrap();
    let location = LocationConfig::new("/", MatchType::Prefix).unwrap()
        .methods(&[Method::Get, Method::Head, Method::Post])
        .client_max_body_size(Size::parse("1K").unwrap());
    let config = HttpConfig::new().server(
        ServerConfig::new()
            .listen(ListenDirective::parse("8080").unwrap())
            .root(Path::parse(dir.path().to_str().unwrap()).unwrap())
            .location(location));

    let sock = MockSock::new();
    let mut handler = handler_for(config, sock.clone());
    let mut request = Vec::new();
    request.extend_from_slice(
        b"POST /up HTTP/1.1\r\nHost: x\r\nContent-Length: 2048\r\n\r\n");
    request.extend_from_slice(&[b'z'; 2048]);
    let response = exchange(&mut handler, &sock, &request);

    assert_eq!(status_line(&response), "HTTP/1.1 413 Payload Too Large");
    assert!(response.contains("Connection: close\r\n"));
    assert_eq!(handler.state(), State::Closing);
}

#[test]
fn directory_traversal_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    std_fs::write(dir.path().join("index.html"), "secret-free").unwrap();

    let sock = MockSock::new();
    let mut handler = handler_for(site_config(dir.path()), sock.clone());
    let response = exchange(
        &mut handler, &sock,
        b"GET /static/%2e%2e/etc/passwd HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(status_line(&response), "HTTP/1.1 400 Bad Request");
    assert!(!response.contains("root:"));
    assert_eq!(handler.state(), State::Closing);
}

fn write_script(path: &std::path::Path, text: &str) {
    std_fs::write(path, text).unwrap();
    let mut perms = std_fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std_fs::set_permissions(path, perms).unwrap();
}

#[test]
fn cgi_echo() {
    let dir = tempfile::tempdir().unwrap();
    std_fs::create_dir(dir.path().join("cgi")).unwrap();
    write_script(&dir.path().join("cgi/echo.py"),
                 "#!/bin/sh\nprintf 'Content-Type: text/plain\\r\\n\\r\\n'\n\
                  cat\n");

    let cgi = CgiConfig::new().extension("py")
        .parameter("PATH", "/bin:/usr/bin");
    let location = LocationConfig::new("/cgi/", MatchType::Prefix).unwrap()
        .methods(&[Method::Get, Method::Head, Method::Post])
        .cgi(cgi);
    let config = HttpConfig::new().server(
        ServerConfig::new()
            .listen(ListenDirective::parse("8080").unwrap())
            .root(Path::parse(dir.path().to_str().unwrap()).unwrap())
            .location(location));

    let sock = MockSock::new();
    let mut handler = handler_for(config, sock.clone());
    let response = exchange(
        &mut handler, &sock,
        b"POST /cgi/echo.py HTTP/1.1\r\nHost: x\r\n\
          Content-Length: 5\r\n\r\nHELLO");
    assert_eq!(status_line(&response), "HTTP/1.1 200 OK");
    assert!(response.contains("Content-Type: text/plain"));
    assert_eq!(body_of(&response), "HELLO");
}

#[test]
fn cgi_sees_request_environment() {
    let dir = tempfile::tempdir().unwrap();
    std_fs::create_dir(dir.path().join("cgi")).unwrap();
    write_script(&dir.path().join("cgi/env.py"),
                 "#!/bin/sh\nprintf 'Content-Type: text/plain\\r\\n\\r\\n'\n\
                  printf '%s %s' \"$REQUEST_METHOD\" \"$CONTENT_LENGTH\"\n");

    let cgi = CgiConfig::new().extension("py")
        .parameter("PATH", "/bin:/usr/bin");
    let location = LocationConfig::new("/cgi/", MatchType::Prefix).unwrap()
        .methods(&[Method::Get, Method::Head, Method::Post])
        .cgi(cgi);
    let config = HttpConfig::new().server(
        ServerConfig::new()
            .listen(ListenDirective::parse("8080").unwrap())
            .root(Path::parse(dir.path().to_str().unwrap()).unwrap())
            .location(location));

    let sock = MockSock::new();
    let mut handler = handler_for(config, sock.clone());
    let response = exchange(
        &mut handler, &sock,
        b"POST /cgi/env.py HTTP/1.1\r\nHost: x\r\n\
          Content-Length: 5\r\n\r\nHELLO");
    assert_eq!(body_of(&response), "POST 5");
}

#[test]
fn keep_alive_two_requests_then_idle_timeout() {
    let dir = tempfile::tempdir().unwrap();
    std_fs::write(dir.path().join("index.html"), "hello").unwrap();

    let sock = MockSock::new();
    let mut handler = handler_for(site_config(dir.path()), sock.clone());

    let first = exchange(&mut handler, &sock,
                         b"GET /index.html HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(status_line(&first), "HTTP/1.1 200 OK");
    assert!(!first.contains("Connection: close"));
    assert_eq!(handler.state(), State::KeepAlive);

    let second = exchange(&mut handler, &sock,
                          b"GET /index.html HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(status_line(&second), "HTTP/1.1 200 OK");
    assert!(!second.contains("Connection: close"));
    assert_eq!(handler.state(), State::KeepAlive);

    // past the keep-alive idle limit the connection is just closed
    let later = Instant::now() + Duration::from_secs(6);
    assert!(handler.is_timed_out(later));
    let drained = sock.output().len();
    handler.on_timeout();
    assert_eq!(handler.state(), State::Closing);
    assert_eq!(sock.output().len(), drained);
}

#[test]
fn http10_closes_by_default() {
    let dir = tempfile::tempdir().unwrap();
    std_fs::write(dir.path().join("index.html"), "hello").unwrap();

    let sock = MockSock::new();
    let mut handler = handler_for(site_config(dir.path()), sock.clone());
    let response = exchange(&mut handler, &sock,
                            b"GET /index.html HTTP/1.0\r\n\r\n");
    assert_eq!(status_line(&response), "HTTP/1.1 200 OK");
    assert!(response.contains("Connection: close\r\n"));
    assert_eq!(handler.state(), State::Closing);
}

#[test]
fn short_writes_park_and_resume() {
    let dir = tempfile::tempdir().unwrap();
    std_fs::write(dir.path().join("index.html"), "hello").unwrap();

    let sock = MockSock::new();
    sock.limit_writes(7);
    let mut handler = handler_for(site_config(dir.path()), sock.clone());
    let response = exchange(&mut handler, &sock,
                            b"GET /index.html HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(status_line(&response), "HTTP/1.1 200 OK");
    assert_eq!(body_of(&response), "hello");
    assert_eq!(handler.state(), State::KeepAlive);
}

#[test]
fn method_not_allowed_lists_allow() {
    let dir = tempfile::tempdir().unwrap();
    let sock = MockSock::new();
    let mut handler = handler_for(site_config(dir.path()), sock.clone());
    let response = exchange(&mut handler, &sock,
                            b"DELETE /x HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(status_line(&response),
               "HTTP/1.1 405 Method Not Allowed");
    assert!(response.contains("Allow: GET, HEAD\r\n"));
}

#[test]
fn autoindex_listing() {
    let dir = tempfile::tempdir().unwrap();
    std_fs::create_dir(dir.path().join("files")).unwrap();
    std_fs::write(dir.path().join("files/a.txt"), "a").unwrap();

    let location = LocationConfig::new("/", MatchType::Prefix).unwrap()
        .autoindex(true);
    let config = HttpConfig::new().server(
        ServerConfig::new()
            .listen(ListenDirective::parse("8080").unwrap())
            .root(Path::parse(dir.path().to_str().unwrap()).unwrap())
            .location(location));
    let sock = MockSock::new();
    let mut handler = handler_for(config, sock.clone());
    let response = exchange(&mut handler, &sock,
                            b"GET /files HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(status_line(&response), "HTTP/1.1 200 OK");
    assert!(body_of(&response).contains("a.txt"));
}

#[test]
fn forbidden_without_autoindex() {
    let dir = tempfile::tempdir().unwrap();
    std_fs::create_dir(dir.path().join("files")).unwrap();

    let sock = MockSock::new();
    let mut handler = handler_for(site_config(dir.path()), sock.clone());
    let response = exchange(&mut handler, &sock,
                            b"GET /files HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(status_line(&response), "HTTP/1.1 403 Forbidden");
}

#[test]
fn configured_error_page_is_served() {
    let dir = tempfile::tempdir().unwrap();
    std_fs::create_dir(dir.path().join("errors")).unwrap();
    std_fs::write(dir.path().join("errors/404.html"),
                  "<h1>custom missing</h1>").unwrap();

    let location = LocationConfig::new("/", MatchType::Prefix).unwrap()
        .error_page(StatusCode::new(404).unwrap(), "/errors/404.html");
    let config = HttpConfig::new().server(
        ServerConfig::new()
            .listen(ListenDirective::parse("8080").unwrap())
            .root(Path::parse(dir.path().to_str().unwrap()).unwrap())
            .location(location));
    let sock = MockSock::new();
    let mut handler = handler_for(config, sock.clone());
    let response = exchange(&mut handler, &sock,
                            b"GET /nothing-here HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(status_line(&response), "HTTP/1.1 404 Not Found");
    assert_eq!(body_of(&response), "<h1>custom missing</h1>");
}

#[test]
fn try_files_fallback_and_terminator() {
    let dir = tempfile::tempdir().unwrap();
    std_fs::write(dir.path().join("fallback.html"), "fell back").unwrap();

    let location = LocationConfig::new("/", MatchType::Prefix).unwrap()
        .try_file("$uri")
        .try_file("/fallback.html")
        .try_file("=404");
    let config = HttpConfig::new().server(
        ServerConfig::new()
            .listen(ListenDirective::parse("8080").unwrap())
            .root(Path::parse(dir.path().to_str().unwrap()).unwrap())
            .location(location));
    let sock = MockSock::new();
    let mut handler = handler_for(config, sock.clone());
    let response = exchange(&mut handler, &sock,
                            b"GET /missing HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(status_line(&response), "HTTP/1.1 200 OK");
    assert_eq!(body_of(&response), "fell back");

    // a terminator pattern short-circuits with its status
    let dir = tempfile::tempdir().unwrap();
    let location = LocationConfig::new("/", MatchType::Prefix).unwrap()
        .try_file("$uri")
        .try_file("=404");
    let config = HttpConfig::new().server(
        ServerConfig::new()
            .listen(ListenDirective::parse("8080").unwrap())
            .root(Path::parse(dir.path().to_str().unwrap()).unwrap())
            .location(location));
    let sock = MockSock::new();
    let mut handler = handler_for(config, sock.clone());
    let response = exchange(&mut handler, &sock,
                            b"GET /also-missing HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(status_line(&response), "HTTP/1.1 404 Not Found");
}

#[test]
fn redirect_location() {
    let dir = tempfile::tempdir().unwrap();
    let location = LocationConfig::new("/old", MatchType::Prefix).unwrap()
        .return_redirect(StatusCode::new(301).unwrap(),
                         tk_httpd::Uri::parse("/new").unwrap());
    let config = HttpConfig::new().server(
        ServerConfig::new()
            .listen(ListenDirective::parse("8080").unwrap())
            .root(Path::parse(dir.path().to_str().unwrap()).unwrap())
            .location(location));
    let sock = MockSock::new();
    let mut handler = handler_for(config, sock.clone());
    let response = exchange(&mut handler, &sock,
                            b"GET /old HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(status_line(&response), "HTTP/1.1 301 Moved Permanently");
    assert!(response.contains("Location: /new\r\n"));
    assert!(body_of(&response).contains("moved"));
}

#[test]
fn upload_and_delete_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("store");
    let location = LocationConfig::new("/upload", MatchType::Prefix).unwrap()
        .methods(&[Method::Get, Method::Head, Method::Post, Method::Delete])
        .upload(UploadConfig::new(
            Path::parse(store.to_str().unwrap()).unwrap()));
    let config = HttpConfig::new().server(
        ServerConfig::new()
            .listen(ListenDirective::parse("8080").unwrap())
            .root(Path::parse(dir.path().to_str().unwrap()).unwrap())
            .location(location));

    let sock = MockSock::new();
    let mut handler = handler_for(config, sock.clone());

    let mut body = Vec::new();
    body.extend_from_slice(
        b"--BND\r\nContent-Disposition: form-data; name=\"file\"; \
          filename=\"note.txt\"\r\n\r\nstored-bytes\r\n--BND--\r\n");
    let mut request = Vec::new();
    request.extend_from_slice(
        format!("POST /upload HTTP/1.1\r\nHost: x\r\n\
                 Content-Type: multipart/form-data; boundary=BND\r\n\
                 Content-Length: {}\r\n\r\n", body.len()).as_bytes());
    request.extend_from_slice(&body);
    let response = exchange(&mut handler, &sock, &request);
    assert_eq!(status_line(&response), "HTTP/1.1 201 Created");
    assert_eq!(std_fs::read(store.join("note.txt")).unwrap(),
               b"stored-bytes");

    let response = exchange(
        &mut handler, &sock,
        b"DELETE /upload/note.txt HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(status_line(&response), "HTTP/1.1 204 No Content");
    assert!(!store.join("note.txt").exists());
}

#[test]
fn alias_replaces_matched_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let assets = tempfile::tempdir().unwrap();
    std_fs::write(assets.path().join("site.css"), "body{}").unwrap();

    let location = LocationConfig::new("/assets", MatchType::Prefix).unwrap()
        .alias(Path::parse(assets.path().to_str().unwrap()).unwrap());
    let config = HttpConfig::new().server(
        ServerConfig::new()
            .listen(ListenDirective::parse("8080").unwrap())
            .root(Path::parse(dir.path().to_str().unwrap()).unwrap())
            .location(location));
    let sock = MockSock::new();
    let mut handler = handler_for(config, sock.clone());
    let response = exchange(&mut handler, &sock,
                            b"GET /assets/site.css HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(status_line(&response), "HTTP/1.1 200 OK");
    assert!(response.contains("Content-Type: text/css\r\n"));
    assert_eq!(body_of(&response), "body{}");
}

#[test]
fn custom_headers_on_success_only() {
    let dir = tempfile::tempdir().unwrap();
    std_fs::write(dir.path().join("index.html"), "hello").unwrap();

    let location = LocationConfig::new("/", MatchType::Prefix).unwrap()
        .index("index.html")
        .custom_header("X-Frame-Options", "DENY");
    let config = HttpConfig::new().server(
        ServerConfig::new()
            .listen(ListenDirective::parse("8080").unwrap())
            .root(Path::parse(dir.path().to_str().unwrap()).unwrap())
            .location(location));
    let sock = MockSock::new();
    let mut handler = handler_for(config, sock.clone());

    let response = exchange(&mut handler, &sock,
                            b"GET /index.html HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(response.contains("X-Frame-Options: DENY\r\n"));

    let response = exchange(&mut handler, &sock,
                            b"GET /none HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(status_line(&response), "HTTP/1.1 404 Not Found");
    assert!(!response.contains("X-Frame-Options"));
}

#[test]
fn peer_close_moves_to_closing() {
    let dir = tempfile::tempdir().unwrap();
    let sock = MockSock::new();
    let mut handler = handler_for(site_config(dir.path()), sock.clone());
    sock.close_input();
    handler.process_event();
    assert_eq!(handler.state(), State::Closing);
    assert!(handler.should_close());
    assert!(sock.output().is_empty());
}
