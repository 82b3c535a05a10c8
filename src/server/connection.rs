//! One client connection
//!
//! `ConnectionHandler` owns its socket and all per-request buffers and
//! is driven from outside: the event loop calls `process_event()` when
//! the socket is readable or writable and `is_timed_out()` on its
//! sweep. Every read and write is non-blocking; `WouldBlock` always
//! surrenders back to the loop. Errors never escape: anything that
//! goes wrong inside a call becomes a synthesized response (or moves
//! straight to `Closing`).

use std::io::{ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Instant;

use netbuf::Buf;

use config::{HttpConfig, ListenDirective, HARD_MAX_BODY_SIZE};
use enums::Method;
use fs::Fs;
use mime::MimeTypes;
use server::dispatch::{self, RequestContext};
use server::parser::Parser;
use server::request::HttpRequest;
use server::response::HttpResponse;
use status;
use status::StatusCode;


/// How much is read from the socket per readiness event
pub const READ_BUFFER_SIZE: usize = 8192;
/// Ceiling on one buffered request (head and body together)
pub const MAX_REQUEST_SIZE: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    ReadingRequest,
    Processing,
    WritingResponse,
    KeepAlive,
    Closing,
}

pub struct ConnectionHandler<S> {
    sock: S,
    peer: SocketAddr,
    local: ListenDirective,
    config: Rc<HttpConfig>,
    mime: Rc<MimeTypes>,
    fs: Rc<dyn Fs>,
    state: State,
    in_buf: Buf,
    out_buf: Buf,
    parser: Parser,
    pending: Option<HttpRequest>,
    keep_alive: bool,
    is_head: bool,
    log_line: Option<String>,
    last_activity: Instant,
}

impl<S: Read + Write> ConnectionHandler<S> {
    pub fn new(sock: S, peer: SocketAddr, local: ListenDirective,
               config: Rc<HttpConfig>, mime: Rc<MimeTypes>, fs: Rc<dyn Fs>)
        -> ConnectionHandler<S>
    {
        debug!("connection from {}", peer);
        ConnectionHandler {
            sock: sock,
            peer: peer,
            local: local,
            config: config,
            mime: mime,
            fs: fs,
            state: State::ReadingRequest,
            in_buf: Buf::new(),
            out_buf: Buf::new(),
            parser: Parser::new(HARD_MAX_BODY_SIZE),
            pending: None,
            keep_alive: false,
            is_head: false,
            log_line: None,
            last_activity: Instant::now(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn peer(&self) -> &SocketAddr {
        &self.peer
    }

    /// The owned socket, for registration with the poller
    pub fn socket(&self) -> &S {
        &self.sock
    }

    /// The loop drops the handler (and with it the socket) when this
    /// turns true
    pub fn should_close(&self) -> bool {
        self.state == State::Closing && self.out_buf.is_empty()
    }

    /// Whether the loop should also watch for writability
    pub fn wants_write(&self) -> bool {
        !self.out_buf.is_empty()
    }

    /// Drives the state machine as far as the socket allows
    pub fn process_event(&mut self) {
        self.last_activity = Instant::now();
        loop {
            match self.state {
                State::ReadingRequest | State::KeepAlive => {
                    if !self.handle_read() {
                        return;
                    }
                }
                State::Processing => {
                    self.process_request();
                }
                State::WritingResponse => {
                    self.handle_write();
                    return;
                }
                State::Closing => {
                    return;
                }
            }
        }
    }

    /// Timeout check for the sweep; reading and writing share the
    /// request timeout, parked keep-alive connections get the shorter
    /// idle timeout
    pub fn is_timed_out(&self, now: Instant) -> bool {
        let limit = match self.state {
            State::KeepAlive => self.config.get_keepalive_timeout(),
            _ => self.config.get_request_timeout(),
        };
        now.duration_since(self.last_activity) > limit
    }

    /// Called by the loop when the deadline passed: a half-read
    /// request gets a 408, everything else just closes
    pub fn on_timeout(&mut self) {
        let half_read = self.state == State::ReadingRequest &&
            (self.in_buf.len() > 0 || self.parser.past_headers());
        if half_read {
            info!("{} timed out mid-request", self.peer);
            self.synthesize_error(status::REQUEST_TIMEOUT);
            self.handle_write();
        } else {
            debug!("{} idle timeout", self.peer);
        }
        self.state = State::Closing;
    }

    /// Returns true when the machine should keep running states
    fn handle_read(&mut self) -> bool {
        let mut chunk = [0u8; READ_BUFFER_SIZE];
        match self.sock.read(&mut chunk) {
            Ok(0) => {
                debug!("{} closed by peer", self.peer);
                self.state = State::Closing;
                return false;
            }
            Ok(n) => {
                self.in_buf.extend(&chunk[..n]);
                debug!("read {} bytes from {} (buffered {})",
                       n, self.peer, self.in_buf.len());
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock ||
                          e.kind() == ErrorKind::Interrupted => {
                return false;
            }
            Err(e) => {
                info!("read error from {}: {}", self.peer, e);
                self.state = State::Closing;
                return false;
            }
        }
        if self.state == State::KeepAlive {
            self.state = State::ReadingRequest;
        }
        if self.in_buf.len() > MAX_REQUEST_SIZE {
            info!("{} exceeded the request size ceiling", self.peer);
            self.synthesize_error(status::PAYLOAD_TOO_LARGE);
            return true;
        }
        match self.parser.feed(&mut self.in_buf) {
            Ok(Some(request)) => {
                self.state = State::Processing;
                self.pending = Some(request);
                true
            }
            Ok(None) => false,
            Err(err) => {
                info!("parse error from {}: {}", self.peer, err);
                self.synthesize_error(err.status());
                true
            }
        }
    }

    fn process_request(&mut self) {
        let request = match self.pending.take() {
            Some(request) => request,
            None => {
                self.synthesize_error(status::INTERNAL_SERVER_ERROR);
                return;
            }
        };
        let ctx = RequestContext {
            config: &*self.config,
            fs: &*self.fs,
            mime: &*self.mime,
            local: self.local.clone(),
            peer: self.peer,
        };
        let mut response = dispatch::handle(&request, &ctx);

        self.is_head = request.method() == Method::Head;
        let closing = response.header("Connection")
            .map(|v| v.eq_ignore_ascii_case("close"))
            .unwrap_or(false);
        self.keep_alive = request.is_keep_alive() && !closing;
        if response.header("Connection").is_none() {
            let value = if self.keep_alive { "keep-alive" } else { "close" };
            response.set_header("Connection", value);
        }
        self.log_line = Some(format!(
            "{} - \"{} {} {}\" {}",
            self.peer, request.method(), request.path(), request.version(),
            response.status().as_u16()));
        response.serialize_into(&mut self.out_buf, self.is_head);
        self.state = State::WritingResponse;
    }

    fn handle_write(&mut self) {
        if !self.out_buf.is_empty() {
            let written = {
                let data = &self.out_buf[..];
                self.sock.write(data)
            };
            match written {
                Ok(0) => {
                    info!("{} write returned zero, closing", self.peer);
                    self.state = State::Closing;
                    return;
                }
                Ok(n) => {
                    self.out_buf.consume(n);
                    debug!("wrote {} bytes to {} ({} left)",
                           n, self.peer, self.out_buf.len());
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock ||
                              e.kind() == ErrorKind::Interrupted => {
                    return;
                }
                Err(e) => {
                    info!("write error to {}: {}", self.peer, e);
                    self.state = State::Closing;
                    return;
                }
            }
        }
        if self.out_buf.is_empty() {
            self.finish_response();
        }
    }

    /// Response fully flushed: log it, then park or close
    fn finish_response(&mut self) {
        if let Some(line) = self.log_line.take() {
            info!("{}", line);
        }
        if self.keep_alive && self.state == State::WritingResponse {
            debug!("{} parked for keep-alive", self.peer);
            self.reset_for_next_request();
            self.state = State::KeepAlive;
        } else {
            debug!("closing {}", self.peer);
            self.state = State::Closing;
        }
    }

    /// Converts a failure into a response; error responses always
    /// close the connection afterwards
    fn synthesize_error(&mut self, code: StatusCode) {
        let response = HttpResponse::error(code);
        self.keep_alive = false;
        self.log_line = Some(format!(
            "{} - error {}", self.peer, code.as_u16()));
        self.out_buf = Buf::new();
        response.serialize_into(&mut self.out_buf, false);
        self.state = State::WritingResponse;
    }

    fn reset_for_next_request(&mut self) {
        self.in_buf = Buf::new();
        self.out_buf = Buf::new();
        self.parser = Parser::new(HARD_MAX_BODY_SIZE);
        self.pending = None;
        self.is_head = false;
        self.keep_alive = false;
        self.log_line = None;
    }
}
