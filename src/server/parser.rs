use std::str::{FromStr, from_utf8};

use httparse::{self, EMPTY_HEADER, Request, Status};
use netbuf::Buf;
use url::percent_encoding::percent_decode;

use enums::{Method, Version};
use headers;
use path;
use path::Path;
use server::error::ParseError;
use server::request::HttpRequest;


/// Number of headers to allocate on a stack
const MIN_HEADERS: usize = 16;
/// A hard limit on the number of headers
const MAX_HEADERS: usize = 1024;

/// Default cap on the header section of one request
pub const MAX_HEADER_SECTION: usize = 8192;
/// Longest accepted request target (path plus query)
pub const MAX_TARGET_LENGTH: usize = 8192;

enum State {
    Head,
    FixedBody { request: HttpRequest, remaining: u64 },
    ChunkedBody { request: HttpRequest, chunk: Chunk, received: u64 },
}

enum Chunk {
    /// Expecting `hex-size CRLF`
    Size,
    /// Consuming chunk payload
    Data(u64),
    /// Expecting the CRLF that closes a chunk payload
    DataEnd,
    /// After the zero-size chunk: trailer lines until an empty one
    Trailer,
}

/// Incremental HTTP/1.1 request parser
///
/// `feed` consumes whatever prefix of the inbound buffer it can and
/// either needs more bytes (`Ok(None)`), finished one request
/// (`Ok(Some(..))`) or failed with a kind that maps onto a response
/// status. The head is re-parsed from the buffered bytes on every call
/// until it is complete, which keeps the parser stateless across
/// partial heads; body bytes are consumed as they arrive.
pub struct Parser {
    state: State,
    max_body: u64,
    max_header: usize,
}

impl Parser {
    pub fn new(max_body: u64) -> Parser {
        Parser {
            state: State::Head,
            max_body: max_body,
            max_header: MAX_HEADER_SECTION,
        }
    }

    /// True once the start line and headers have been consumed
    pub fn past_headers(&self) -> bool {
        !matches!(self.state, State::Head)
    }

    pub fn feed(&mut self, buf: &mut Buf) -> Result<Option<HttpRequest>,
                                                    ParseError>
    {
        loop {
            match ::std::mem::replace(&mut self.state, State::Head) {
                State::Head => {
                    match self.parse_head(buf)? {
                        Some(state) => {
                            self.state = state;
                        }
                        None => {
                            if buf.len() > self.max_header {
                                return Err(ParseError::HeaderTooLarge);
                            }
                            return Ok(None);
                        }
                    }
                }
                State::FixedBody { mut request, remaining } => {
                    let take = ::std::cmp::min(remaining, buf.len() as u64)
                        as usize;
                    request.append_body(&buf[..take]);
                    buf.consume(take);
                    let remaining = remaining - take as u64;
                    if remaining == 0 {
                        return Ok(Some(request));
                    }
                    self.state = State::FixedBody {
                        request: request,
                        remaining: remaining,
                    };
                    return Ok(None);
                }
                State::ChunkedBody { mut request, chunk, mut received } => {
                    let mut chunk = chunk;
                    loop {
                        match self.step_chunk(buf, &mut request,
                                              &mut received, chunk)?
                        {
                            ChunkStep::Next(next) => chunk = next,
                            ChunkStep::NeedsMore(stalled) => {
                                self.state = State::ChunkedBody {
                                    request: request,
                                    chunk: stalled,
                                    received: received,
                                };
                                return Ok(None);
                            }
                            ChunkStep::Complete => {
                                return Ok(Some(request));
                            }
                        }
                    }
                }
            }
        }
    }

    /// Parses the start line and header section when fully buffered
    fn parse_head(&self, buf: &mut Buf) -> Result<Option<State>, ParseError> {
        let (request, body, consumed) = {
            let mut vec;
            let mut headers = [EMPTY_HEADER; MIN_HEADERS];
            let mut raw = Request::new(&mut headers);
            let mut result = raw.parse(&buf[..]);
            if matches!(result, Err(httparse::Error::TooManyHeaders)) {
                vec = vec![EMPTY_HEADER; MAX_HEADERS];
                raw = Request::new(&mut vec);
                result = raw.parse(&buf[..]);
            }
            match result.map_err(ParseError::ParseFailed)? {
                Status::Complete(consumed) => {
                    let (request, body) = self.scan_head(&raw)?;
                    (request, body, consumed)
                }
                Status::Partial => return Ok(None),
            }
        };
        buf.consume(consumed);
        Ok(Some(match body {
            BodyKind::None => {
                // nothing follows the head
                return Ok(Some(State::FixedBody {
                    request: request,
                    remaining: 0,
                }));
            }
            BodyKind::Fixed(len) => State::FixedBody {
                request: request,
                remaining: len,
            },
            BodyKind::Chunked => State::ChunkedBody {
                request: request,
                chunk: Chunk::Size,
                received: 0,
            },
        }))
    }

    /// Validates the parsed head and applies the body length algorithm
    ///
    /// The length of a request body is determined by (in order of
    /// precedence): a `Transfer-Encoding` ending in `chunked`, then a
    /// single valid `Content-Length`, then no body at all. Carrying
    /// both headers, or a duplicate `Content-Length`, is malformed.
    fn scan_head(&self, raw: &Request)
        -> Result<(HttpRequest, BodyKind), ParseError>
    {
        let version = match raw.version.unwrap() {
            0 => Version::Http10,
            1 => Version::Http11,
            _ => return Err(ParseError::UnsupportedVersion),
        };
        let method_str = raw.method.unwrap();
        let method = Method::from_str(method_str)
            .map_err(|()| ParseError::UnsupportedMethod(
                method_str.to_string()))?;
        let (path, raw_query) = parse_target(raw.path.unwrap())?;

        let mut request = HttpRequest::new(method, path, raw_query, version);
        let mut body = BodyKind::None;
        let mut has_content_length = false;
        for header in raw.headers.iter() {
            let value = from_utf8(header.value)
                .map_err(|_| ParseError::Malformed("bad header value"))?;
            if header.name.eq_ignore_ascii_case("Transfer-Encoding") {
                if has_content_length {
                    return Err(ParseError::Malformed(
                        "both content-length and transfer-encoding"));
                }
                let last = header.value.split(|&b| b == b',').last();
                match last {
                    Some(enc) if headers::is_chunked(enc) => {
                        body = BodyKind::Chunked;
                    }
                    _ => return Err(ParseError::UnsupportedTransferEncoding(
                        value.to_string())),
                }
            } else if header.name.eq_ignore_ascii_case("Content-Length") {
                if has_content_length {
                    return Err(ParseError::Malformed(
                        "duplicate content-length"));
                }
                if body == BodyKind::Chunked {
                    return Err(ParseError::Malformed(
                        "both content-length and transfer-encoding"));
                }
                has_content_length = true;
                let length: u64 = value.trim().parse()
                    .map_err(|_| ParseError::Malformed(
                        "invalid content-length"))?;
                if length > 0 {
                    body = BodyKind::Fixed(length);
                }
            } else if header.name.eq_ignore_ascii_case("Host") {
                if request.has_header("host") {
                    return Err(ParseError::Malformed("duplicate host"));
                }
            }
            request.add_header(header.name, value);
        }
        if version == Version::Http11 &&
            request.header("host").map(|h| h.is_empty()).unwrap_or(true)
        {
            return Err(ParseError::MissingHost);
        }
        if let BodyKind::Fixed(length) = body {
            if length > self.max_body {
                return Err(ParseError::BodyTooLarge(length, self.max_body));
            }
        }
        Ok((request, body))
    }

    fn step_chunk(&self, buf: &mut Buf, request: &mut HttpRequest,
                  received: &mut u64, chunk: Chunk)
        -> Result<ChunkStep, ParseError>
    {
        match chunk {
            Chunk::Size => {
                match httparse::parse_chunk_size(&buf[..]) {
                    Ok(Status::Complete((consumed, size))) => {
                        buf.consume(consumed);
                        if size == 0 {
                            Ok(ChunkStep::Next(Chunk::Trailer))
                        } else {
                            *received = received.checked_add(size)
                                .ok_or(ParseError::ChunkedEncoding)?;
                            if *received > self.max_body {
                                return Err(ParseError::BodyTooLarge(
                                    *received, self.max_body));
                            }
                            Ok(ChunkStep::Next(Chunk::Data(size)))
                        }
                    }
                    Ok(Status::Partial) => {
                        Ok(ChunkStep::NeedsMore(Chunk::Size))
                    }
                    Err(_) => Err(ParseError::ChunkedEncoding),
                }
            }
            Chunk::Data(remaining) => {
                let take = ::std::cmp::min(remaining, buf.len() as u64)
                    as usize;
                request.append_body(&buf[..take]);
                buf.consume(take);
                let remaining = remaining - take as u64;
                if remaining == 0 {
                    Ok(ChunkStep::Next(Chunk::DataEnd))
                } else {
                    Ok(ChunkStep::NeedsMore(Chunk::Data(remaining)))
                }
            }
            Chunk::DataEnd => {
                if buf.len() < 2 {
                    return Ok(ChunkStep::NeedsMore(Chunk::DataEnd));
                }
                if &buf[..2] != b"\r\n" {
                    return Err(ParseError::ChunkedEncoding);
                }
                buf.consume(2);
                Ok(ChunkStep::Next(Chunk::Size))
            }
            Chunk::Trailer => {
                // consume lines until the terminating empty one
                match find_crlf(&buf[..]) {
                    Some(0) => {
                        buf.consume(2);
                        Ok(ChunkStep::Complete)
                    }
                    Some(line) => {
                        buf.consume(line + 2);
                        Ok(ChunkStep::Next(Chunk::Trailer))
                    }
                    None => Ok(ChunkStep::NeedsMore(Chunk::Trailer)),
                }
            }
        }
    }
}

enum ChunkStep {
    Next(Chunk),
    NeedsMore(Chunk),
    Complete,
}

#[derive(PartialEq)]
enum BodyKind {
    None,
    Fixed(u64),
    Chunked,
}

/// Splits, decodes and normalizes the request target
fn parse_target(target: &str) -> Result<(String, String), ParseError> {
    let (raw_path, raw_query) = match target.find('?') {
        Some(pos) => (&target[..pos], &target[pos+1..]),
        None => (target, ""),
    };
    if !raw_path.starts_with('/') {
        return Err(ParseError::Malformed("request target is not absolute"));
    }
    if raw_path.len() > MAX_TARGET_LENGTH {
        return Err(ParseError::UriTooLong(raw_path.len()));
    }
    if path::has_directory_traversal(raw_path) {
        return Err(ParseError::Malformed("path traversal in request target"));
    }
    let decoded = percent_decode(raw_path.as_bytes())
        .decode_utf8()
        .map_err(|_| ParseError::Malformed("invalid percent encoding"))?;
    let path = Path::parse_absolute(&decoded)
        .map_err(|_| ParseError::Malformed("invalid characters in path"))?;
    Ok((path.normalize().as_str().to_string(), raw_query.to_string()))
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|pair| pair == b"\r\n")
}
