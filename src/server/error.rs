use httparse;

use status;
use status::StatusCode;


quick_error! {
    /// Why an inbound request could not be turned into an `HttpRequest`
    ///
    /// Every variant has exactly one HTTP surface; the connection
    /// handler only ever sees `status()` and never inspects kinds.
    #[derive(Debug)]
    pub enum ParseError {
        Malformed(reason: &'static str) {
            display("malformed request: {}", reason)
        }
        ParseFailed(err: httparse::Error) {
            display("malformed request: {:?}", err)
        }
        UriTooLong(len: usize) {
            display("request target is {} bytes long", len)
        }
        HeaderTooLarge {
            display("header section exceeds the limit")
        }
        BodyTooLarge(declared: u64, limit: u64) {
            display("request body of {} bytes exceeds the limit of {}",
                    declared, limit)
        }
        RequestTooLarge {
            display("request exceeds the connection buffer ceiling")
        }
        MissingHost {
            display("HTTP/1.1 request without a Host header")
        }
        UnsupportedMethod(method: String) {
            display("unsupported method {:?}", method)
        }
        UnsupportedTransferEncoding(encoding: String) {
            display("unsupported transfer encoding {:?}", encoding)
        }
        UnsupportedVersion {
            display("unsupported HTTP version")
        }
        ChunkedEncoding {
            display("invalid chunked encoding")
        }
    }
}

impl ParseError {
    /// The response status this failure surfaces as
    pub fn status(&self) -> StatusCode {
        use self::ParseError::*;
        match *self {
            Malformed(..) | MissingHost | ChunkedEncoding => {
                status::BAD_REQUEST
            }
            ParseFailed(httparse::Error::Version) => {
                status::VERSION_NOT_SUPPORTED
            }
            ParseFailed(..) => status::BAD_REQUEST,
            UriTooLong(..) => status::URI_TOO_LONG,
            HeaderTooLarge | BodyTooLarge(..) | RequestTooLarge => {
                status::PAYLOAD_TOO_LARGE
            }
            UnsupportedMethod(..) | UnsupportedTransferEncoding(..) => {
                status::NOT_IMPLEMENTED
            }
            UnsupportedVersion => status::VERSION_NOT_SUPPORTED,
        }
    }
}
