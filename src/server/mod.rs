//! The request-handling engine
//!
//! `parser` turns inbound bytes into `HttpRequest`s, `router` picks
//! the virtual host and location, `dispatch` runs the matching
//! handler, `response` serializes the result, and `connection` ties
//! them together into the per-connection state machine that
//! `event_loop`/`workers` drive.

pub mod connection;
pub mod dispatch;
pub mod error;
pub mod event_loop;
pub mod parser;
pub mod request;
pub mod response;
pub mod router;
pub mod workers;

pub use self::connection::{ConnectionHandler, State};
pub use self::dispatch::RequestContext;
pub use self::error::ParseError;
pub use self::parser::Parser;
pub use self::request::HttpRequest;
pub use self::response::HttpResponse;
pub use self::workers::serve;
