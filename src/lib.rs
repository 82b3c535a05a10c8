//! An nginx-style HTTP/1.1 web server
//!
//! The crate is built around three layers:
//!
//! 1. A declarative configuration model (`config`) with the validation
//!    rules of an nginx `server`/`location` hierarchy.
//! 2. A protocol core: incremental request parser, response serializer
//!    and a per-connection state machine (`server`) that is driven by
//!    readiness events and never blocks.
//! 3. Resource handlers (`handlers`, `cgi`) that turn a routed request
//!    into a response: static files, directory listings, uploads,
//!    redirects, DELETE and CGI scripts.
//!
//! The listening/polling driver lives in `server::event_loop` and
//! `server::workers`; everything below it is plain synchronous code
//! operating on in-memory buffers, which is also how the tests drive it.
#[macro_use] extern crate log;
#[macro_use] extern crate quick_error;
#[macro_use] extern crate matches;
extern crate httparse;
extern crate libc;
extern crate mio;
extern crate netbuf;
extern crate regex;
extern crate time;
extern crate url;

mod enums;
mod headers;
mod status;

pub mod cgi;
pub mod config;
pub mod fs;
pub mod handlers;
pub mod host;
pub mod mime;
pub mod path;
pub mod query;
pub mod server;
pub mod size;
pub mod uri;

pub use enums::{Method, Version};
pub use host::Host;
pub use path::Path;
pub use query::QueryString;
pub use size::Size;
pub use status::StatusCode;
pub use uri::Uri;

/// Software identity reported in `Server:` and `SERVER_SOFTWARE`
pub const SERVER_SOFTWARE: &'static str = concat!("tk-httpd/",
                                                  env!("CARGO_PKG_VERSION"));
