//! Per-method resource handlers
//!
//! Handlers turn an already-routed request into a response. They report
//! failures as a bare status code; the dispatch layer owns the error
//! page machinery, so nothing here builds an error body.

pub mod delete;
pub mod listing;
pub mod static_files;
pub mod upload;

use server::response::HttpResponse;
use status::StatusCode;

/// Either a finished response or the status of a failure
pub type HandlerResult = Result<HttpResponse, StatusCode>;
