//! CGI/1.1 execution engine
//!
//! `CgiRequest` carries the child environment and body, `CgiExecutor`
//! runs the script in its own process group with piped stdio and a
//! deadline, `CgiContext` owns the running child, and `CgiResponse`
//! is the parsed script output (`Status:`/`Location:`/`Content-Type:`
//! pseudo-headers plus the exact body bytes).

mod context;
mod executor;
mod request;
mod response;

pub use self::context::CgiContext;
pub use self::executor::CgiExecutor;
pub use self::request::{CgiRequest, split_script_path};
pub use self::response::CgiResponse;

use std::io;

use status;
use status::StatusCode;

quick_error! {
    #[derive(Debug)]
    pub enum CgiError {
        ScriptNotFound(path: String) {
            display("script not found: {}", path)
        }
        ScriptNotExecutable(path: String) {
            display("script is not executable: {}", path)
        }
        InterpreterNotFound(path: String) {
            display("interpreter not found or not executable: {}", path)
        }
        SpawnFailed(err: io::Error) {
            display("failed to spawn script: {}", err)
        }
        Io(err: io::Error) {
            from()
            display("pipe error: {}", err)
        }
        Timeout {
            display("script execution timed out")
        }
        ProcessFailed(code: i32, stderr: String) {
            display("script exited with code {}: {}", code, stderr)
        }
        Killed {
            display("script was terminated by a signal")
        }
        EmptyOutput {
            display("script produced no output")
        }
        MissingSeparator {
            display("script output has no header/body separator")
        }
    }
}

impl CgiError {
    /// 504 for a timeout, 500 for everything else
    pub fn status(&self) -> StatusCode {
        match *self {
            CgiError::Timeout => status::GATEWAY_TIMEOUT,
            _ => status::INTERNAL_SERVER_ERROR,
        }
    }
}
