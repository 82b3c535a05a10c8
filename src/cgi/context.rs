use std::process::{Child, ExitStatus};


/// A running (or finished) CGI child
///
/// Owns the process handle and the parent-side pipe ends (inside
/// `Child`), plus everything collected while pumping them. The
/// executor guarantees the child is reaped before the context is
/// dropped, so no zombie survives a request.
#[derive(Debug)]
pub struct CgiContext {
    pub child: Child,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit: Option<ExitStatus>,
    pub timed_out: bool,
}

impl CgiContext {
    pub fn new(child: Child) -> CgiContext {
        CgiContext {
            child: child,
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit: None,
            timed_out: false,
        }
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit.and_then(|status| status.code())
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}
