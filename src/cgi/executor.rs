use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use libc;

use cgi::{CgiContext, CgiError, CgiRequest, CgiResponse};
use fs::Fs;


/// Ceiling on collected stdout (and, separately, stderr)
pub const DEFAULT_MAX_OUTPUT: usize = 10 << 20;
/// Grace between SIGTERM and SIGKILL when a script overruns
const KILL_GRACE: Duration = Duration::from_millis(100);
/// Longest single poll(2) sleep, so the deadline is checked regularly
const POLL_INTERVAL_MS: libc::c_int = 100;

const PIPE_BUFFER_SIZE: usize = 4096;

/// Runs one script per call, with a deadline and bounded output
///
/// The child gets its own process group so a timeout can kill the
/// script together with anything it spawned. The parent never blocks
/// on the child itself: body writing and output draining go through
/// non-blocking pipes and poll(2), and the exit status is collected
/// with a non-blocking wait on every loop turn.
pub struct CgiExecutor {
    timeout: Duration,
    max_output: usize,
}

impl CgiExecutor {
    pub fn new(timeout: Duration) -> CgiExecutor {
        CgiExecutor {
            timeout: timeout,
            max_output: DEFAULT_MAX_OUTPUT,
        }
    }

    pub fn max_output(mut self, bytes: usize) -> CgiExecutor {
        self.max_output = bytes;
        self
    }

    pub fn execute(&self, fs: &dyn Fs, request: &CgiRequest)
        -> Result<CgiResponse, CgiError>
    {
        self.validate(fs, request)?;
        debug!("cgi: executing {:?}", request.script_path());

        let mut context = self.spawn(request)?;
        let deadline = Instant::now() + self.timeout;
        let pumped = self.pump(&mut context, request.body(), deadline);
        ensure_reaped(&mut context);
        pumped?;

        if context.timed_out {
            return Err(CgiError::Timeout);
        }
        match context.exit_code() {
            Some(0) => {}
            Some(code) => {
                return Err(CgiError::ProcessFailed(code,
                                                   context.stderr_text()));
            }
            None => return Err(CgiError::Killed),
        }
        if !context.stderr.is_empty() {
            warn!("cgi: {:?} wrote to stderr: {}",
                  request.script_path(), context.stderr_text());
        }
        if context.stdout.is_empty() {
            return Err(CgiError::EmptyOutput);
        }
        CgiResponse::parse(&context.stdout)
    }

    fn validate(&self, fs: &dyn Fs, request: &CgiRequest)
        -> Result<(), CgiError>
    {
        let script = request.script_path();
        if !fs.exists(script) {
            return Err(CgiError::ScriptNotFound(
                script.to_string_lossy().into_owned()));
        }
        if !fs.is_executable(script) && request.interpreter().is_none() {
            return Err(CgiError::ScriptNotExecutable(
                script.to_string_lossy().into_owned()));
        }
        if let Some(interpreter) = request.interpreter() {
            if !fs.exists(interpreter) || !fs.is_executable(interpreter) {
                return Err(CgiError::InterpreterNotFound(
                    interpreter.to_string_lossy().into_owned()));
            }
        }
        Ok(())
    }

    fn spawn(&self, request: &CgiRequest) -> Result<CgiContext, CgiError> {
        let mut command = match request.interpreter() {
            Some(interpreter) => {
                let mut command = Command::new(interpreter);
                command.arg(request.script_path());
                command
            }
            None => Command::new(request.script_path()),
        };
        command.env_clear()
            .envs(request.env())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        unsafe {
            command.pre_exec(|| {
                if libc::setpgid(0, 0) != 0 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }
        let child = command.spawn().map_err(CgiError::SpawnFailed)?;
        Ok(CgiContext::new(child))
    }

    /// Feeds the body and drains stdout/stderr until the child is done
    /// or the deadline passes
    fn pump(&self, context: &mut CgiContext, body: &[u8], deadline: Instant)
        -> Result<(), CgiError>
    {
        let mut stdin = context.child.stdin.take();
        let mut stdout = context.child.stdout.take();
        let mut stderr = context.child.stderr.take();
        for fd in [stdin.as_ref().map(|s| s.as_raw_fd()),
                   stdout.as_ref().map(|s| s.as_raw_fd()),
                   stderr.as_ref().map(|s| s.as_raw_fd())].iter()
        {
            if let Some(fd) = *fd {
                set_nonblocking(fd);
            }
        }
        let mut written = 0;
        if body.is_empty() {
            stdin = None;
        }

        loop {
            if context.exit.is_none() {
                if let Some(status) = context.child.try_wait()? {
                    context.exit = Some(status);
                }
            }
            if stdout.is_none() && stderr.is_none() && context.exit.is_some() {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                warn!("cgi: deadline passed, killing process group {}",
                      context.pid());
                kill_group(context.pid(), libc::SIGTERM);
                thread::sleep(KILL_GRACE);
                kill_group(context.pid(), libc::SIGKILL);
                context.exit = Some(context.child.wait()?);
                context.timed_out = true;
                // pick up whatever the script managed to produce
                if let Some(ref mut pipe) = stdout {
                    drain(pipe, &mut context.stdout, self.max_output);
                }
                if let Some(ref mut pipe) = stderr {
                    drain(pipe, &mut context.stderr, self.max_output);
                }
                return Ok(());
            }

            let remaining = deadline - now;
            let mut timeout_ms = remaining.as_secs() as libc::c_int * 1000
                + remaining.subsec_nanos() as libc::c_int / 1_000_000;
            if timeout_ms > POLL_INTERVAL_MS {
                timeout_ms = POLL_INTERVAL_MS;
            }

            let mut fds: Vec<libc::pollfd> = Vec::with_capacity(3);
            let mut roles: Vec<Role> = Vec::with_capacity(3);
            if let Some(ref pipe) = stdin {
                fds.push(pollfd(pipe.as_raw_fd(), libc::POLLOUT));
                roles.push(Role::Stdin);
            }
            if let Some(ref pipe) = stdout {
                fds.push(pollfd(pipe.as_raw_fd(), libc::POLLIN));
                roles.push(Role::Stdout);
            }
            if let Some(ref pipe) = stderr {
                fds.push(pollfd(pipe.as_raw_fd(), libc::POLLIN));
                roles.push(Role::Stderr);
            }

            let rc = unsafe {
                libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t,
                           timeout_ms)
            };
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(CgiError::Io(err));
            }
            if rc == 0 {
                continue;
            }

            for (pfd, role) in fds.iter().zip(roles.iter()) {
                let ready = pfd.revents &
                    (libc::POLLIN | libc::POLLOUT |
                     libc::POLLHUP | libc::POLLERR);
                if ready == 0 {
                    continue;
                }
                match *role {
                    Role::Stdin => {
                        let finished = {
                            let pipe = stdin.as_mut().unwrap();
                            match pipe.write(&body[written..]) {
                                Ok(n) => {
                                    written += n;
                                    written >= body.len()
                                }
                                Err(ref e)
                                    if e.kind() == io::ErrorKind::WouldBlock ||
                                       e.kind() == io::ErrorKind::Interrupted
                                => false,
                                Err(e) => {
                                    // EPIPE: the script closed its stdin
                                    debug!("cgi: stdin write failed: {}", e);
                                    true
                                }
                            }
                        };
                        if finished {
                            stdin = None;
                        }
                    }
                    Role::Stdout => {
                        let done = read_step(stdout.as_mut().unwrap(),
                                             &mut context.stdout,
                                             self.max_output);
                        if done {
                            stdout = None;
                        }
                    }
                    Role::Stderr => {
                        let done = read_step(stderr.as_mut().unwrap(),
                                             &mut context.stderr,
                                             self.max_output);
                        if done {
                            stderr = None;
                        }
                    }
                }
            }
        }
    }
}

enum Role {
    Stdin,
    Stdout,
    Stderr,
}

fn pollfd(fd: libc::c_int, events: libc::c_short) -> libc::pollfd {
    libc::pollfd { fd: fd, events: events, revents: 0 }
}

/// One non-blocking read; true means the pipe is finished
fn read_step<R: Read>(pipe: &mut R, sink: &mut Vec<u8>, cap: usize) -> bool {
    let mut buffer = [0u8; PIPE_BUFFER_SIZE];
    match pipe.read(&mut buffer) {
        Ok(0) => true,
        Ok(n) => {
            let room = cap.saturating_sub(sink.len());
            let take = ::std::cmp::min(room, n);
            sink.extend_from_slice(&buffer[..take]);
            false
        }
        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock ||
                      e.kind() == io::ErrorKind::Interrupted => false,
        Err(_) => true,
    }
}

/// Drains whatever is immediately readable, without blocking
fn drain<R: Read>(pipe: &mut R, sink: &mut Vec<u8>, cap: usize) {
    let mut buffer = [0u8; PIPE_BUFFER_SIZE];
    loop {
        match pipe.read(&mut buffer) {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                let room = cap.saturating_sub(sink.len());
                let take = ::std::cmp::min(room, n);
                sink.extend_from_slice(&buffer[..take]);
            }
        }
    }
}

fn set_nonblocking(fd: libc::c_int) {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL, 0);
        if flags >= 0 {
            libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
        }
    }
}

fn kill_group(pid: u32, signal: libc::c_int) {
    unsafe {
        libc::kill(-(pid as libc::pid_t), signal);
    }
}

/// The child must never outlive the request as a zombie
fn ensure_reaped(context: &mut CgiContext) {
    if context.exit.is_some() {
        return;
    }
    match context.child.try_wait() {
        Ok(Some(status)) => context.exit = Some(status),
        _ => {
            kill_group(context.pid(), libc::SIGKILL);
            if let Ok(status) = context.child.wait() {
                context.exit = Some(status);
            }
        }
    }
}

#[cfg(test)]
mod test {
    extern crate tempfile;

    use std::fs as std_fs;
    use std::net::SocketAddr;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use std::time::{Duration, Instant};

    use cgi::{CgiError, CgiRequest};
    use config::CgiConfig;
    use enums::{Method, Version};
    use fs::DiskFs;
    use server::request::HttpRequest;
    use super::CgiExecutor;

    fn write_script(dir: &::std::path::Path, name: &str, text: &str)
        -> PathBuf
    {
        let path = dir.join(name);
        std_fs::write(&path, text).unwrap();
        let mut perms = std_fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std_fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn cgi_request(script: PathBuf, body: &[u8]) -> CgiRequest {
        let cgi = CgiConfig::new().extension("sh")
            .parameter("PATH", "/bin:/usr/bin");
        let mut request = HttpRequest::new(
            Method::Post, "/cgi/test.sh".to_string(), String::new(),
            Version::Http11);
        request.add_header("Host", "x");
        request.set_body(body.to_vec());
        let peer: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        CgiRequest::new(&request, &cgi, script, "/cgi/test.sh", "",
                        "/srv", &peer, "x", 8080)
    }

    #[test]
    fn echoes_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(), "echo.sh",
            "#!/bin/sh\nprintf 'Content-Type: text/plain\\r\\n\\r\\n'\ncat\n");
        let executor = CgiExecutor::new(Duration::from_secs(5));
        let response = executor
            .execute(&DiskFs, &cgi_request(script, b"HELLO"))
            .unwrap();
        assert_eq!(response.content_type(), "text/plain");
        assert_eq!(response.body(), b"HELLO");
    }

    #[test]
    fn script_sees_environment() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(), "env.sh",
            "#!/bin/sh\nprintf 'Content-Type: text/plain\\r\\n\\r\\n'\n\
             printf '%s %s' \"$REQUEST_METHOD\" \"$CONTENT_LENGTH\"\n");
        let executor = CgiExecutor::new(Duration::from_secs(5));
        let response = executor
            .execute(&DiskFs, &cgi_request(script, b"HELLO"))
            .unwrap();
        assert_eq!(response.body(), b"POST 5");
    }

    #[test]
    fn nonzero_exit_fails() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(), "fail.sh",
            "#!/bin/sh\necho boom >&2\nexit 3\n");
        let executor = CgiExecutor::new(Duration::from_secs(5));
        let err = executor
            .execute(&DiskFs, &cgi_request(script, b""))
            .unwrap_err();
        match err {
            CgiError::ProcessFailed(3, ref stderr) => {
                assert!(stderr.contains("boom"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(err.status().as_u16(), 500);
    }

    #[test]
    fn empty_output_fails() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "quiet.sh",
                                  "#!/bin/sh\nexit 0\n");
        let executor = CgiExecutor::new(Duration::from_secs(5));
        let err = executor
            .execute(&DiskFs, &cgi_request(script, b""))
            .unwrap_err();
        assert_matches!(err, CgiError::EmptyOutput);
    }

    #[test]
    fn missing_script_fails() {
        let executor = CgiExecutor::new(Duration::from_secs(1));
        let err = executor
            .execute(&DiskFs,
                     &cgi_request(PathBuf::from("/nonexistent.sh"), b""))
            .unwrap_err();
        assert_matches!(err, CgiError::ScriptNotFound(_));
    }

    #[test]
    fn timeout_kills_and_reaps() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "slow.sh",
                                  "#!/bin/sh\nsleep 30\n");
        let executor = CgiExecutor::new(Duration::from_millis(300));
        let started = Instant::now();
        let err = executor
            .execute(&DiskFs, &cgi_request(script, b""))
            .unwrap_err();
        assert_matches!(err, CgiError::Timeout);
        assert_eq!(err.status().as_u16(), 504);
        // SIGTERM + grace, nowhere near the 30s sleep
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
