use host::HostError;
use path::PathError;
use size::SizeError;


quick_error! {
    /// Anything that can make a configuration invalid
    ///
    /// Configuration errors are fatal: they are raised by `validate()`
    /// before any socket is bound and abort startup.
    #[derive(Debug)]
    pub enum ConfigError {
        NoServers {
            display("configuration defines no server")
        }
        NoListen {
            display("server has no listen directive")
        }
        EmptyServer {
            display("server needs locations, a root or a return directive")
        }
        BadListen(reason: String) {
            display("invalid listen directive: {}", reason)
        }
        BadHost(err: HostError) {
            from()
            display("invalid host: {}", err)
        }
        BadPath(err: PathError) {
            from()
            display("invalid path: {}", err)
        }
        BadSize(err: SizeError) {
            from()
            display("invalid size: {}", err)
        }
        BadServerName(name: String) {
            display("invalid server name {:?}", name)
        }
        DuplicateListen(listen: String, name: String) {
            display("duplicate listen {} for server name {:?}",
                    listen, name)
        }
        MultipleDefaultServers(port: u16) {
            display("more than one default server for port {}", port)
        }
        EmptyLocationPattern {
            display("location pattern is empty")
        }
        BadLocationPattern(pattern: String, reason: String) {
            display("invalid location pattern {:?}: {}", pattern, reason)
        }
        NoMethodsAllowed(pattern: String) {
            display("location {:?} allows no method", pattern)
        }
        MissingRoot(pattern: String) {
            display("location {:?} has no root, alias or return, and the \
                     server has no root either", pattern)
        }
        RootConflictsWithAlias(pattern: String) {
            display("location {:?} sets both root and alias", pattern)
        }
        ProxyConflict(pattern: String, other: &'static str) {
            display("location {:?} combines proxy_pass with {}",
                    pattern, other)
        }
        RedirectConflict(pattern: String, other: &'static str) {
            display("location {:?} combines a return redirect with {}",
                    pattern, other)
        }
        UploadWithoutPost(pattern: String) {
            display("location {:?} configures uploads but does not allow \
                     POST", pattern)
        }
        ReservedCustomHeader(pattern: String, header: String) {
            display("location {:?} sets reserved header {:?}",
                    pattern, header)
        }
        BadReturnCode(code: u16) {
            display("invalid return code {}", code)
        }
        BadErrorPage(uri: String) {
            display("error page uri {:?} must start with '/'", uri)
        }
        BodySizeTooLarge(bytes: u64, max: u64) {
            display("client_max_body_size {} exceeds the hard ceiling {}",
                    bytes, max)
        }
        BadWorkers(value: u32) {
            display("invalid worker_processes {}", value)
        }
        BadConnections(value: u32) {
            display("invalid worker_connections {}", value)
        }
        BadTimeout(seconds: u64) {
            display("invalid timeout {} seconds", seconds)
        }
    }
}
