use std::collections::BTreeMap;
use std::time::Duration;

use path::Path;


/// Default wall-clock budget for one script execution
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// CGI settings of a location
///
/// `interpreter` is the executable the child runs (`/usr/bin/python3`
/// and friends); an empty interpreter means scripts are executed
/// directly. `extensions` select which files inside the location are
/// scripts; a regex location dispatches every match to CGI instead.
#[derive(Debug, Clone)]
pub struct CgiConfig {
    interpreter: Option<Path>,
    script_root: Option<Path>,
    extensions: Vec<String>,
    parameters: BTreeMap<String, String>,
    timeout: Duration,
}

impl CgiConfig {
    pub fn new() -> CgiConfig {
        CgiConfig {
            interpreter: None,
            script_root: None,
            extensions: Vec::new(),
            parameters: BTreeMap::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn interpreter(mut self, path: Path) -> CgiConfig {
        self.interpreter = Some(path);
        self
    }

    pub fn script_root(mut self, path: Path) -> CgiConfig {
        self.script_root = Some(path);
        self
    }

    pub fn extension(mut self, ext: &str) -> CgiConfig {
        self.extensions.push(ext.trim_left_matches('.').to_string());
        self
    }

    pub fn parameter(mut self, name: &str, value: &str) -> CgiConfig {
        self.parameters.insert(name.to_string(), value.to_string());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> CgiConfig {
        self.timeout = timeout;
        self
    }

    pub fn get_interpreter(&self) -> Option<&Path> {
        self.interpreter.as_ref()
    }

    pub fn get_script_root(&self) -> Option<&Path> {
        self.script_root.as_ref()
    }

    pub fn get_parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    pub fn get_timeout(&self) -> Duration {
        self.timeout
    }

    /// Does the file at `path` have one of the configured extensions?
    pub fn matches_extension(&self, path: &str) -> bool {
        let filename = path.rsplit('/').next().unwrap_or(path);
        match filename.rfind('.') {
            Some(pos) => {
                let ext = &filename[pos+1..];
                self.extensions.iter().any(|e| e == ext)
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::CgiConfig;

    #[test]
    fn extension_matching() {
        let cfg = CgiConfig::new().extension(".py").extension("sh");
        assert!(cfg.matches_extension("/srv/cgi/echo.py"));
        assert!(cfg.matches_extension("run.sh"));
        assert!(!cfg.matches_extension("/srv/cgi/readme.txt"));
        assert!(!cfg.matches_extension("/srv/cgi/noext"));
        assert!(!cfg.matches_extension("/srv/cgi.py/file"));
    }
}
