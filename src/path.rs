use std::fmt;
use std::path::PathBuf;

use url::percent_encoding::percent_decode;


/// Longest path accepted anywhere in the server
const MAX_PATH_LENGTH: usize = 4096;
/// Longest single path component
const MAX_FILENAME_LENGTH: usize = 255;
/// Bytes never allowed inside a path component
const FORBIDDEN: &'static [u8] = b"\\:*?\"<>|";

quick_error! {
    #[derive(Debug, PartialEq)]
    pub enum PathError {
        Empty {
            display("path is empty")
        }
        TooLong(len: usize) {
            display("path is {} characters long (max {})",
                    len, MAX_PATH_LENGTH)
        }
        FilenameTooLong(name: String) {
            display("path component {:?} is longer than {} characters",
                    name, MAX_FILENAME_LENGTH)
        }
        ForbiddenCharacter(name: String) {
            display("path component {:?} contains a forbidden character",
                    name)
        }
        Traversal {
            display("path contains a `..` segment")
        }
        NotAbsolute {
            display("path must be absolute")
        }
    }
}

/// A validated filesystem or request path
///
/// The validation is about what a path may ever contain (length caps,
/// control characters, Windows-reserved punctuation); whether `..` is
/// acceptable depends on the caller, so traversal is a separate check.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    inner: String,
}

impl Path {
    pub fn parse(s: &str) -> Result<Path, PathError> {
        Path::check(s)?;
        Ok(Path { inner: s.to_string() })
    }

    /// Like `parse` but additionally requires a leading `/`
    pub fn parse_absolute(s: &str) -> Result<Path, PathError> {
        if !s.starts_with('/') {
            return Err(PathError::NotAbsolute);
        }
        Path::parse(s)
    }

    fn check(s: &str) -> Result<(), PathError> {
        if s.is_empty() {
            return Err(PathError::Empty);
        }
        if s.len() > MAX_PATH_LENGTH {
            return Err(PathError::TooLong(s.len()));
        }
        for component in s.split('/') {
            if component.len() > MAX_FILENAME_LENGTH {
                return Err(PathError::FilenameTooLong(component.to_string()));
            }
            let bad = component.bytes()
                .any(|b| b < 0x20 || b == 0x7f || FORBIDDEN.contains(&b));
            if bad {
                return Err(PathError::ForbiddenCharacter(
                    component.to_string()));
            }
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }

    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(&self.inner)
    }

    pub fn is_absolute(&self) -> bool {
        self.inner.starts_with('/')
    }

    /// True for paths spelled with a trailing slash
    pub fn is_directory(&self) -> bool {
        self.inner.ends_with('/')
    }

    /// Last path component, empty for directory-form paths
    pub fn filename(&self) -> &str {
        self.inner.rsplit('/').next().unwrap_or("")
    }

    /// Appends a component, collapsing the joining slashes
    pub fn join(&self, sub: &str) -> Path {
        let sub = sub.trim_left_matches('/');
        let mut joined = self.inner.clone();
        if !joined.ends_with('/') {
            joined.push('/');
        }
        joined.push_str(sub);
        Path { inner: joined }
    }

    /// Removes `.` segments and resolves `..` without escaping the root
    ///
    /// `/a/./b/../c` becomes `/a/c`; a `..` at the root is dropped rather
    /// than allowed to climb above it. Trailing-slash form is preserved.
    pub fn normalize(&self) -> Path {
        let absolute = self.is_absolute();
        let trailing = self.is_directory() && self.inner.len() > 1;
        let mut segments: Vec<&str> = Vec::new();
        for segment in self.inner.split('/') {
            match segment {
                "" | "." => {}
                ".." => { segments.pop(); }
                other => segments.push(other),
            }
        }
        let mut result = String::with_capacity(self.inner.len());
        if absolute {
            result.push('/');
        }
        result.push_str(&segments.join("/"));
        if trailing && !result.ends_with('/') {
            result.push('/');
        }
        if result.is_empty() {
            result.push('.');
        }
        Path { inner: result }
    }
}

/// True if the percent-decoded form of `raw` contains a `..` segment
///
/// Decoding happens first so that `%2e%2e%2f` is caught the same way a
/// literal `../` is.
pub fn has_directory_traversal(raw: &str) -> bool {
    let decoded = percent_decode(raw.as_bytes()).decode_utf8_lossy();
    decoded.split('/').any(|segment| segment == "..")
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.inner)
    }
}
