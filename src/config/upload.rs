use regex::Regex;

use path::Path;
use size::Size;


/// Upload settings of a location
///
/// A location with an upload config and POST in its allowed methods is
/// an upload route: POSTs there store the first file part of a
/// `multipart/form-data` body under `directory`.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    directory: Path,
    max_file_size: Option<Size>,
    max_total_size: Option<Size>,
    allowed_types: Vec<String>,
    filename_pattern: Option<Regex>,
}

impl UploadConfig {
    pub fn new(directory: Path) -> UploadConfig {
        UploadConfig {
            directory: directory,
            max_file_size: None,
            max_total_size: None,
            allowed_types: Vec::new(),
            filename_pattern: None,
        }
    }

    pub fn max_file_size(mut self, size: Size) -> UploadConfig {
        self.max_file_size = Some(size);
        self
    }

    pub fn max_total_size(mut self, size: Size) -> UploadConfig {
        self.max_total_size = Some(size);
        self
    }

    pub fn allow_type(mut self, mime: &str) -> UploadConfig {
        self.allowed_types.push(mime.to_ascii_lowercase());
        self
    }

    pub fn filename_pattern(mut self, pattern: Regex) -> UploadConfig {
        self.filename_pattern = Some(pattern);
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn validate_file_size(&self, size: u64) -> bool {
        self.max_file_size.map(|max| size <= max.bytes()).unwrap_or(true)
    }

    pub fn validate_total_size(&self, size: u64) -> bool {
        self.max_total_size.map(|max| size <= max.bytes()).unwrap_or(true)
    }

    /// True when `mime` is acceptable (no configured list allows all)
    pub fn validate_type(&self, mime: &str) -> bool {
        if self.allowed_types.is_empty() {
            return true;
        }
        // compare the bare type, ignoring parameters like charset
        let bare = mime.split(';').next().unwrap_or("").trim()
            .to_ascii_lowercase();
        self.allowed_types.iter().any(|t| *t == bare)
    }

    pub fn validate_filename(&self, name: &str) -> bool {
        self.filename_pattern.as_ref()
            .map(|re| re.is_match(name))
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod test {
    use regex::Regex;

    use path::Path;
    use size::Size;
    use super::UploadConfig;

    fn config() -> UploadConfig {
        UploadConfig::new(Path::parse("/srv/uploads").unwrap())
    }

    #[test]
    fn size_limits() {
        let cfg = config().max_file_size(Size::from_kilobytes(1));
        assert!(cfg.validate_file_size(1024));
        assert!(!cfg.validate_file_size(1025));
        assert!(config().validate_file_size(u64::max_value()));
    }

    #[test]
    fn type_allowlist() {
        let cfg = config().allow_type("image/png").allow_type("text/plain");
        assert!(cfg.validate_type("image/png"));
        assert!(cfg.validate_type("Text/Plain; charset=utf-8"));
        assert!(!cfg.validate_type("application/zip"));
        assert!(config().validate_type("anything/at-all"));
    }

    #[test]
    fn filename_pattern() {
        let cfg = config()
            .filename_pattern(Regex::new(r"^[a-z0-9_.]+$").unwrap());
        assert!(cfg.validate_filename("photo_1.png"));
        assert!(!cfg.validate_filename("no spaces.png"));
    }
}
