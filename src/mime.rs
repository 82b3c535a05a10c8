//! Extension to content-type mapping
//!
//! The table is read once at startup (before workers fork) from an
//! nginx-style `mime.types` file and is immutable afterwards. When no
//! file is configured, or an extension is missing from it, a small
//! built-in table covers the common cases.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;


pub const DEFAULT_TYPE: &'static str = "application/octet-stream";

const BUILTIN: &'static [(&'static str, &'static str)] = &[
    ("html", "text/html; charset=utf-8"),
    ("htm", "text/html; charset=utf-8"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("json", "application/json"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("txt", "text/plain"),
    ("xml", "application/xml"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
];

#[derive(Debug, Clone)]
pub struct MimeTypes {
    map: HashMap<String, String>,
}

impl MimeTypes {
    /// Just the built-in table
    pub fn builtin() -> MimeTypes {
        let map = BUILTIN.iter()
            .map(|&(ext, mime)| (ext.to_string(), mime.to_string()))
            .collect();
        MimeTypes { map: map }
    }

    /// Built-in table extended by an nginx-style `mime.types` file
    ///
    /// The accepted grammar is loose: `types {`, `}` and `#` comments
    /// are skipped, every other line is `type ext [ext…];`.
    pub fn load(path: &Path) -> io::Result<MimeTypes> {
        let mut text = String::new();
        File::open(path)?.read_to_string(&mut text)?;
        let mut types = MimeTypes::builtin();
        for line in text.lines() {
            let line = line.trim().trim_right_matches(';');
            if line.is_empty() || line.starts_with('#') ||
                line.starts_with("types") || line == "}"
            {
                continue;
            }
            let mut tokens = line.split_whitespace();
            let mime = match tokens.next() {
                Some(m) => m,
                None => continue,
            };
            for ext in tokens {
                types.map.insert(ext.to_ascii_lowercase(),
                                 mime.to_string());
            }
        }
        Ok(types)
    }

    pub fn by_extension(&self, ext: &str) -> &str {
        self.map.get(&ext.to_ascii_lowercase())
            .map(|s| &s[..])
            .unwrap_or(DEFAULT_TYPE)
    }

    /// Content type for a filesystem path, by its extension
    pub fn for_path(&self, path: &Path) -> &str {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.by_extension(e))
            .unwrap_or(DEFAULT_TYPE)
    }
}
