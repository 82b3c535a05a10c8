use std::fmt::Write;
use std::path::Path;

use url::percent_encoding::{utf8_percent_encode, PATH_SEGMENT_ENCODE_SET};

use fs::Fs;
use handlers::HandlerResult;
use server::response::{self, HttpResponse};
use status;


/// Generates the autoindex page for a directory
///
/// Entries are sorted by name; directories get a `/` suffix and no
/// size. The parent link is omitted at the document root.
pub fn generate(fs: &dyn Fs, dir: &Path, request_path: &str) -> HandlerResult {
    let mut entries = match fs.read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            error!("autoindex: failed to read {:?}: {}", dir, err);
            return Err(status::INTERNAL_SERVER_ERROR);
        }
    };
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    let shown_path = if request_path.ends_with('/') {
        request_path.to_string()
    } else {
        format!("{}/", request_path)
    };
    let mut html = String::with_capacity(1024);
    write!(html,
           "<!DOCTYPE html>\n<html>\n<head><title>Index of {path}</title>\
            </head>\n<body>\n<h1>Index of {path}</h1>\n<hr>\n<pre>\n",
           path = escape(&shown_path)).unwrap();
    if shown_path != "/" {
        html.push_str("<a href=\"../\">../</a>\n");
    }
    for entry in &entries {
        let name = if entry.is_dir {
            format!("{}/", entry.name)
        } else {
            entry.name.clone()
        };
        // the link target needs URL escaping, the link text HTML escaping
        let mut href = utf8_percent_encode(&entry.name,
                                           PATH_SEGMENT_ENCODE_SET)
            .to_string();
        if entry.is_dir {
            href.push('/');
        }
        let modified = entry.modified
            .map(response::imf_fixdate)
            .unwrap_or_else(|| "-".to_string());
        let size = if entry.is_dir {
            "-".to_string()
        } else {
            entry.len.to_string()
        };
        write!(html, "<a href=\"{href}\">{name}</a>  {modified}  {size}\n",
               href = escape(&href), name = escape(&name),
               modified = modified, size = size).unwrap();
    }
    html.push_str("</pre>\n<hr>\n</body>\n</html>\n");

    Ok(HttpResponse::ok("text/html; charset=utf-8", html.into_bytes()))
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod test {
    extern crate tempfile;

    use std::fs as std_fs;
    use std::str::from_utf8;

    use fs::DiskFs;
    use super::generate;

    #[test]
    fn lists_sorted_entries() {
        let dir = tempfile::tempdir().unwrap();
        std_fs::write(dir.path().join("zz.txt"), "12345").unwrap();
        std_fs::write(dir.path().join("aa.txt"), "1").unwrap();
        std_fs::create_dir(dir.path().join("sub")).unwrap();

        let response = generate(&DiskFs, dir.path(), "/files").unwrap();
        let html = from_utf8(response.body()).unwrap();
        assert!(html.contains("Index of /files/"));
        let aa = html.find("aa.txt").unwrap();
        let sub = html.find("sub/").unwrap();
        let zz = html.find("zz.txt").unwrap();
        assert!(aa < sub && sub < zz);
        assert!(html.contains("<a href=\"../\">../</a>"));
        assert!(html.contains("  5\n"));
    }

    #[test]
    fn url_significant_names_are_percent_encoded() {
        let dir = tempfile::tempdir().unwrap();
        std_fs::write(dir.path().join("a#b c%.txt"), "x").unwrap();
        std_fs::create_dir(dir.path().join("odd?dir")).unwrap();

        let response = generate(&DiskFs, dir.path(), "/files").unwrap();
        let html = from_utf8(response.body()).unwrap();
        assert!(html.contains("href=\"a%23b%20c%25.txt\""));
        assert!(html.contains(">a#b c%.txt</a>"));
        assert!(html.contains("href=\"odd%3Fdir/\""));
        assert!(html.contains(">odd?dir/</a>"));
    }

    #[test]
    fn root_has_no_parent_link() {
        let dir = tempfile::tempdir().unwrap();
        let response = generate(&DiskFs, dir.path(), "/").unwrap();
        let html = from_utf8(response.body()).unwrap();
        assert!(!html.contains("../"));
    }
}
