use std::path::Path;

use fs::Fs;
use handlers::HandlerResult;
use mime::MimeTypes;
use server::response::{self, HttpResponse};
use status;


/// Serves a regular file from disk
///
/// The file must exist, be a regular file and be readable; directories
/// are the caller's business and surface as 403 here. `Content-Type`
/// comes from the extension, `Last-Modified` from the inode mtime.
pub fn serve(fs: &dyn Fs, mime: &MimeTypes, path: &Path) -> HandlerResult {
    let info = match fs.file_info(path) {
        Ok(info) => info,
        Err(_) => {
            debug!("static: stat failed for {:?}", path);
            return Err(status::NOT_FOUND);
        }
    };
    if info.is_dir {
        debug!("static: {:?} is a directory", path);
        return Err(status::FORBIDDEN);
    }
    if !fs.is_readable(path) {
        debug!("static: {:?} is not readable", path);
        return Err(status::FORBIDDEN);
    }
    let content = match fs.read(path) {
        Ok(content) => content,
        Err(err) => {
            error!("static: failed to read {:?}: {}", path, err);
            return Err(status::INTERNAL_SERVER_ERROR);
        }
    };
    let mut response = HttpResponse::ok(mime.for_path(path), content);
    if let Some(modified) = info.modified {
        response.set_header("Last-Modified", &response::imf_fixdate(modified));
    }
    Ok(response)
}

#[cfg(test)]
mod test {
    extern crate tempfile;

    use std::fs as std_fs;

    use fs::DiskFs;
    use mime::MimeTypes;
    use super::serve;

    #[test]
    fn serves_file_with_type_and_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("page.html");
        std_fs::write(&file, "hello").unwrap();

        let response = serve(&DiskFs, &MimeTypes::builtin(), &file).unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(response.header("Content-Type"),
                   Some("text/html; charset=utf-8"));
        assert_eq!(response.body(), b"hello");
        assert!(response.header("Last-Modified").unwrap().ends_with("GMT"));
    }

    #[test]
    fn missing_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = serve(&DiskFs, &MimeTypes::builtin(),
                        &dir.path().join("none.txt")).unwrap_err();
        assert_eq!(err.as_u16(), 404);
        let err = serve(&DiskFs, &MimeTypes::builtin(), dir.path())
            .unwrap_err();
        assert_eq!(err.as_u16(), 403);
    }
}
