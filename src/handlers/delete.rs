use std::path::Path;

use fs::Fs;
use handlers::HandlerResult;
use server::response::HttpResponse;
use status;


/// Unlinks a file
///
/// Directories are never deleted (403); a missing target is 404 and a
/// successful unlink answers 204 with no body.
pub fn handle(fs: &dyn Fs, path: &Path) -> HandlerResult {
    if !fs.exists(path) {
        return Err(status::NOT_FOUND);
    }
    if fs.is_dir(path) {
        debug!("delete: refusing to remove directory {:?}", path);
        return Err(status::FORBIDDEN);
    }
    match fs.remove_file(path) {
        Ok(()) => {
            info!("delete: removed {:?}", path);
            Ok(HttpResponse::no_content())
        }
        Err(err) => {
            error!("delete: failed to remove {:?}: {}", path, err);
            Err(status::INTERNAL_SERVER_ERROR)
        }
    }
}
