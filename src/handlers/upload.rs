use std::fmt::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use config::UploadConfig;
use fs::Fs;
use handlers::HandlerResult;
use server::request::HttpRequest;
use server::response::HttpResponse;
use status;
use status::StatusCode;


/// One part of a multipart body, as far as uploads care
struct FilePart {
    filename: String,
    content_type: Option<String>,
    content: Vec<u8>,
}

/// Stores the first file part of a `multipart/form-data` POST
pub fn handle(fs: &dyn Fs, config: &UploadConfig, request: &HttpRequest)
    -> HandlerResult
{
    let content_type = match request.header("content-type") {
        Some(value) => value,
        None => {
            debug!("upload: missing content-type");
            return Err(status::BAD_REQUEST);
        }
    };
    if !content_type.starts_with("multipart/form-data") {
        debug!("upload: content-type is not multipart/form-data");
        return Err(status::BAD_REQUEST);
    }
    let boundary = match extract_boundary(content_type) {
        Some(boundary) => boundary,
        None => {
            debug!("upload: missing boundary parameter");
            return Err(status::BAD_REQUEST);
        }
    };

    if !config.validate_total_size(request.body().len() as u64) {
        return Err(status::PAYLOAD_TOO_LARGE);
    }

    let part = parse_multipart(request.body(), &boundary)
        .ok_or(status::BAD_REQUEST)?;

    if !config.validate_file_size(part.content.len() as u64) {
        return Err(status::PAYLOAD_TOO_LARGE);
    }
    if let Some(ref mime) = part.content_type {
        if !config.validate_type(mime) {
            debug!("upload: type {:?} not allowed", mime);
            return Err(StatusCode::new(415).unwrap());
        }
    }

    let filename = sanitize_filename(&part.filename);
    if !config.validate_filename(&filename) {
        debug!("upload: filename {:?} rejected by pattern", filename);
        return Err(status::BAD_REQUEST);
    }

    let dir = config.directory().to_path_buf();
    if !fs.is_dir(&dir) {
        if let Err(err) = fs.create_dir_all(&dir) {
            error!("upload: cannot create {:?}: {}", dir, err);
            return Err(status::INTERNAL_SERVER_ERROR);
        }
    }
    let destination = dir.join(&filename);
    if let Err(err) = fs.write(&destination, &part.content) {
        error!("upload: cannot write {:?}: {}", destination, err);
        return Err(status::INTERNAL_SERVER_ERROR);
    }
    info!("upload: stored {:?} ({} bytes)", destination, part.content.len());

    let mut body = String::new();
    write!(body,
           "<!DOCTYPE html>\n\
            <html><head><title>Upload Success</title></head>\n\
            <body>\n<h1>File Uploaded Successfully</h1>\n\
            <p>Filename: {}</p>\n<p>Size: {} bytes</p>\n\
            <p><a href=\"/\">Back to Home</a></p>\n</body></html>\n",
           filename, part.content.len()).unwrap();
    Ok(HttpResponse::with_body(status::CREATED, "text/html",
                               body.into_bytes()))
}

/// Pulls the `boundary` parameter out of a Content-Type value,
/// unquoting it if needed
pub fn extract_boundary(content_type: &str) -> Option<String> {
    let after = match content_type.find("boundary=") {
        Some(pos) => &content_type[pos + "boundary=".len()..],
        None => return None,
    };
    let boundary = if after.starts_with('"') {
        match after[1..].find('"') {
            Some(end) => &after[1..1+end],
            None => return None,
        }
    } else {
        after.split(';').next().unwrap_or("")
    };
    let boundary = boundary.trim();
    if boundary.is_empty() {
        None
    } else {
        Some(boundary.to_string())
    }
}

/// Extracts the first part delimited by `--boundary`
///
/// Returns the filename from its `Content-Disposition`, its declared
/// type and the payload with the delimiter's leading CRLF stripped.
fn parse_multipart(body: &[u8], boundary: &str) -> Option<FilePart> {
    let delimiter = format!("--{}", boundary);
    let delimiter = delimiter.as_bytes();

    let start = find(body, delimiter)? + delimiter.len();
    let mut part_start = start;
    if body.get(part_start) == Some(&b'\r') {
        part_start += 1;
    }
    if body.get(part_start) == Some(&b'\n') {
        part_start += 1;
    }
    let next = find(&body[part_start..], delimiter)? + part_start;
    let part = &body[part_start..next];

    let (headers_len, separator_len) = match find(part, b"\r\n\r\n") {
        Some(pos) => (pos, 4),
        None => match find(part, b"\n\n") {
            Some(pos) => (pos, 2),
            None => return None,
        },
    };
    let headers = String::from_utf8_lossy(&part[..headers_len]).into_owned();
    let mut content = &part[headers_len + separator_len..];
    // the final CRLF belongs to the delimiter, not the payload
    while content.last() == Some(&b'\n') || content.last() == Some(&b'\r') {
        content = &content[..content.len()-1];
    }

    Some(FilePart {
        filename: extract_filename(&headers).unwrap_or_default(),
        content_type: extract_part_type(&headers),
        content: content.to_vec(),
    })
}

fn extract_filename(headers: &str) -> Option<String> {
    for line in headers.lines() {
        if !line.to_ascii_lowercase().starts_with("content-disposition:") {
            continue;
        }
        if let Some(pos) = line.find("filename=\"") {
            let after = &line[pos + "filename=\"".len()..];
            if let Some(end) = after.find('"') {
                return Some(after[..end].to_string());
            }
        }
    }
    None
}

fn extract_part_type(headers: &str) -> Option<String> {
    for line in headers.lines() {
        let lower = line.to_ascii_lowercase();
        if lower.starts_with("content-type:") {
            return Some(line["content-type:".len()..].trim().to_string());
        }
    }
    None
}

/// Keeps `[A-Za-z0-9._-]`, turns spaces into `_`, strips any directory
/// components; an empty result falls back to `upload_<epoch>`
pub fn sanitize_filename(filename: &str) -> String {
    let basename = filename.rsplit(|c| c == '/' || c == '\\').next()
        .unwrap_or(filename);
    let mut sanitized = String::with_capacity(basename.len());
    for c in basename.chars() {
        match c {
            'a'...'z' | 'A'...'Z' | '0'...'9' | '.' | '-' | '_' => {
                sanitized.push(c)
            }
            ' ' => sanitized.push('_'),
            _ => {}
        }
    }
    if sanitized.is_empty() {
        let epoch = SystemTime::now().duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs()).unwrap_or(0);
        sanitized = format!("upload_{}", epoch);
    }
    sanitized
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}
