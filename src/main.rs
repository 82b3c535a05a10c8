//! Demo server binary
//!
//! The configuration-file parser is a separate concern; this binary
//! assembles an `HttpConfig` from a handful of options, which keeps
//! the in-memory model the contract while still giving something to
//! point a browser at.

extern crate argparse;
extern crate env_logger;
#[macro_use] extern crate log;
extern crate tk_httpd;

use std::process::exit;

use argparse::{ArgumentParser, Store, StoreTrue};

use tk_httpd::Method;
use tk_httpd::config::{HttpConfig, ListenDirective, LocationConfig,
                       MatchType, ServerConfig, UploadConfig};
use tk_httpd::path::Path;
use tk_httpd::server;


fn main() {
    env_logger::init().expect("logger init");

    let mut listen = "8080".to_string();
    let mut root = ".".to_string();
    let mut workers = 1u32;
    let mut autoindex = false;
    let mut upload_dir = "".to_string();
    {
        let mut ap = ArgumentParser::new();
        ap.set_description("An nginx-style static/CGI web server.");
        ap.refer(&mut listen)
            .add_option(&["-l", "--listen"], Store,
                        "Listen directive (default 8080)");
        ap.refer(&mut root)
            .add_option(&["-r", "--root"], Store,
                        "Document root (default current directory)");
        ap.refer(&mut workers)
            .add_option(&["-w", "--workers"], Store,
                        "Number of worker processes");
        ap.refer(&mut autoindex)
            .add_option(&["--autoindex"], StoreTrue,
                        "Enable directory listings");
        ap.refer(&mut upload_dir)
            .add_option(&["--upload-dir"], Store,
                        "Enable POST uploads at /upload into this directory");
        ap.parse_args_or_exit();
    }

    let config = match build_config(&listen, &root, workers, autoindex,
                                    &upload_dir) {
        Ok(config) => config,
        Err(message) => {
            error!("invalid configuration: {}", message);
            exit(1);
        }
    };
    if let Err(err) = config.validate() {
        error!("invalid configuration: {}", err);
        exit(1);
    }
    if let Err(err) = server::serve(config) {
        error!("fatal: {}", err);
        exit(1);
    }
}

fn build_config(listen: &str, root: &str, workers: u32, autoindex: bool,
                upload_dir: &str)
    -> Result<HttpConfig, String>
{
    let listen = ListenDirective::parse(listen)
        .map_err(|e| e.to_string())?;
    let root = Path::parse(root).map_err(|e| e.to_string())?;

    let mut site = LocationConfig::new("/", MatchType::Prefix)
        .map_err(|e| e.to_string())?
        .index("index.html")
        .autoindex(autoindex);
    site = site.methods(&[Method::Get, Method::Head]);

    let mut server = ServerConfig::new()
        .listen(listen)
        .root(root)
        .index("index.html")
        .location(site);

    if !upload_dir.is_empty() {
        let dir = Path::parse(upload_dir).map_err(|e| e.to_string())?;
        let uploads = LocationConfig::new("/upload", MatchType::Prefix)
            .map_err(|e| e.to_string())?
            .methods(&[Method::Get, Method::Head, Method::Post,
                       Method::Delete])
            .upload(UploadConfig::new(dir));
        server = server.location(uploads);
    }

    Ok(HttpConfig::new()
        .worker_processes(workers)
        .server(server))
}
