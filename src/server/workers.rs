//! The pre-fork worker model
//!
//! Listening sockets are bound (with `SO_REUSEADDR`, by mio) before
//! forking, so every worker accepts from the same queues; nothing is
//! shared between workers afterwards. The configuration and MIME table
//! are loaded before the fork and only ever read. The master does
//! nothing but wait for its children.

use std::collections::HashSet;
use std::io;
use std::rc::Rc;

use libc;
use mio::net::TcpListener;

use config::HttpConfig;
use fs::DiskFs;
use mime::MimeTypes;
use server::event_loop::EventLoop;


/// Binds every configured endpoint, wildcard listens first
///
/// When a wildcard listen covers a port, specific addresses on the
/// same port are not bound separately; the wildcard socket accepts
/// for all of them and virtual-host matching sorts it out.
pub fn bind_listeners(config: &HttpConfig) -> io::Result<Vec<TcpListener>> {
    let addrs = config.bind_addresses();
    let wildcard_ports: HashSet<u16> = addrs.iter()
        .filter(|addr| addr.ip().is_unspecified())
        .map(|addr| addr.port())
        .collect();
    let mut listeners = Vec::new();
    for addr in &addrs {
        if !addr.ip().is_unspecified() &&
            wildcard_ports.contains(&addr.port())
        {
            debug!("skipping {} (covered by a wildcard listen)", addr);
            continue;
        }
        let listener = TcpListener::bind(addr)?;
        info!("listening on {}", addr);
        listeners.push(listener);
    }
    Ok(listeners)
}

/// Validates, binds, forks the configured workers and serves forever
pub fn serve(config: HttpConfig) -> io::Result<()> {
    let mime = match config.get_mime_types_path() {
        Some(path) => MimeTypes::load(path)?,
        None => MimeTypes::builtin(),
    };
    let listeners = bind_listeners(&config)?;
    if listeners.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput,
                                  "no listen address could be bound"));
    }

    let workers = config.get_worker_processes();
    if workers <= 1 {
        return run_worker(listeners, config, mime);
    }

    let mut listeners = listeners;
    let mut children = Vec::new();
    for index in 0..workers {
        match unsafe { libc::fork() } {
            -1 => {
                let err = io::Error::last_os_error();
                error!("fork failed: {}", err);
                break;
            }
            0 => {
                debug!("worker {} started", index);
                // this process owns the inherited sockets now
                let inherited = ::std::mem::replace(&mut listeners,
                                                    Vec::new());
                let code = match run_worker(inherited, config.clone(),
                                            mime.clone()) {
                    Ok(()) => 0,
                    Err(err) => {
                        error!("worker {} failed: {}", index, err);
                        1
                    }
                };
                ::std::process::exit(code);
            }
            pid => children.push(pid),
        }
    }

    for pid in children {
        unsafe {
            let mut status = 0;
            libc::waitpid(pid, &mut status, 0);
        }
    }
    Ok(())
}

fn run_worker(listeners: Vec<TcpListener>, config: HttpConfig,
              mime: MimeTypes)
    -> io::Result<()>
{
    let mut event_loop = EventLoop::new(
        listeners, Rc::new(config), Rc::new(mime), Rc::new(DiskFs))?;
    event_loop.run()
}
