//! The per-worker readiness loop
//!
//! One level-triggered `mio::Poll` multiplexes every listener and
//! connection of a worker. Listeners accept until `WouldBlock`;
//! connections run their state machine on readiness and are
//! re-registered with write interest only while output is pending. A
//! one-second sweep enforces the request and keep-alive deadlines.

use std::collections::HashMap;
use std::io::{self, ErrorKind};
use std::rc::Rc;
use std::time::{Duration, Instant};

use mio::{Events, Poll, PollOpt, Ready, Token};
use mio::net::{TcpListener, TcpStream};

use config::{HttpConfig, ListenDirective};
use fs::Fs;
use mime::MimeTypes;
use server::connection::ConnectionHandler;


const SWEEP_INTERVAL: Duration = Duration::from_secs(1);
const EVENT_CAPACITY: usize = 1024;

pub struct EventLoop {
    poll: Poll,
    listeners: Vec<TcpListener>,
    connections: HashMap<usize, ConnectionHandler<TcpStream>>,
    next_token: usize,
    config: Rc<HttpConfig>,
    mime: Rc<MimeTypes>,
    fs: Rc<dyn Fs>,
}

impl EventLoop {
    pub fn new(listeners: Vec<TcpListener>, config: Rc<HttpConfig>,
               mime: Rc<MimeTypes>, fs: Rc<dyn Fs>)
        -> io::Result<EventLoop>
    {
        let poll = Poll::new()?;
        for (index, listener) in listeners.iter().enumerate() {
            poll.register(listener, Token(index), Ready::readable(),
                          PollOpt::level())?;
        }
        let next_token = listeners.len();
        Ok(EventLoop {
            poll: poll,
            listeners: listeners,
            connections: HashMap::new(),
            next_token: next_token,
            config: config,
            mime: mime,
            fs: fs,
        })
    }

    /// Serves until the process dies
    pub fn run(&mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(EVENT_CAPACITY);
        let mut last_sweep = Instant::now();
        loop {
            self.turn(&mut events)?;
            if last_sweep.elapsed() >= SWEEP_INTERVAL {
                self.sweep(Instant::now());
                last_sweep = Instant::now();
            }
        }
    }

    /// One poll round; separated from `run` so tests can pump the loop
    pub fn turn(&mut self, events: &mut Events) -> io::Result<()> {
        self.poll.poll(events, Some(SWEEP_INTERVAL))?;
        let mut ready: Vec<usize> = Vec::new();
        for event in events.iter() {
            ready.push(event.token().0);
        }
        for token in ready {
            if token < self.listeners.len() {
                self.accept_ready(token);
            } else {
                self.drive(token);
            }
        }
        Ok(())
    }

    fn accept_ready(&mut self, index: usize) {
        loop {
            let accepted = self.listeners[index].accept();
            match accepted {
                Ok((sock, peer)) => {
                    if self.connections.len() >=
                        self.config.get_worker_connections() as usize
                    {
                        warn!("connection limit reached, refusing {}", peer);
                        continue;
                    }
                    if let Err(err) = self.add_connection(sock, peer) {
                        warn!("failed to register {}: {}", peer, err);
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    error!("accept failed: {}", e);
                    return;
                }
            }
        }
    }

    fn add_connection(&mut self, sock: TcpStream,
                      peer: ::std::net::SocketAddr)
        -> io::Result<()>
    {
        let local = ListenDirective::from_local_addr(&sock.local_addr()?);
        let token = self.next_token;
        self.next_token += 1;
        self.poll.register(&sock, Token(token), Ready::readable(),
                           PollOpt::level())?;
        let handler = ConnectionHandler::new(
            sock, peer, local,
            self.config.clone(), self.mime.clone(), self.fs.clone());
        self.connections.insert(token, handler);
        Ok(())
    }

    fn drive(&mut self, token: usize) {
        let close = {
            let handler = match self.connections.get_mut(&token) {
                Some(handler) => handler,
                None => return,
            };
            handler.process_event();
            handler.should_close()
        };
        if close {
            self.remove(token);
        } else {
            self.update_interest(token);
        }
    }

    fn update_interest(&mut self, token: usize) {
        if let Some(handler) = self.connections.get(&token) {
            let mut interest = Ready::readable();
            if handler.wants_write() {
                interest = interest | Ready::writable();
            }
            if let Err(err) = self.poll.reregister(handler.socket(),
                                                   Token(token), interest,
                                                   PollOpt::level())
            {
                warn!("reregister failed for {}: {}", handler.peer(), err);
            }
        }
    }

    fn remove(&mut self, token: usize) {
        if let Some(handler) = self.connections.remove(&token) {
            let _ = self.poll.deregister(handler.socket());
            debug!("dropped connection from {}", handler.peer());
        }
    }

    /// Expires idle connections; half-read requests get a 408 first
    pub fn sweep(&mut self, now: Instant) {
        let expired: Vec<usize> = self.connections.iter()
            .filter(|&(_, handler)| handler.is_timed_out(now))
            .map(|(&token, _)| token)
            .collect();
        for token in expired {
            if let Some(handler) = self.connections.get_mut(&token) {
                handler.on_timeout();
            }
            self.remove(token);
        }
    }
}
