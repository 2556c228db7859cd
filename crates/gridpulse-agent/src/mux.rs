//! Readiness multiplexing: a registry of descriptors and callbacks over
//! one poll instance.
//!
//! Single-threaded by construction; the agent's default pipeline does not
//! run a multiplex loop, but auxiliary tooling drives `process` /
//! `process_loop` directly.

use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, trace};

type ReadyCallback = Box<dyn FnMut(RawFd)>;

struct Entry {
    name: String,
    callback: ReadyCallback,
}

/// Maps registered descriptors to read-readiness callbacks.
pub struct Multiplexer {
    poll: Poll,
    events: Events,
    entries: HashMap<RawFd, Entry>,
}

impl Multiplexer {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(64),
            entries: HashMap::new(),
        })
    }

    /// Register `fd` for read readiness. At most one entry may exist per
    /// descriptor.
    pub fn register<F>(&mut self, fd: RawFd, name: &str, callback: F) -> io::Result<()>
    where
        F: FnMut(RawFd) + 'static,
    {
        if self.entries.contains_key(&fd) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("descriptor {fd} already registered"),
            ));
        }

        self.poll
            .registry()
            .register(&mut SourceFd(&fd), Token(fd as usize), Interest::READABLE)?;

        debug!("watching '{name}' on descriptor {fd}");
        self.entries.insert(
            fd,
            Entry {
                name: name.to_string(),
                callback: Box::new(callback),
            },
        );
        Ok(())
    }

    pub fn deregister(&mut self, fd: RawFd) -> io::Result<()> {
        if self.entries.remove(&fd).is_some() {
            self.poll.registry().deregister(&mut SourceFd(&fd))?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Block until at least one registered descriptor is readable and
    /// invoke the callbacks of all that are.
    pub fn process(&mut self) -> io::Result<()> {
        self.poll.poll(&mut self.events, None)?;

        let ready: Vec<RawFd> = self
            .events
            .iter()
            .map(|event| event.token().0 as RawFd)
            .collect();

        for fd in ready {
            if let Some(entry) = self.entries.get_mut(&fd) {
                trace!("'{}' ready on descriptor {fd}", entry.name);
                (entry.callback)(fd);
            }
        }
        Ok(())
    }

    /// Run `process` until it fails, returning the error that stopped it.
    pub fn process_loop(&mut self) -> io::Error {
        loop {
            if let Err(e) = self.process() {
                return e;
            }
        }
    }
}
