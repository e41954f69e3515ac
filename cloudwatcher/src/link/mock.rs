//! Scripted link for unit tests.
//!
//! Reads replay a queue of byte chunks, timeouts and hard errors; writes are
//! recorded. An exhausted script behaves like a silent line (every read
//! times out).
//!
//! Byte chunks at the front of the queue count as already received:
//! `clear_input` drops them, up to the next timeout, error or barrier.

use {
    crate::{
        error::Result,
        link::{Link, LinkConfig},
    },
    std::{
        collections::VecDeque,
        io::{self, ErrorKind, Read, Write},
    },
};

enum Event {
    Bytes(VecDeque<u8>),
    Timeout,
    Error(ErrorKind),
    Barrier,
}

pub(crate) struct ScriptedLink {
    script: VecDeque<Event>,
    pub written: Vec<u8>,
    pub config: LinkConfig,
    pub config_history: Vec<LinkConfig>,
    pub closes: usize,
    pub reopens: usize,
    pub fail_reopen: bool,
    pub cleared: usize,
    open: bool,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self::with_config(LinkConfig::normal())
    }

    pub fn with_config(config: LinkConfig) -> Self {
        Self {
            script: VecDeque::new(),
            written: Vec::new(),
            config,
            config_history: Vec::new(),
            closes: 0,
            reopens: 0,
            fail_reopen: false,
            cleared: 0,
            open: true,
        }
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.script
            .push_back(Event::Bytes(bytes.iter().copied().collect()));
    }

    pub fn push_timeout(&mut self) {
        self.script.push_back(Event::Timeout);
    }

    pub fn push_error(&mut self, kind: ErrorKind) {
        self.script.push_back(Event::Error(kind));
    }

    /// Bytes pushed after this arrive only once the input has been cleared.
    pub fn push_barrier(&mut self) {
        self.script.push_back(Event::Barrier);
    }

    /// Number of scripted events not consumed yet.
    pub fn pending(&self) -> usize {
        self.script.len()
    }
}

impl Read for ScriptedLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.open {
            return Err(io::Error::new(ErrorKind::NotConnected, "link closed"));
        }
        loop {
            match self.script.front_mut() {
                None => return Err(io::Error::new(ErrorKind::TimedOut, "no data")),
                Some(Event::Bytes(chunk)) if chunk.is_empty() => {
                    self.script.pop_front();
                },
                Some(Event::Barrier) => {
                    self.script.pop_front();
                },
                Some(Event::Bytes(chunk)) => {
                    let n = buf.len().min(chunk.len());
                    for (slot, byte) in buf.iter_mut().zip(chunk.drain(..n)) {
                        *slot = byte;
                    }
                    if chunk.is_empty() {
                        self.script.pop_front();
                    }
                    return Ok(n);
                },
                Some(Event::Timeout) => {
                    self.script.pop_front();
                    return Err(io::Error::new(ErrorKind::TimedOut, "scripted timeout"));
                },
                Some(Event::Error(kind)) => {
                    let kind = *kind;
                    self.script.pop_front();
                    return Err(io::Error::new(kind, "scripted error"));
                },
            }
        }
    }
}

impl Write for ScriptedLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.open {
            return Err(io::Error::new(ErrorKind::NotConnected, "link closed"));
        }
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Link for ScriptedLink {
    fn config(&self) -> &LinkConfig {
        &self.config
    }

    fn reconfigure(&mut self, config: &LinkConfig) -> Result<()> {
        self.config = config.clone();
        self.config_history.push(config.clone());
        Ok(())
    }

    fn clear_input(&mut self) -> Result<()> {
        self.cleared += 1;
        while let Some(Event::Bytes(_)) = self.script.front() {
            self.script.pop_front();
        }
        if let Some(Event::Barrier) = self.script.front() {
            self.script.pop_front();
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn close(&mut self) -> Result<()> {
        self.closes += 1;
        self.open = false;
        Ok(())
    }

    fn reopen(&mut self) -> Result<()> {
        self.reopens += 1;
        if self.fail_reopen {
            return Err(io::Error::new(ErrorKind::NotFound, "device unplugged").into());
        }
        self.open = true;
        Ok(())
    }
}
