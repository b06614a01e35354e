//! Dump destination
//!
//! A process-wide, swappable writer (stdout until replaced) and the
//! [`Sink::print`] helper every dump goes through.
//!
//! The destination lock is taken once per line, not once per dump, so dumps
//! from concurrent requests sharing a destination may interleave line by line.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};

use tracing::warn;

/// Shared handle to a dump destination
pub type SharedWriter = Arc<Mutex<dyn Write + Send>>;

static OUTPUT: OnceLock<RwLock<SharedWriter>> = OnceLock::new();

fn slot() -> &'static RwLock<SharedWriter> {
    OUTPUT.get_or_init(|| {
        let stdout: SharedWriter = Arc::new(Mutex::new(io::stdout()));
        RwLock::new(stdout)
    })
}

/// Get the current process-wide destination
pub fn output() -> SharedWriter {
    let guard = slot().read().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(&guard)
}

/// Replace the process-wide destination, returning the previous one
///
/// The previous writer is not flushed or closed.
pub fn set_output<W>(writer: W) -> SharedWriter
where
    W: Write + Send + 'static,
{
    replace_output(Arc::new(Mutex::new(writer)))
}

/// Replace the process-wide destination with an existing shared handle
pub fn replace_output(writer: SharedWriter) -> SharedWriter {
    let mut guard = slot().write().unwrap_or_else(PoisonError::into_inner);
    std::mem::replace(&mut *guard, writer)
}

/// Where an interceptor writes its dumps
#[derive(Clone, Default)]
pub enum Sink {
    /// The process-wide destination, resolved at each print
    #[default]
    Global,
    /// A destination owned by this sink
    Writer(SharedWriter),
}

impl Sink {
    /// Create a sink writing to `writer` instead of the process-wide destination
    pub fn writer<W>(writer: W) -> Self
    where
        W: Write + Send + 'static,
    {
        Self::Writer(Arc::new(Mutex::new(writer)))
    }

    fn destination(&self) -> SharedWriter {
        match self {
            Self::Global => output(),
            Self::Writer(writer) => Arc::clone(writer),
        }
    }

    /// Print a dump
    ///
    /// If `error` is set, its text is written as one line first. The payload
    /// is always written next, followed by a newline, even when empty.
    /// Write failures on the destination are logged and otherwise ignored.
    pub fn print(&self, bytes: &[u8], error: Option<&dyn fmt::Display>) {
        let destination = self.destination();

        if let Some(error) = error {
            let line = format!("{error}\n");
            if let Err(e) = write_line(&destination, line.as_bytes(), b"") {
                warn!("Failed to write dump error line: {e}");
            }
        }

        if let Err(e) = write_line(&destination, bytes, b"\n") {
            warn!("Failed to write dump: {e}");
        }
    }

    /// Print a rendered dump, reporting a rendering failure inline
    pub fn print_rendered(&self, rendered: &crate::Result<Vec<u8>>) {
        match rendered {
            Ok(bytes) => self.print(bytes, None),
            Err(e) => self.print(&[], Some(e as &dyn fmt::Display)),
        }
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("Sink::Global"),
            Self::Writer(_) => f.write_str("Sink::Writer(..)"),
        }
    }
}

impl From<SharedWriter> for Sink {
    fn from(writer: SharedWriter) -> Self {
        Self::Writer(writer)
    }
}

impl From<Capture> for Sink {
    fn from(capture: Capture) -> Self {
        Self::writer(capture)
    }
}

fn write_line(destination: &SharedWriter, bytes: &[u8], terminator: &[u8]) -> io::Result<()> {
    let mut writer = destination.lock().unwrap_or_else(PoisonError::into_inner);
    writer.write_all(bytes)?;
    writer.write_all(terminator)?;
    writer.flush()
}

/// In-memory destination for capturing dumps
///
/// Clones share the same buffer, so one clone can be installed as a
/// destination while another reads what was written.
#[derive(Debug, Clone, Default)]
pub struct Capture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Capture {
    /// Create an empty capture buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far
    pub fn bytes(&self) -> Vec<u8> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Everything written so far, lossily decoded as UTF-8
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes()).into_owned()
    }

    /// Discard everything written so far
    pub fn clear(&self) {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
