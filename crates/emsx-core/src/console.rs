//! Console sink
//!
//! Event delivery and the control task both print to the same stream. Each
//! print goes through a [`ConsoleOut`] buffer that is flushed to the shared
//! writer in one piece when it is dropped, under the console lock, so text
//! from two writers never interleaves inside one buffer. Ordering between
//! buffers is whoever takes the lock first.
//!
//! ```rust
//! use std::fmt::Write;
//! use emsx_core::console::Console;
//!
//! let (console, capture) = Console::capture();
//! {
//!     let mut out = console.out();
//!     let _ = writeln!(out, "Success: {}, {}", 3734835, 101);
//! }
//! assert_eq!(capture.lines(), vec!["Success: 3734835, 101"]);
//! ```

use std::fmt;
use std::io::{self, Write as _};
use std::sync::Arc;

use parking_lot::Mutex;

type SharedWriter = Arc<Mutex<Box<dyn io::Write + Send>>>;

/// Handle on the shared output stream. Cloning shares the stream and its lock.
#[derive(Clone)]
pub struct Console {
    writer: SharedWriter,
}

impl fmt::Debug for Console {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Console").field("writer", &"<writer>").finish()
    }
}

impl Console {
    /// Console over the process stdout
    pub fn stdout() -> Self {
        Self::with_writer(io::stdout())
    }

    pub fn with_writer(writer: impl io::Write + Send + 'static) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// In-memory console for inspecting output
    pub fn capture() -> (Self, Capture) {
        let capture = Capture::default();
        (Self::with_writer(capture.clone()), capture)
    }

    /// Start a buffered print. The text is emitted when the returned value drops.
    pub fn out(&self) -> ConsoleOut<'_> {
        ConsoleOut {
            console: self,
            buffer: String::new(),
        }
    }

    /// Print one line
    pub fn line(&self, text: impl fmt::Display) {
        let mut out = self.out();
        let _ = fmt::Write::write_fmt(&mut out, format_args!("{}\n", text));
    }

    fn flush_buffer(&self, buffer: &str) {
        let mut writer = self.writer.lock();
        let _ = writer.write_all(buffer.as_bytes());
        let _ = writer.flush();
    }
}

/// Per-call output buffer, flushed atomically on drop
pub struct ConsoleOut<'a> {
    console: &'a Console,
    buffer: String,
}

impl ConsoleOut<'_> {
    /// Text accumulated so far
    pub fn pending(&self) -> &str {
        &self.buffer
    }
}

impl fmt::Write for ConsoleOut<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.buffer.push_str(s);
        Ok(())
    }
}

impl Drop for ConsoleOut<'_> {
    fn drop(&mut self) {
        if !self.buffer.is_empty() {
            self.console.flush_buffer(&self.buffer);
        }
    }
}

/// In-memory writer returned by [`Console::capture`]
#[derive(Clone, Default)]
pub struct Capture {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl Capture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes.lock()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }

    /// Number of lines starting with `prefix`
    pub fn count_prefixed(&self, prefix: &str) -> usize {
        self.lines().iter().filter(|line| line.starts_with(prefix)).count()
    }
}

impl io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
