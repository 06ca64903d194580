//! The output sink actions write rendered lines to.

use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::line::{Renderer, TraceLine};

/// Shared byte buffer returned by [`Output::buffer`].
pub type SharedBuffer = Arc<Mutex<Vec<u8>>>;

struct BufferWriter(SharedBuffer);

impl Write for BufferWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Append-only line sink.
///
/// Write failures are logged and dropped: a broken output stream must not
/// disturb the traced program. The underlying stream is owned by the caller
/// and never closed here.
pub struct Output {
    stream: Mutex<Box<dyn Write + Send>>,
    renderer: Box<dyn Renderer>,
}

impl Output {
    pub fn new(stream: Box<dyn Write + Send>, renderer: Box<dyn Renderer>) -> Self {
        Output {
            stream: Mutex::new(stream),
            renderer,
        }
    }

    /// Lines rendered by `renderer` to stderr.
    pub fn stderr(renderer: Box<dyn Renderer>) -> Self {
        Self::new(Box::new(std::io::stderr()), renderer)
    }

    /// An in-memory sink plus a handle to read back what was written.
    pub fn buffer(renderer: Box<dyn Renderer>) -> (Self, SharedBuffer) {
        let buf: SharedBuffer = Arc::new(Mutex::new(Vec::new()));
        let out = Self::new(Box::new(BufferWriter(Arc::clone(&buf))), renderer);
        (out, buf)
    }

    pub fn emit(&self, line: &TraceLine) {
        let mut text = self.renderer.render(line);
        text.push('\n');
        let mut stream = self.stream.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = stream.write_all(text.as_bytes()) {
            log::debug!("calltrace: dropped trace line: {e}");
        }
    }

    pub fn flush(&self) {
        let mut stream = self.stream.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = stream.flush() {
            log::debug!("calltrace: flush failed: {e}");
        }
    }
}

/// Read a shared buffer back as text.
pub fn buffer_text(buf: &SharedBuffer) -> String {
    String::from_utf8_lossy(&buf.lock().unwrap_or_else(|e| e.into_inner())).into_owned()
}
