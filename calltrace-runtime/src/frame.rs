//! Execution frames and their caller chains.
//!
//! Frames belong to the host runtime. The core only ever reads them while they
//! are live and keys timing data by [`FrameId`], an opaque identity that is
//! compared and hashed but never turned back into a frame.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

/// Opaque identity of a frame. Only meaningful between the frame's `call`
/// event and its first `return`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// The caller link points at a frame the host has already reclaimed.
    Reclaimed,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Reclaimed => f.write_str("caller frame was reclaimed"),
        }
    }
}

impl std::error::Error for FrameError {}

/// Read-only view of a live execution frame.
pub trait Frame: Send + Sync {
    fn id(&self) -> FrameId;
    fn filename(&self) -> &str;
    fn lineno(&self) -> u32;
    fn code_name(&self) -> &str;
    /// The frame that invoked this one. `Ok(None)` at the bottom of the stack.
    fn caller(&self) -> Result<Option<Arc<dyn Frame>>, FrameError>;
}

/// A frame description captured from an event source.
///
/// The caller link is weak: whoever owns the live frames decides when a frame
/// is reclaimed, and a reclaimed caller shows up as [`FrameError::Reclaimed`].
pub struct FrameSnapshot {
    id: FrameId,
    filename: String,
    code_name: String,
    lineno: AtomicU32,
    back: Option<Weak<FrameSnapshot>>,
}

impl FrameSnapshot {
    pub fn new(
        id: FrameId,
        filename: impl Into<String>,
        lineno: u32,
        code_name: impl Into<String>,
        back: Option<&Arc<FrameSnapshot>>,
    ) -> Arc<Self> {
        Arc::new(FrameSnapshot {
            id,
            filename: filename.into(),
            code_name: code_name.into(),
            lineno: AtomicU32::new(lineno),
            back: back.map(Arc::downgrade),
        })
    }

    /// Like [`FrameSnapshot::new`] but with an explicit (possibly dead) caller link.
    pub fn with_back(
        id: FrameId,
        filename: impl Into<String>,
        lineno: u32,
        code_name: impl Into<String>,
        back: Option<Weak<FrameSnapshot>>,
    ) -> Arc<Self> {
        Arc::new(FrameSnapshot {
            id,
            filename: filename.into(),
            code_name: code_name.into(),
            lineno: AtomicU32::new(lineno),
            back,
        })
    }

    pub fn set_lineno(&self, lineno: u32) {
        self.lineno.store(lineno, Ordering::Relaxed);
    }
}

impl Frame for FrameSnapshot {
    fn id(&self) -> FrameId {
        self.id
    }

    fn filename(&self) -> &str {
        &self.filename
    }

    fn lineno(&self) -> u32 {
        self.lineno.load(Ordering::Relaxed)
    }

    fn code_name(&self) -> &str {
        &self.code_name
    }

    fn caller(&self) -> Result<Option<Arc<dyn Frame>>, FrameError> {
        match &self.back {
            None => Ok(None),
            Some(weak) => match weak.upgrade() {
                Some(frame) => Ok(Some(frame as Arc<dyn Frame>)),
                None => Err(FrameError::Reclaimed),
            },
        }
    }
}

/// Walk at most `depth` callers of `frame`, most recent first.
///
/// A reclaimed link on the first hop is an error: nothing can be shown. A
/// reclaimed link further up ends the walk with what was reached.
pub fn ancestors(frame: &dyn Frame, depth: usize) -> Result<Vec<Arc<dyn Frame>>, FrameError> {
    let mut out: Vec<Arc<dyn Frame>> = Vec::new();
    if depth == 0 {
        return Ok(out);
    }
    let mut next = frame.caller()?;
    while let Some(current) = next {
        next = match current.caller() {
            Ok(caller) => caller,
            Err(_) => None,
        };
        out.push(current);
        if out.len() >= depth {
            break;
        }
    }
    Ok(out)
}
