//! Trace actions that turn call/return/exception/line events into timed,
//! human-readable lines.
//!
//! Two actions are provided. [`CallPrinter`] indents every call and return by
//! the calling thread's stack depth and annotates returns with the time since
//! the matching call. [`StackPrinter`] prints nothing on calls and, on each
//! return, one line with the live caller chain and the elapsed time.
//!
//! Both key their timers by [`FrameId`] and drop the entry at the first
//! return, so memory is bounded by the number of live calls.

mod action;
mod call_printer;
mod clock;
mod event;
mod frame;
mod line;
mod output;
mod session;
mod stack;
mod stack_printer;
mod timing;

pub use action::Action;
pub use call_printer::{CallPrinter, CallPrinterOptions, DEFAULT_REPR_LIMIT};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use event::{truncate, Argument, Event, EventKind, Site, ThreadKey, Value, MISSING, UNRENDERABLE};
pub use frame::{ancestors, Frame, FrameError, FrameId, FrameSnapshot};
pub use line::{
    AncestorFrame, Body, LineKind, Prefix, RenderedArg, Renderer, TextRenderer, TraceLine,
    DEFAULT_FILENAME_ALIGNMENT,
};
pub use output::{buffer_text, Output, SharedBuffer};
pub use session::{Printer, Session, UnknownPrinter};
pub use stack::{Ident, StackRegistry, DEFAULT_STACK_LIMIT};
pub use stack_printer::{shorten_path, StackPrinter, StackPrinterOptions};
pub use timing::{TimingProbe, TimingTable};
