//! One-line ancestor stack printer.
//!
//! Calls only start a timer. On return, the caller chain of the returning
//! frame is walked while it is still live and printed on a single line
//! together with the elapsed time.

use std::sync::Arc;
use std::time::Duration;

use crate::action::{prefix_for, Action};
use crate::clock::{Clock, MonotonicClock};
use crate::event::{Event, EventKind, Site};
use crate::frame::{ancestors, Frame};
use crate::line::{AncestorFrame, Body, LineKind, TraceLine};
use crate::output::Output;
use crate::timing::{TimingProbe, TimingTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackPrinterOptions {
    /// Maximum number of ancestor frames shown.
    pub depth: usize,
    /// Path segments kept per filename (`2` shows `parent/file.py`).
    pub limit: usize,
    /// Returns faster than this are not printed.
    pub min_duration: Duration,
    pub pid: bool,
}

impl Default for StackPrinterOptions {
    fn default() -> Self {
        StackPrinterOptions {
            depth: 15,
            limit: 2,
            min_duration: Duration::ZERO,
            pid: false,
        }
    }
}

pub struct StackPrinter {
    output: Output,
    clock: Arc<dyn Clock>,
    timings: TimingTable,
    options: StackPrinterOptions,
}

impl StackPrinter {
    pub fn new(output: Output) -> Self {
        StackPrinter {
            output,
            clock: Arc::new(MonotonicClock),
            timings: TimingTable::new(),
            options: StackPrinterOptions::default(),
        }
    }

    pub fn options(mut self, options: StackPrinterOptions) -> Self {
        self.options = options;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn pending(&self) -> usize {
        self.timings.len()
    }

    fn ret(&self, site: &Site) {
        let Some(id) = site.frame_id() else {
            return;
        };
        let Some(elapsed) = self.timings.finish(id, self.clock.now()) else {
            return;
        };
        if elapsed < self.options.min_duration {
            return;
        }

        let body = match site.frame.as_deref().and_then(|f| self.chain(f)) {
            Some(chain) => Body::Stack {
                function: site.function.clone(),
                ancestors: chain,
            },
            None => Body::NoFrames {
                function: site.function.clone(),
                detached: site.detached,
            },
        };
        self.output.emit(&TraceLine {
            prefix: prefix_for(site, self.options.pid),
            kind: LineKind::Return,
            depth: 1,
            body,
            timing: Some(TimingProbe(elapsed)),
        });
    }

    /// The rendered caller chain, or `None` when the frame has no reachable caller.
    fn chain(&self, frame: &dyn Frame) -> Option<Vec<AncestorFrame>> {
        match frame.caller() {
            Ok(Some(_)) => {}
            Ok(None) => return None,
            Err(e) => {
                log::debug!("calltrace: no caller chain for {}: {e}", frame.code_name());
                return None;
            }
        }
        let frames = ancestors(frame, self.options.depth).ok()?;
        Some(
            frames
                .iter()
                .map(|f| AncestorFrame {
                    path: shorten_path(f.filename(), self.options.limit),
                    lineno: f.lineno(),
                    code_name: f.code_name().to_owned(),
                })
                .collect(),
        )
    }
}

impl Action for StackPrinter {
    fn handle(&self, event: &Event) {
        match &event.kind {
            EventKind::Call { .. } => {
                if let Some(id) = event.site.frame_id() {
                    self.timings.start(id, self.clock.now());
                }
            }
            EventKind::Return { .. } => self.ret(&event.site),
            EventKind::Exception { .. } | EventKind::Line => {}
        }
    }

    fn flush(&self) {
        self.output.flush();
    }
}

/// Keep the last `limit` segments of `path`, joined with `/`.
/// `limit == 0` keeps every segment.
pub fn shorten_path(path: &str, limit: usize) -> String {
    let segments: Vec<&str> = path.split(['/', '\\']).collect();
    let skip = if limit == 0 {
        0
    } else {
        segments.len().saturating_sub(limit)
    };
    segments[skip..].join("/")
}
