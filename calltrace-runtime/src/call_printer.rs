//! Indented call/return printer.
//!
//! Every call pushes onto the calling thread's display stack and prints the
//! function with its arguments; every return prints the return value and the
//! time since the matching call, then pops. Indentation follows stack depth.

use std::sync::Arc;

use crate::action::{prefix_for, Action};
use crate::clock::{Clock, MonotonicClock};
use crate::event::{Argument, Event, EventKind, Site, Value, UNRENDERABLE};
use crate::line::{Body, LineKind, RenderedArg, TraceLine};
use crate::output::Output;
use crate::stack::{Ident, StackRegistry};
use crate::timing::{TimingProbe, TimingTable};

/// Default cut-off for rendered argument and return values.
pub const DEFAULT_REPR_LIMIT: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPrinterOptions {
    /// Print the source text of `line` events.
    pub show_source: bool,
    /// Truncate rendered values to this many characters (0 = unbounded).
    pub repr_limit: usize,
    /// Prefix every line with the process id.
    pub pid: bool,
}

impl Default for CallPrinterOptions {
    fn default() -> Self {
        CallPrinterOptions {
            show_source: false,
            repr_limit: DEFAULT_REPR_LIMIT,
            pid: false,
        }
    }
}

pub struct CallPrinter {
    output: Output,
    clock: Arc<dyn Clock>,
    timings: TimingTable,
    stacks: Arc<StackRegistry>,
    options: CallPrinterOptions,
}

impl CallPrinter {
    /// A printer with its own stack registry.
    pub fn new(output: Output) -> Self {
        Self::with_registry(output, Arc::new(StackRegistry::new()))
    }

    /// A printer sharing `stacks` with other printers of the same session.
    pub fn with_registry(output: Output, stacks: Arc<StackRegistry>) -> Self {
        CallPrinter {
            output,
            clock: Arc::new(MonotonicClock),
            timings: TimingTable::new(),
            stacks,
            options: CallPrinterOptions::default(),
        }
    }

    pub fn options(mut self, options: CallPrinterOptions) -> Self {
        self.options = options;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &Arc<StackRegistry> {
        &self.stacks
    }

    /// Calls still waiting for their return.
    pub fn pending(&self) -> usize {
        self.timings.len()
    }

    /// Discard every thread's display stack. In-flight timings are kept.
    pub fn cleanup(&self) {
        self.stacks.reset();
    }

    fn emit(&self, site: &Site, kind: LineKind, depth: usize, body: Body, timing: Option<TimingProbe>) {
        self.output.emit(&TraceLine {
            prefix: prefix_for(site, self.options.pid),
            kind,
            depth,
            body,
            timing,
        });
    }

    fn call(&self, site: &Site, arguments: &[Argument]) {
        if let Some(id) = site.frame_id() {
            self.timings.start(id, self.clock.now());
        }

        if site.builtin {
            let depth = self.stacks.depth(site.thread);
            let source = site.source.as_deref().unwrap_or_default().trim().to_owned();
            self.emit(
                site,
                LineKind::Call,
                depth,
                Body::BuiltinCall {
                    module: site.module.clone(),
                    function: site.function.clone(),
                    source,
                },
                None,
            );
            return;
        }

        // Without a frame the return can never be matched, so nothing is
        // pushed that it would have to pop.
        let depth = if site.frame.is_some() {
            self.stacks
                .push(site.thread, Ident::new(&site.module, &site.function))
        } else {
            self.stacks.depth(site.thread) + 1
        };
        let arguments = arguments
            .iter()
            .map(|a| RenderedArg {
                prefix: a.prefix,
                name: a.name.clone(),
                value: a.render(site.detached, self.options.repr_limit),
            })
            .collect();
        self.emit(
            site,
            LineKind::Call,
            depth,
            Body::Call {
                function: site.function.clone(),
                arguments,
            },
            None,
        );
    }

    fn exception(&self, site: &Site, value: &Value) {
        let depth = self.stacks.depth(site.thread);
        let body = if site.builtin {
            Body::BuiltinException {
                module: site.module.clone(),
                function: site.function.clone(),
            }
        } else {
            Body::Exception {
                function: site.function.clone(),
                value: value.render(site.detached, self.options.repr_limit),
            }
        };
        self.emit(site, LineKind::Exception, depth, body, None);
    }

    fn ret(&self, site: &Site, value: Option<&Value>, raised: bool) {
        // Without a recorded start there is nothing trustworthy to report.
        let Some(id) = site.frame_id() else {
            return;
        };
        let Some(elapsed) = self.timings.finish(id, self.clock.now()) else {
            return;
        };
        let timing = Some(TimingProbe(elapsed));
        let depth = self.stacks.depth(site.thread);

        if site.builtin {
            self.emit(
                site,
                LineKind::Return,
                depth,
                Body::BuiltinReturn {
                    module: site.module.clone(),
                    function: site.function.clone(),
                },
                timing,
            );
            return;
        }

        let value = if raised {
            None
        } else {
            Some(match value {
                Some(v) => v.render(site.detached, self.options.repr_limit),
                None => UNRENDERABLE.to_owned(),
            })
        };
        self.emit(
            site,
            LineKind::Return,
            depth,
            Body::Return {
                function: site.function.clone(),
                value,
            },
            timing,
        );
        self.stacks
            .pop_if_top(site.thread, &Ident::new(&site.module, &site.function));
    }

    fn line(&self, site: &Site) {
        if !self.options.show_source {
            return;
        }
        let depth = self.stacks.depth(site.thread) + 1;
        let text = site.source.as_deref().unwrap_or_default().trim().to_owned();
        self.emit(site, LineKind::Line, depth, Body::Source { text }, None);
    }
}

impl Action for CallPrinter {
    fn handle(&self, event: &Event) {
        let site = &event.site;
        match &event.kind {
            EventKind::Call { arguments } => self.call(site, arguments),
            EventKind::Exception { value } => self.exception(site, value),
            EventKind::Return { value, raised } => self.ret(site, value.as_ref(), *raised),
            EventKind::Line => self.line(site),
        }
    }

    fn flush(&self) {
        self.output.flush();
    }
}
