//! A tracing session: the lifetime that owns shared display stacks.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::action::Action;
use crate::call_printer::{CallPrinter, CallPrinterOptions};
use crate::clock::{Clock, MonotonicClock};
use crate::output::Output;
use crate::stack::StackRegistry;
use crate::stack_printer::{StackPrinter, StackPrinterOptions};

/// Which action renders the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Printer {
    Call,
    #[default]
    Stack,
}

impl Printer {
    pub fn as_str(self) -> &'static str {
        match self {
            Printer::Call => "call",
            Printer::Stack => "stack",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPrinter(pub String);

impl fmt::Display for UnknownPrinter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown printer '{}' (expected 'call' or 'stack')", self.0)
    }
}

impl std::error::Error for UnknownPrinter {}

impl FromStr for Printer {
    type Err = UnknownPrinter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "call" => Ok(Printer::Call),
            "stack" => Ok(Printer::Stack),
            other => Err(UnknownPrinter(other.to_owned())),
        }
    }
}

/// Owns the display stacks shared by every call printer it creates.
///
/// Stacks outlive any single printer; `reset()` clears them between sessions
/// (or tests) without touching the printers' in-flight timings.
pub struct Session {
    stacks: Arc<StackRegistry>,
    clock: Arc<dyn Clock>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Session {
            stacks: Arc::new(StackRegistry::new()),
            clock: Arc::new(MonotonicClock),
        }
    }

    /// Use `clock` for every action created from now on.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_stack_limit(mut self, limit: usize) -> Self {
        self.stacks = Arc::new(StackRegistry::with_capacity_limit(limit));
        self
    }

    pub fn registry(&self) -> &Arc<StackRegistry> {
        &self.stacks
    }

    pub fn call_printer(&self, output: Output, options: CallPrinterOptions) -> CallPrinter {
        CallPrinter::with_registry(output, Arc::clone(&self.stacks))
            .options(options)
            .clock(Arc::clone(&self.clock))
    }

    pub fn stack_printer(&self, output: Output, options: StackPrinterOptions) -> StackPrinter {
        StackPrinter::new(output)
            .options(options)
            .clock(Arc::clone(&self.clock))
    }

    pub fn action(
        &self,
        printer: Printer,
        output: Output,
        call: CallPrinterOptions,
        stack: StackPrinterOptions,
    ) -> Box<dyn Action> {
        match printer {
            Printer::Call => Box::new(self.call_printer(output, call)),
            Printer::Stack => Box::new(self.stack_printer(output, stack)),
        }
    }

    pub fn reset(&self) {
        self.stacks.reset();
    }
}
