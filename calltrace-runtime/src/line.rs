//! Structured trace lines and the renderers that turn them into text.
//!
//! Actions build a [`TraceLine`] describing what happened; a [`Renderer`]
//! decides how it looks. The text content (indentation, names, arguments,
//! timing) is identical across renderers; only markup differs.

use std::fmt::Write as _;

use crate::timing::TimingProbe;

/// Width of one indentation level.
const INDENT: &str = "   ";

/// Default width of the right-aligned `filename:lineno` column.
pub const DEFAULT_FILENAME_ALIGNMENT: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Call,
    Return,
    Exception,
    Line,
}

impl LineKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LineKind::Call => "call",
            LineKind::Return => "return",
            LineKind::Exception => "exception",
            LineKind::Line => "line",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prefix {
    pub pid: Option<u32>,
    pub thread: Option<String>,
    pub location: Option<(String, u32)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedArg {
    pub prefix: &'static str,
    pub name: String,
    pub value: String,
}

/// One caller in an ancestor chain, already shortened for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AncestorFrame {
    pub path: String,
    pub lineno: u32,
    pub code_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Call {
        function: String,
        arguments: Vec<RenderedArg>,
    },
    BuiltinCall {
        module: String,
        function: String,
        source: String,
    },
    /// `value` is `None` when the frame unwound through an exception.
    Return {
        function: String,
        value: Option<String>,
    },
    BuiltinReturn {
        module: String,
        function: String,
    },
    Exception {
        function: String,
        value: String,
    },
    BuiltinException {
        module: String,
        function: String,
    },
    Source {
        text: String,
    },
    Stack {
        function: String,
        ancestors: Vec<AncestorFrame>,
    },
    NoFrames {
        function: String,
        detached: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraceLine {
    pub prefix: Prefix,
    pub kind: LineKind,
    /// Nesting depth; `1` for an outermost call. Indentation is `depth - 1` levels.
    pub depth: usize,
    pub body: Body,
    pub timing: Option<TimingProbe>,
}

impl TraceLine {
    pub fn indent_levels(&self) -> usize {
        self.depth.saturating_sub(1)
    }
}

pub trait Renderer: Send + Sync {
    fn render(&self, line: &TraceLine) -> String;
}

/// Markup tokens. Empty strings for plain text.
#[derive(Debug, Clone, Copy)]
struct Palette {
    reset: &'static str,
    kind: &'static str,
    call: &'static str,
    ret: &'static str,
    exception: &'static str,
    line: &'static str,
    normal: &'static str,
    builtin: &'static str,
    vars: &'static str,
    vars_name: &'static str,
    cont: &'static str,
    function: &'static str,
    warning: &'static str,
}

const PLAIN: Palette = Palette {
    reset: "",
    kind: "",
    call: "",
    ret: "",
    exception: "",
    line: "",
    normal: "",
    builtin: "",
    vars: "",
    vars_name: "",
    cont: "",
    function: "",
    warning: "",
};

const ANSI: Palette = Palette {
    reset: "\x1b[0m",
    kind: "\x1b[33m",
    call: "\x1b[1m\x1b[34m",
    ret: "\x1b[1m\x1b[32m",
    exception: "\x1b[1m\x1b[31m",
    line: "\x1b[0m",
    normal: "\x1b[22m",
    builtin: "\x1b[2m",
    vars: "\x1b[1m\x1b[35m",
    vars_name: "\x1b[22m\x1b[35m",
    cont: "\x1b[2m\x1b[36m",
    function: "\x1b[1m\x1b[34m",
    warning: "\x1b[1m\x1b[33m",
};

impl Palette {
    fn event(&self, kind: LineKind) -> &'static str {
        match kind {
            LineKind::Call => self.call,
            LineKind::Return => self.ret,
            LineKind::Exception => self.exception,
            LineKind::Line => self.line,
        }
    }
}

/// Text renderer, with or without ANSI color.
#[derive(Debug, Clone, Copy)]
pub struct TextRenderer {
    palette: Palette,
    filename_alignment: usize,
}

impl TextRenderer {
    pub fn plain() -> Self {
        TextRenderer {
            palette: PLAIN,
            filename_alignment: DEFAULT_FILENAME_ALIGNMENT,
        }
    }

    pub fn ansi() -> Self {
        TextRenderer {
            palette: ANSI,
            filename_alignment: DEFAULT_FILENAME_ALIGNMENT,
        }
    }

    pub fn filename_alignment(mut self, width: usize) -> Self {
        self.filename_alignment = width.max(6);
        self
    }

    fn prefix(&self, prefix: &Prefix, out: &mut String) {
        let p = &self.palette;
        if let Some(pid) = prefix.pid {
            let _ = write!(out, "{}[{}]{} ", p.kind, pid, p.reset);
        }
        if let Some(thread) = &prefix.thread {
            let _ = write!(out, "{}[{}]{} ", p.kind, thread, p.reset);
        }
        if let Some((filename, lineno)) = &prefix.location {
            let shown = align_filename(filename, self.filename_alignment);
            let _ = write!(
                out,
                "{}{:>width$}{}:{}{:<5}{} ",
                p.builtin,
                shown,
                p.cont,
                p.normal,
                lineno,
                p.reset,
                width = self.filename_alignment
            );
        }
    }

    fn body(&self, line: &TraceLine, out: &mut String) {
        let p = &self.palette;
        let color = p.event(line.kind);
        let indent = INDENT.repeat(line.indent_levels());
        let kind = line.kind.as_str();
        match &line.body {
            Body::Call {
                function,
                arguments,
            } => {
                let args = arguments
                    .iter()
                    .map(|a| {
                        format!(
                            "{}{}{}{}{}={}{}",
                            p.vars, a.prefix, p.vars_name, a.name, p.vars, p.reset, a.value
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                let _ = write!(
                    out,
                    "{}{:9} {}{}=>{} {}({}{}{}){}",
                    p.kind, kind, indent, color, p.normal, function, args, color, p.normal, p.reset
                );
            }
            Body::BuiltinCall {
                module,
                function,
                source,
            } => {
                let _ = write!(
                    out,
                    "{}{:9} {}{} >{} {}.{}: {}{}",
                    p.kind, kind, indent, color, p.builtin, module, function, source, p.reset
                );
            }
            Body::Return { function, value } => {
                let _ = write!(
                    out,
                    "{}{:9} {}{}<={} {}",
                    p.kind, kind, indent, color, p.normal, function
                );
                if let Some(value) = value {
                    let _ = write!(out, ": {}{}", p.reset, value);
                }
                out.push_str(p.reset);
            }
            Body::BuiltinReturn { module, function } => {
                let _ = write!(
                    out,
                    "{}{:9} {}{} <{} {}.{}{}",
                    p.kind, kind, indent, color, p.builtin, module, function, p.reset
                );
            }
            Body::Exception { function, value } => {
                let _ = write!(
                    out,
                    "{}{:9} {}{} !{} {}: {}{}",
                    p.kind, kind, indent, color, p.normal, function, p.reset, value
                );
            }
            Body::BuiltinException { module, function } => {
                let _ = write!(
                    out,
                    "{}{:9} {}{} ! {}{}.{}{}",
                    p.kind, kind, indent, color, p.builtin, module, function, p.reset
                );
            }
            Body::Source { text } => {
                let _ = write!(out, "{}{:9} {}{}{}", p.kind, kind, p.reset, indent, text);
            }
            Body::Stack {
                function,
                ancestors,
            } => {
                let chain = ancestors
                    .iter()
                    .map(|a| {
                        format!(
                            "{}{}:{}{}{}:{}{}",
                            a.path, p.cont, p.reset, a.lineno, p.cont, p.function, a.code_name
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(&format!(" {}<={} ", p.kind, p.reset));
                let _ = write!(
                    out,
                    "{}{} {}<={} {}{}",
                    p.function, function, p.kind, p.reset, chain, p.reset
                );
            }
            Body::NoFrames { function, detached } => {
                let _ = write!(
                    out,
                    "{}{} {}<= {}no frames available {}(detached={}){}",
                    p.function, function, p.kind, p.warning, p.normal, detached, p.reset
                );
            }
        }
    }
}

impl Renderer for TextRenderer {
    fn render(&self, line: &TraceLine) -> String {
        let mut out = String::new();
        self.prefix(&line.prefix, &mut out);
        if matches!(line.body, Body::Stack { .. } | Body::NoFrames { .. }) {
            // Stack lines hang the function name off the location column.
            let trimmed = out.trim_end().len();
            out.truncate(trimmed);
            if line.prefix.location.is_some() {
                let _ = write!(out, "{}:", self.palette.cont);
            } else if !out.is_empty() {
                out.push(' ');
            }
        }
        self.body(line, &mut out);
        if let Some(probe) = line.timing {
            let _ = write!(out, " - {}", probe);
        }
        out
    }
}

/// Fit `filename` into `width` columns, replacing the head with `[...]`.
fn align_filename(filename: &str, width: usize) -> String {
    let len = filename.chars().count();
    if len <= width {
        return filename.to_owned();
    }
    let keep = width.saturating_sub(5);
    let tail: String = filename.chars().skip(len - keep).collect();
    format!("[...]{tail}")
}
