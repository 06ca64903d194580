//! Trace events as delivered by the event source.
//!
//! The event source decides the kind of every event up front and attaches only
//! the fields that kind needs: call events carry their formal arguments (already
//! joined with the frame's locals), return and exception events carry their
//! payload. Fields common to every kind live in [`Site`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::frame::{Frame, FrameId};

/// Placeholder for a value whose text form could not be produced.
pub const UNRENDERABLE: &str = "<?>";

/// Placeholder for a formal argument missing from the frame's locals.
pub const MISSING: &str = "<missing>";

/// Process-unique key for the thread an event was generated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadKey(pub u64);

static NEXT_THREAD_KEY: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_KEY: u64 = NEXT_THREAD_KEY.fetch_add(1, Ordering::Relaxed);
}

impl ThreadKey {
    /// Key of the calling thread, assigned on first use.
    pub fn current() -> Self {
        ThreadKey(THREAD_KEY.with(|k| *k))
    }
}

/// A traced value, pre-rendered by the event source.
///
/// `repr` is the representation form, `display` the safe string form. Either
/// may be absent when rendering failed on the source side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Value {
    pub repr: Option<String>,
    pub display: Option<String>,
}

impl Value {
    /// A value whose repr and display forms are the same text.
    pub fn text(s: impl Into<String>) -> Self {
        let s = s.into();
        Value {
            repr: Some(s.clone()),
            display: Some(s),
        }
    }

    pub fn new(repr: Option<String>, display: Option<String>) -> Self {
        Value { repr, display }
    }

    /// Detached events cannot be introspected live, so they use the safe
    /// string form; everything else uses the representation.
    pub fn render(&self, detached: bool, limit: usize) -> String {
        let chosen = if detached {
            self.display.as_deref()
        } else {
            self.repr.as_deref()
        };
        match chosen {
            Some(s) => truncate(s, limit),
            None => UNRENDERABLE.to_owned(),
        }
    }
}

/// Cut `s` to at most `limit` characters, marking the cut with `...`.
/// `limit == 0` disables truncation.
pub fn truncate(s: &str, limit: usize) -> String {
    if limit == 0 {
        return s.to_owned();
    }
    match s.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_owned(),
    }
}

/// One formal parameter of the called code object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    /// `""`, `"*"` or `"**"`.
    pub prefix: &'static str,
    pub name: String,
    /// `None` when the parameter had no binding in the frame's locals.
    pub value: Option<Value>,
}

impl Argument {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Argument {
            prefix: "",
            name: name.into(),
            value: Some(value),
        }
    }

    pub fn missing(name: impl Into<String>) -> Self {
        Argument {
            prefix: "",
            name: name.into(),
            value: None,
        }
    }

    pub fn varargs(name: impl Into<String>, value: Value) -> Self {
        Argument {
            prefix: "*",
            ..Argument::new(name, value)
        }
    }

    pub fn varkw(name: impl Into<String>, value: Value) -> Self {
        Argument {
            prefix: "**",
            ..Argument::new(name, value)
        }
    }

    pub(crate) fn render(&self, detached: bool, limit: usize) -> String {
        match &self.value {
            Some(v) => v.render(detached, limit),
            None => MISSING.to_owned(),
        }
    }
}

/// Fields shared by every event kind.
#[derive(Clone)]
pub struct Site {
    pub function: String,
    pub module: String,
    pub frame: Option<Arc<dyn Frame>>,
    pub detached: bool,
    pub builtin: bool,
    pub thread: ThreadKey,
    pub thread_name: Option<String>,
    /// Text of the current source line, when the event source could fetch it.
    pub source: Option<String>,
}

impl Site {
    pub fn frame_id(&self) -> Option<FrameId> {
        self.frame.as_ref().map(|f| f.id())
    }

    /// `filename:lineno` of the event's frame, used for the line prefix.
    pub fn location(&self) -> Option<(String, u32)> {
        self.frame
            .as_ref()
            .map(|f| (f.filename().to_owned(), f.lineno()))
    }
}

impl std::fmt::Debug for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Site")
            .field("function", &self.function)
            .field("module", &self.module)
            .field("frame", &self.frame_id())
            .field("detached", &self.detached)
            .field("builtin", &self.builtin)
            .field("thread", &self.thread)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum EventKind {
    Call { arguments: Vec<Argument> },
    /// `raised` is set when the frame is unwinding because of an exception;
    /// there is no return value to show in that case.
    Return { value: Option<Value>, raised: bool },
    Exception { value: Value },
    Line,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Call { .. } => "call",
            EventKind::Return { .. } => "return",
            EventKind::Exception { .. } => "exception",
            EventKind::Line => "line",
        }
    }
}

/// A single trace event.
#[derive(Debug, Clone)]
pub struct Event {
    pub site: Site,
    pub kind: EventKind,
}

impl Event {
    fn on(module: &str, function: &str, frame: Option<Arc<dyn Frame>>, kind: EventKind) -> Self {
        Event {
            site: Site {
                function: function.to_owned(),
                module: module.to_owned(),
                frame,
                detached: false,
                builtin: false,
                thread: ThreadKey::current(),
                thread_name: None,
                source: None,
            },
            kind,
        }
    }

    pub fn call(
        module: &str,
        function: &str,
        frame: Option<Arc<dyn Frame>>,
        arguments: Vec<Argument>,
    ) -> Self {
        Self::on(module, function, frame, EventKind::Call { arguments })
    }

    pub fn ret(
        module: &str,
        function: &str,
        frame: Option<Arc<dyn Frame>>,
        value: Option<Value>,
    ) -> Self {
        Self::on(
            module,
            function,
            frame,
            EventKind::Return {
                value,
                raised: false,
            },
        )
    }

    pub fn exception(
        module: &str,
        function: &str,
        frame: Option<Arc<dyn Frame>>,
        value: Value,
    ) -> Self {
        Self::on(module, function, frame, EventKind::Exception { value })
    }

    pub fn line(module: &str, function: &str, frame: Option<Arc<dyn Frame>>) -> Self {
        Self::on(module, function, frame, EventKind::Line)
    }

    pub fn with_thread(mut self, thread: ThreadKey, name: Option<String>) -> Self {
        self.site.thread = thread;
        self.site.thread_name = name;
        self
    }

    pub fn with_detached(mut self, detached: bool) -> Self {
        self.site.detached = detached;
        self
    }

    pub fn with_builtin(mut self, builtin: bool) -> Self {
        self.site.builtin = builtin;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.site.source = Some(source.into());
        self
    }

    /// Mark a return event as exception unwinding. No effect on other kinds.
    pub fn raised(mut self) -> Self {
        if let EventKind::Return { raised, .. } = &mut self.kind {
            *raised = true;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_picks_display_form_when_detached() {
        let v = Value::new(Some("'abc'".into()), Some("abc".into()));
        assert_eq!(v.render(false, 0), "'abc'");
        assert_eq!(v.render(true, 0), "abc");
    }

    #[test]
    fn render_failure_degrades_to_placeholder() {
        let v = Value::new(None, Some("abc".into()));
        assert_eq!(v.render(false, 512), UNRENDERABLE);
        assert_eq!(Argument::missing("x").render(false, 512), MISSING);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé...");
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("unbounded", 0), "unbounded");
    }

    #[test]
    fn thread_keys_differ_across_threads() {
        let here = ThreadKey::current();
        assert_eq!(here, ThreadKey::current());
        let there = std::thread::spawn(ThreadKey::current).join().unwrap();
        assert_ne!(here, there);
    }

    #[test]
    fn raised_only_marks_returns() {
        let ev = Event::ret("m", "f", None, None).raised();
        assert!(matches!(ev.kind, EventKind::Return { raised: true, .. }));
        let ev = Event::line("m", "f", None).raised();
        assert!(matches!(ev.kind, EventKind::Line));
    }
}
