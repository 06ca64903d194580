//! Replay recorded trace events through an action.
//!
//! An event log is NDJSON, one event per line. The replayer plays the part of
//! the tracing engine: it owns the live frames, sets the clock to each event's
//! timestamp and hands the event to the action. A frame is dropped as soon as
//! its `return` has been handled, the same way a host runtime reclaims it, so
//! later events that name it as their caller see a dead link.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use calltrace_runtime::{
    Action, Argument, Event, EventKind, Frame, FrameId, FrameSnapshot, ManualClock, Site,
    ThreadKey, Value,
};
use serde::Deserialize;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Call,
    Return,
    Exception,
    Line,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ValueRecord {
    #[serde(default)]
    pub repr: Option<String>,
    #[serde(default, rename = "str")]
    pub display: Option<String>,
}

impl From<&ValueRecord> for Value {
    fn from(v: &ValueRecord) -> Self {
        Value::new(v.repr.clone(), v.display.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArgRecord {
    pub name: String,
    /// `*` or `**` for variadic parameters.
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub repr: Option<String>,
    #[serde(default, rename = "str")]
    pub display: Option<String>,
    /// The parameter had no binding in the frame's locals.
    #[serde(default)]
    pub missing: bool,
}

impl ArgRecord {
    fn to_argument(&self) -> Argument {
        let prefix = match self.prefix.as_deref() {
            Some("*") => "*",
            Some("**") => "**",
            _ => "",
        };
        let value = if self.missing {
            None
        } else {
            Some(Value::new(self.repr.clone(), self.display.clone()))
        };
        Argument {
            prefix,
            name: self.name.clone(),
            value,
        }
    }
}

/// One line of an event log.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventRecord {
    /// Seconds since the start of the recording.
    #[serde(default)]
    pub t: f64,
    /// `t` as a duration, filled in by [`parse_lines`].
    #[serde(skip)]
    pub at: Duration,
    pub kind: RecordKind,
    pub function: String,
    #[serde(default)]
    pub module: String,
    #[serde(default)]
    pub thread: Option<u64>,
    #[serde(default)]
    pub thread_name: Option<String>,
    #[serde(default)]
    pub frame: Option<u64>,
    /// Frame id of the caller.
    #[serde(default)]
    pub back: Option<u64>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub lineno: Option<u32>,
    /// Code object name; defaults to `function`.
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub builtin: bool,
    #[serde(default)]
    pub detached: bool,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub args: Vec<ArgRecord>,
    #[serde(default)]
    pub value: Option<ValueRecord>,
    #[serde(default)]
    pub raised: bool,
}

/// Parse every line of an event log. Blank lines are skipped; the first
/// malformed line fails the whole log before anything is replayed.
pub fn parse_log(path: &Path) -> Result<Vec<EventRecord>, Error> {
    let contents = std::fs::read_to_string(path).map_err(|source| Error::EventLogRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse_lines(path, &contents)
}

pub fn parse_lines(path: &Path, contents: &str) -> Result<Vec<EventRecord>, Error> {
    let mut records = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let mut record: EventRecord =
            serde_json::from_str(line).map_err(|e| Error::InvalidEvent {
                path: path.to_path_buf(),
                line: idx + 1,
                reason: e.to_string(),
            })?;
        record.at = Duration::try_from_secs_f64(record.t).map_err(|e| Error::InvalidEvent {
            path: path.to_path_buf(),
            line: idx + 1,
            reason: format!("timestamp {}: {e}", record.t),
        })?;
        records.push(record);
    }
    Ok(records)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub events: usize,
    pub calls: usize,
    pub returns: usize,
    /// Returns whose frame had no recorded call in this log.
    pub unmatched_returns: usize,
}

pub struct Replayer<'a> {
    action: &'a dyn Action,
    clock: Arc<ManualClock>,
    frames: HashMap<u64, Arc<FrameSnapshot>>,
    stats: ReplayStats,
}

impl<'a> Replayer<'a> {
    /// `clock` must be the clock `action` was built with.
    pub fn new(action: &'a dyn Action, clock: Arc<ManualClock>) -> Self {
        Replayer {
            action,
            clock,
            frames: HashMap::new(),
            stats: ReplayStats::default(),
        }
    }

    pub fn stats(&self) -> ReplayStats {
        self.stats
    }

    /// Frames still live (called, not yet returned).
    pub fn live_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn feed(&mut self, record: &EventRecord) {
        self.clock.set(record.at);
        self.stats.events += 1;

        let frame = record.frame.map(|id| self.frame_for(id, record));
        let event = to_event(record, frame.map(|f| f as Arc<dyn Frame>));
        log::trace!(
            "replay: t={:.6} {} {}",
            record.t,
            event.kind.name(),
            record.function
        );
        self.action.handle(&event);

        match record.kind {
            RecordKind::Call => self.stats.calls += 1,
            RecordKind::Return => {
                self.stats.returns += 1;
                // The host reclaims the frame once it has returned.
                if let Some(id) = record.frame {
                    if self.frames.remove(&id).is_none() {
                        self.stats.unmatched_returns += 1;
                    }
                }
            }
            RecordKind::Exception | RecordKind::Line => {}
        }
    }

    fn frame_for(&mut self, id: u64, record: &EventRecord) -> Arc<FrameSnapshot> {
        // A call always starts a new frame. An id still in the table belongs
        // to an abandoned frame whose identity has been reused.
        if record.kind != RecordKind::Call {
            if let Some(frame) = self.frames.get(&id) {
                if let Some(lineno) = record.lineno {
                    frame.set_lineno(lineno);
                }
                return Arc::clone(frame);
            }
        } else if self.frames.contains_key(&id) {
            log::debug!("replay: frame {id} called again before returning; replacing it");
        }

        let back = record.back.map(|back| match self.frames.get(&back) {
            Some(caller) => Arc::downgrade(caller),
            None => {
                log::debug!("replay: frame {id} names caller {back}, which is not live");
                std::sync::Weak::new()
            }
        });
        let frame = FrameSnapshot::with_back(
            FrameId(id),
            record.filename.clone().unwrap_or_else(|| "<unknown>".to_owned()),
            record.lineno.unwrap_or(0),
            record.code.clone().unwrap_or_else(|| record.function.clone()),
            back,
        );
        if record.kind == RecordKind::Return {
            log::debug!("replay: return for frame {id} ({}) without a call", record.function);
            return frame;
        }
        self.frames.insert(id, Arc::clone(&frame));
        frame
    }
}

fn to_event(record: &EventRecord, frame: Option<Arc<dyn Frame>>) -> Event {
    let kind = match record.kind {
        RecordKind::Call => EventKind::Call {
            arguments: record.args.iter().map(ArgRecord::to_argument).collect(),
        },
        RecordKind::Return => EventKind::Return {
            value: record.value.as_ref().map(Value::from),
            raised: record.raised,
        },
        RecordKind::Exception => EventKind::Exception {
            value: record.value.as_ref().map(Value::from).unwrap_or_default(),
        },
        RecordKind::Line => EventKind::Line,
    };
    Event {
        site: Site {
            function: record.function.clone(),
            module: record.module.clone(),
            frame,
            detached: record.detached,
            builtin: record.builtin,
            thread: ThreadKey(record.thread.unwrap_or(0)),
            thread_name: record.thread_name.clone(),
            source: record.source.clone(),
        },
        kind,
    }
}

/// Parse `path` and replay every event through `action`.
pub fn replay_file(
    path: &Path,
    action: &dyn Action,
    clock: Arc<ManualClock>,
) -> Result<ReplayStats, Error> {
    let records = parse_log(path)?;
    let mut replayer = Replayer::new(action, clock);
    for record in &records {
        replayer.feed(record);
    }
    if replayer.live_frames() > 0 {
        log::debug!(
            "replay: {} frame(s) never returned",
            replayer.live_frames()
        );
    }
    Ok(replayer.stats())
}
