//! Startup configuration from `CALLTRACE_*` environment variables.
//!
//! Everything is read and validated once, before the first event is handled.
//! A bad value is a caller mistake and fails loudly here rather than at trace
//! time.

use std::time::Duration;

use calltrace_runtime::{
    CallPrinterOptions, Printer, Renderer, StackPrinterOptions, TextRenderer,
    DEFAULT_FILENAME_ALIGNMENT, DEFAULT_REPR_LIMIT, DEFAULT_STACK_LIMIT,
};

use crate::error::Error;

pub const PRINTER_VAR: &str = "CALLTRACE_PRINTER";
pub const MIN_SEC_VAR: &str = "CALLTRACE_MIN_SEC";
pub const DEPTH_VAR: &str = "CALLTRACE_DEPTH";
pub const LIMIT_VAR: &str = "CALLTRACE_LIMIT";
pub const SHOW_CODE_VAR: &str = "CALLTRACE_SHOW_CODE";
pub const REPR_LIMIT_VAR: &str = "CALLTRACE_REPR_LIMIT";
pub const COLOR_VAR: &str = "CALLTRACE_COLOR";
pub const FILENAME_ALIGNMENT_VAR: &str = "CALLTRACE_FILENAME_ALIGNMENT";
pub const STACK_LIMIT_VAR: &str = "CALLTRACE_STACK_LIMIT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorChoice {
    Always,
    Never,
    #[default]
    Auto,
}

impl ColorChoice {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "always" => Some(ColorChoice::Always),
            "never" => Some(ColorChoice::Never),
            "auto" => Some(ColorChoice::Auto),
            _ => None,
        }
    }

    /// Resolve `Auto` against whether the output is a terminal.
    pub fn enabled(self, is_terminal: bool) -> bool {
        match self {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => is_terminal,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub printer: Printer,
    pub min_duration: Duration,
    pub depth: usize,
    pub limit: usize,
    pub show_code: bool,
    pub repr_limit: usize,
    pub color: ColorChoice,
    pub pid: bool,
    /// Width of the right-aligned `filename:lineno` column.
    pub filename_alignment: usize,
    /// Entries kept per thread's display stack before the oldest is evicted.
    pub stack_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        let stack = StackPrinterOptions::default();
        Config {
            printer: Printer::Stack,
            min_duration: stack.min_duration,
            depth: stack.depth,
            limit: stack.limit,
            show_code: false,
            repr_limit: DEFAULT_REPR_LIMIT,
            color: ColorChoice::Auto,
            pid: false,
            filename_alignment: DEFAULT_FILENAME_ALIGNMENT,
            stack_limit: DEFAULT_STACK_LIMIT,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build a config from an arbitrary variable lookup. Unset variables keep
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut config = Config::default();

        if let Some(printer) = lookup(PRINTER_VAR) {
            config.printer = printer.trim().parse()?;
        }
        if let Some(raw) = lookup(MIN_SEC_VAR) {
            config.min_duration = parse_seconds(MIN_SEC_VAR, &raw)?;
        }
        if let Some(raw) = lookup(DEPTH_VAR) {
            config.depth = parse_count(DEPTH_VAR, &raw)?;
        }
        if let Some(raw) = lookup(LIMIT_VAR) {
            config.limit = parse_count(LIMIT_VAR, &raw)?;
        }
        if let Some(raw) = lookup(SHOW_CODE_VAR) {
            config.show_code = parse_flag(&raw);
        }
        if let Some(raw) = lookup(REPR_LIMIT_VAR) {
            config.repr_limit = parse_count(REPR_LIMIT_VAR, &raw)?;
        }
        if let Some(raw) = lookup(COLOR_VAR) {
            config.color = ColorChoice::parse(raw.trim()).ok_or_else(|| Error::InvalidConfig {
                var: COLOR_VAR,
                value: raw.clone(),
                reason: "expected always, never or auto".into(),
            })?;
        }
        if let Some(raw) = lookup(FILENAME_ALIGNMENT_VAR) {
            config.filename_alignment = parse_count(FILENAME_ALIGNMENT_VAR, &raw)?;
        }
        if let Some(raw) = lookup(STACK_LIMIT_VAR) {
            config.stack_limit = parse_count(STACK_LIMIT_VAR, &raw)?;
        }
        Ok(config)
    }

    /// The renderer for an output stream; `is_terminal` resolves `Auto` color.
    pub fn renderer(&self, is_terminal: bool) -> Box<dyn Renderer> {
        let renderer = if self.color.enabled(is_terminal) {
            TextRenderer::ansi()
        } else {
            TextRenderer::plain()
        };
        Box::new(renderer.filename_alignment(self.filename_alignment))
    }

    pub fn call_options(&self) -> CallPrinterOptions {
        CallPrinterOptions {
            show_source: self.show_code,
            repr_limit: self.repr_limit,
            pid: self.pid,
        }
    }

    pub fn stack_options(&self) -> StackPrinterOptions {
        StackPrinterOptions {
            depth: self.depth,
            limit: self.limit,
            min_duration: self.min_duration,
            pid: self.pid,
        }
    }
}

/// Any non-empty value other than `0`/`false`/`no`/`off` enables a flag.
fn parse_flag(raw: &str) -> bool {
    let v = raw.trim().to_ascii_lowercase();
    !(v.is_empty() || v == "0" || v == "false" || v == "no" || v == "off")
}

pub fn parse_seconds(var: &'static str, raw: &str) -> Result<Duration, Error> {
    let secs: f64 = raw.trim().parse().map_err(|_| Error::InvalidConfig {
        var,
        value: raw.to_owned(),
        reason: "expected a number of seconds".into(),
    })?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(Error::InvalidConfig {
            var,
            value: raw.to_owned(),
            reason: "must be a finite, non-negative number".into(),
        });
    }
    Duration::try_from_secs_f64(secs).map_err(|e| Error::InvalidConfig {
        var,
        value: raw.to_owned(),
        reason: e.to_string(),
    })
}

fn parse_count(var: &'static str, raw: &str) -> Result<usize, Error> {
    raw.trim().parse().map_err(|_| Error::InvalidConfig {
        var,
        value: raw.to_owned(),
        reason: "expected a non-negative integer".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.printer, Printer::Stack);
        assert_eq!(config.depth, 15);
        assert_eq!(config.limit, 2);
        assert_eq!(config.min_duration, Duration::ZERO);
    }

    #[test]
    fn reads_every_option() {
        let config = Config::from_lookup(lookup(&[
            (PRINTER_VAR, "call"),
            (MIN_SEC_VAR, "0.5"),
            (DEPTH_VAR, "5"),
            (LIMIT_VAR, "3"),
            (SHOW_CODE_VAR, "1"),
            (REPR_LIMIT_VAR, "80"),
            (COLOR_VAR, "never"),
            (FILENAME_ALIGNMENT_VAR, "20"),
            (STACK_LIMIT_VAR, "64"),
        ]))
        .unwrap();
        assert_eq!(config.printer, Printer::Call);
        assert_eq!(config.min_duration, Duration::from_millis(500));
        assert_eq!(config.depth, 5);
        assert_eq!(config.limit, 3);
        assert!(config.show_code);
        assert_eq!(config.repr_limit, 80);
        assert_eq!(config.color, ColorChoice::Never);
        assert_eq!(config.filename_alignment, 20);
        assert_eq!(config.stack_limit, 64);

        let stack = config.stack_options();
        assert_eq!(stack.depth, 5);
        assert_eq!(stack.min_duration, Duration::from_millis(500));
        assert!(config.call_options().show_source);
    }

    #[test]
    fn unknown_printer_fails_fast() {
        let err = Config::from_lookup(lookup(&[(PRINTER_VAR, "tree")])).unwrap_err();
        assert!(matches!(err, Error::UnknownPrinter(_)));
        assert!(err.to_string().contains("unknown printer 'tree'"), "{err}");
    }

    #[test]
    fn bad_numbers_are_rejected() {
        for (var, value) in [
            (MIN_SEC_VAR, "soon"),
            (MIN_SEC_VAR, "-1"),
            (MIN_SEC_VAR, "inf"),
            (MIN_SEC_VAR, "1e20"),
            (DEPTH_VAR, "-3"),
            (LIMIT_VAR, "two"),
            (STACK_LIMIT_VAR, "lots"),
            (FILENAME_ALIGNMENT_VAR, "-1"),
        ] {
            let err = Config::from_lookup(lookup(&[(var, value)])).unwrap_err();
            assert!(
                matches!(err, Error::InvalidConfig { var: v, .. } if v == var),
                "{var}={value}: {err}"
            );
        }
    }

    #[test]
    fn show_code_flag_values() {
        assert!(!parse_flag(""));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("False"));
        assert!(parse_flag("yes"));
        assert!(parse_flag("1"));
    }

    #[test]
    fn renderer_uses_configured_alignment() {
        use calltrace_runtime::{Body, LineKind, Prefix, TraceLine};

        let line = TraceLine {
            prefix: Prefix {
                pid: None,
                thread: None,
                location: Some(("app.py".into(), 3)),
            },
            kind: LineKind::Line,
            depth: 1,
            body: Body::Source { text: "x = 1".into() },
            timing: None,
        };
        let config = Config {
            filename_alignment: 8,
            color: ColorChoice::Never,
            ..Config::default()
        };
        assert_eq!(
            config.renderer(true).render(&line),
            "  app.py:3     line      x = 1"
        );
    }

    #[test]
    fn color_auto_follows_terminal() {
        assert!(ColorChoice::Auto.enabled(true));
        assert!(!ColorChoice::Auto.enabled(false));
        assert!(ColorChoice::Always.enabled(false));
        assert!(!ColorChoice::Never.enabled(true));
    }
}
