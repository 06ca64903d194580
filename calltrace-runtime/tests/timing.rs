//! Elapsed-time and nesting behaviour of both printers, driven the way a
//! tracing engine would drive them.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use calltrace_runtime::{
    buffer_text, Action, Argument, CallPrinter, Event, Frame, FrameId, FrameSnapshot, ManualClock,
    Output, Session, StackPrinter, StackPrinterOptions, TextRenderer, ThreadKey, Value,
};

fn time_sec(line: &str) -> f64 {
    let start = line.find("time_sec=[").expect("no timing on line") + "time_sec=[".len();
    let end = line[start..].find(']').unwrap() + start;
    line[start..end].parse().unwrap()
}

#[test]
fn real_sleep_is_measured() {
    let (out, buf) = Output::buffer(Box::new(TextRenderer::plain()));
    let printer = CallPrinter::new(out);
    let frame: Arc<dyn Frame> = FrameSnapshot::new(FrameId(1), "sleepy.py", 3, "nap", None);

    printer.handle(&Event::call("sleepy", "nap", Some(frame.clone()), vec![]));
    thread::sleep(Duration::from_millis(200));
    printer.handle(&Event::ret("sleepy", "nap", Some(frame), Some(Value::text("None"))));

    let text = buffer_text(&buf);
    let elapsed = time_sec(text.lines().last().unwrap());
    assert!(
        (0.2..0.3).contains(&elapsed),
        "expected ~0.2s, got {elapsed} in {text}"
    );
    assert!(text.contains("time_sec=[0.2"), "got: {text}");
}

/// `b(cnt)` sleeps `cnt` seconds then calls `c()`, which sleeps 3 seconds.
fn replay_b_then_c(action: &dyn Action, clock: &ManualClock) {
    let module: Arc<FrameSnapshot> = FrameSnapshot::new(FrameId(1), "/tmp/play/profile_playground.py", 23, "<module>", None);
    let b = FrameSnapshot::new(FrameId(2), "/tmp/play/profile_playground.py", 19, "b", Some(&module));
    let c = FrameSnapshot::new(FrameId(3), "/tmp/play/profile_playground.py", 15, "c", Some(&b));

    action.handle(&Event::call("__main__", "b", Some(b.clone()), vec![Argument::new("cnt", Value::text("2"))]));
    clock.advance(Duration::from_secs(2));
    b.set_lineno(21);
    action.handle(&Event::call("__main__", "c", Some(c.clone()), vec![]));
    clock.advance(Duration::from_secs(3));
    action.handle(&Event::ret("__main__", "c", Some(c), Some(Value::text("None"))));
    action.handle(&Event::ret("__main__", "b", Some(b), Some(Value::text("None"))));
}

#[test]
fn nested_sleep_scenario_with_call_printer() {
    let clock = Arc::new(ManualClock::new());
    let session = Session::new().with_clock(clock.clone());
    let (out, buf) = Output::buffer(Box::new(TextRenderer::plain()));
    let printer = session.call_printer(out, Default::default());

    replay_b_then_c(&printer, &clock);

    let text = buffer_text(&buf);
    let lines: Vec<&str> = text.lines().collect();
    let c_ret = lines.iter().position(|l| l.contains("<= c:")).expect("no return for c");
    let b_ret = lines.iter().position(|l| l.contains("<= b:")).expect("no return for b");
    assert!(c_ret < b_ret, "c must return before b:\n{text}");
    assert!((time_sec(lines[c_ret]) - 3.0).abs() < 0.05);
    assert!((time_sec(lines[b_ret]) - 5.0).abs() < 0.05);
    assert!(lines[0].contains("=> b(cnt=2)"), "got: {}", lines[0]);
    assert_eq!(printer.registry().depth(ThreadKey::current()), 0);
}

#[test]
fn nested_sleep_scenario_with_stack_printer() {
    let clock = Arc::new(ManualClock::new());
    let session = Session::new().with_clock(clock.clone());
    let (out, buf) = Output::buffer(Box::new(TextRenderer::plain()));
    let printer = session.stack_printer(out, StackPrinterOptions::default());

    replay_b_then_c(&printer, &clock);

    let text = buffer_text(&buf);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2, "got: {text}");
    assert!(
        lines[0].ends_with(
            ":c <= play/profile_playground.py:21:b <= play/profile_playground.py:23:<module> - time_sec=[3.0000]"
        ),
        "got: {}",
        lines[0]
    );
    assert!(
        lines[1].ends_with(":b <= play/profile_playground.py:23:<module> - time_sec=[5.0000]"),
        "got: {}",
        lines[1]
    );
}

#[test]
fn indentation_tracks_nesting_and_returns_to_zero() {
    let (out, buf) = Output::buffer(Box::new(TextRenderer::plain()));
    let printer = CallPrinter::new(out);
    let frames: Vec<Arc<dyn Frame>> = (0..4)
        .map(|i| -> Arc<dyn Frame> { FrameSnapshot::new(FrameId(i), "deep.py", i as u32, format!("f{i}"), None) })
        .collect();

    for (i, f) in frames.iter().enumerate() {
        printer.handle(&Event::call("deep", &format!("f{i}"), Some(f.clone()), vec![]));
        assert_eq!(printer.registry().depth(ThreadKey::current()), i + 1);
    }
    for (i, f) in frames.iter().enumerate().rev() {
        printer.handle(&Event::ret("deep", &format!("f{i}"), Some(f.clone()), None));
    }
    assert_eq!(printer.registry().depth(ThreadKey::current()), 0);

    let text = buffer_text(&buf);
    for (i, line) in text.lines().take(4).enumerate() {
        let after_kind = line.split("call      ").nth(1).expect("call column");
        let indent = after_kind.len() - after_kind.trim_start().len();
        assert_eq!(indent, 3 * i, "line {i}: {line:?}");
    }
}

#[test]
fn threads_keep_separate_stacks() {
    let session = Session::new();
    let (out, _buf) = Output::buffer(Box::new(TextRenderer::plain()));
    let printer = Arc::new(session.call_printer(out, Default::default()));

    let handles: Vec<_> = (0..4u64)
        .map(|t| {
            let printer = Arc::clone(&printer);
            thread::spawn(move || {
                let mut frames = Vec::new();
                for depth in 0..=t {
                    let f: Arc<dyn Frame> =
                        FrameSnapshot::new(FrameId(t * 100 + depth), "t.py", 1, "work", None);
                    printer.handle(&Event::call("t", "work", Some(f.clone()), vec![]));
                    frames.push(f);
                }
                let depth = printer.registry().depth(ThreadKey::current());
                while let Some(f) = frames.pop() {
                    printer.handle(&Event::ret("t", "work", Some(f), None));
                }
                (t, depth, printer.registry().depth(ThreadKey::current()))
            })
        })
        .collect();

    for h in handles {
        let (t, peak, after) = h.join().unwrap();
        assert_eq!(peak as u64, t + 1);
        assert_eq!(after, 0);
    }
    assert_eq!(printer.pending(), 0);
}

#[test]
fn stack_printer_with_real_clock_filters_fast_calls() {
    let (out, buf) = Output::buffer(Box::new(TextRenderer::plain()));
    let printer = StackPrinter::new(out).options(StackPrinterOptions {
        min_duration: Duration::from_millis(50),
        ..StackPrinterOptions::default()
    });
    let root = FrameSnapshot::new(FrameId(1), "main.py", 1, "<module>", None);
    let quick: Arc<dyn Frame> = FrameSnapshot::new(FrameId(2), "main.py", 2, "quick", Some(&root));
    let slow: Arc<dyn Frame> = FrameSnapshot::new(FrameId(3), "main.py", 3, "slow", Some(&root));

    printer.handle(&Event::call("main", "quick", Some(quick.clone()), vec![]));
    printer.handle(&Event::ret("main", "quick", Some(quick), None));
    printer.handle(&Event::call("main", "slow", Some(slow.clone()), vec![]));
    thread::sleep(Duration::from_millis(80));
    printer.handle(&Event::ret("main", "slow", Some(slow), None));

    let text = buffer_text(&buf);
    assert_eq!(text.lines().count(), 1, "got: {text}");
    assert!(text.contains("slow <= main.py:1:<module>"), "got: {text}");
}
