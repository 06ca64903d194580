use std::fs::File;
use std::io::{BufWriter, IsTerminal, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use calltrace::config::{self, ColorChoice, Config};
use calltrace::error::Error;
use calltrace::replay::replay_file;
use calltrace_runtime::{Action, ManualClock, Output, Session};

#[derive(Parser)]
#[command(
    name = "calltrace",
    about = "Timed call/return traces from function-call trace events",
    version,
    after_help = "Options not given on the command line fall back to CALLTRACE_* environment variables."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded NDJSON event log through a printer.
    Replay {
        /// Event log, one JSON event per line.
        log: PathBuf,

        /// `call` (indented calls and returns) or `stack` (one ancestor line per return).
        #[arg(long)]
        printer: Option<String>,

        /// Hide stack lines for returns faster than this many seconds.
        #[arg(long, value_name = "SECONDS")]
        min_sec: Option<String>,

        /// Maximum number of ancestor frames per stack line.
        #[arg(long)]
        depth: Option<usize>,

        /// Path segments kept per filename in stack lines.
        #[arg(long)]
        limit: Option<usize>,

        /// Print source lines from `line` events (call printer).
        #[arg(long)]
        show_code: bool,

        /// Truncate rendered values to this many characters (0 = unbounded).
        #[arg(long)]
        repr_limit: Option<usize>,

        /// always, never or auto.
        #[arg(long)]
        color: Option<String>,

        /// Prefix every line with the process id.
        #[arg(long)]
        pid: bool,

        /// Width of the right-aligned filename column.
        #[arg(long, value_name = "WIDTH")]
        filename_alignment: Option<usize>,

        /// Entries kept per thread's display stack (call printer).
        #[arg(long)]
        stack_limit: Option<usize>,

        /// Write the trace here instead of stderr.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    match cli.command {
        Commands::Replay {
            log,
            printer,
            min_sec,
            depth,
            limit,
            show_code,
            repr_limit,
            color,
            pid,
            filename_alignment,
            stack_limit,
            output,
        } => {
            let mut config = Config::from_env()?;
            if let Some(p) = printer {
                config.printer = p.parse()?;
            }
            if let Some(raw) = min_sec {
                config.min_duration = config::parse_seconds("--min-sec", &raw)?;
            }
            if let Some(d) = depth {
                config.depth = d;
            }
            if let Some(l) = limit {
                config.limit = l;
            }
            if show_code {
                config.show_code = true;
            }
            if let Some(r) = repr_limit {
                config.repr_limit = r;
            }
            if let Some(c) = color {
                config.color = ColorChoice::parse(&c).ok_or_else(|| Error::InvalidConfig {
                    var: "--color",
                    value: c.clone(),
                    reason: "expected always, never or auto".into(),
                })?;
            }
            if pid {
                config.pid = true;
            }
            if let Some(w) = filename_alignment {
                config.filename_alignment = w;
            }
            if let Some(l) = stack_limit {
                config.stack_limit = l;
            }
            cmd_replay(log, config, output)
        }
    }
}

fn cmd_replay(log: PathBuf, config: Config, output: Option<PathBuf>) -> Result<(), Error> {
    let sink = match &output {
        Some(path) => {
            let file: Box<dyn Write + Send> = Box::new(BufWriter::new(File::create(path)?));
            Output::new(file, config.renderer(false))
        }
        None => Output::stderr(config.renderer(std::io::stderr().is_terminal())),
    };

    let clock = Arc::new(ManualClock::new());
    let session = Session::new()
        .with_clock(clock.clone())
        .with_stack_limit(config.stack_limit);
    let action = session.action(
        config.printer,
        sink,
        config.call_options(),
        config.stack_options(),
    );

    let stats = replay_file(&log, action.as_ref(), clock)?;
    log::info!(
        "replayed {} event(s) with the {} printer: {} call(s), {} return(s), {} without a call",
        stats.events,
        config.printer.as_str(),
        stats.calls,
        stats.returns,
        stats.unmatched_returns
    );
    action.flush();
    session.reset();
    Ok(())
}
