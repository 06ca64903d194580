use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    UnknownPrinter(#[from] calltrace_runtime::UnknownPrinter),

    #[error("invalid {var}={value:?}: {reason}")]
    InvalidConfig {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to read event log {}: {source}", path.display())]
    EventLogRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid event at {}:{line}: {reason}", path.display())]
    InvalidEvent {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("{0}")]
    Io(#[from] std::io::Error),
}
