//! Logging initialization for logwheel.
//!
//! Configures `tracing-subscriber` based on the `[general]` section of
//! `LogwheelConfig`. Diagnostics are routed through the shared
//! [`DiagTarget`]: events go to the currently-open output log file when
//! there is one, and to standard error otherwise. The rotation
//! scheduler swaps the target whenever it opens a new file, so
//! warnings land next to the log lines they refer to.

use std::io;

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use logwheel_core::config::GeneralConfig;
use logwheel_pipeline::DiagTarget;

/// `MakeWriter` that resolves the diagnostic destination per event.
#[derive(Clone)]
pub struct DiagWriter {
    target: DiagTarget,
}

impl DiagWriter {
    /// Wrap a shared diagnostic target.
    pub fn new(target: DiagTarget) -> Self {
        Self { target }
    }
}

/// One resolved diagnostic write stream.
pub enum DiagStream {
    /// The currently-open output log file.
    File(std::fs::File),
    /// Fallback when no log file is open yet.
    Stderr(io::Stderr),
}

impl io::Write for DiagStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            DiagStream::File(file) => file.write(buf),
            DiagStream::Stderr(stderr) => stderr.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            DiagStream::File(file) => file.flush(),
            DiagStream::Stderr(stderr) => stderr.flush(),
        }
    }
}

impl<'a> MakeWriter<'a> for DiagWriter {
    type Writer = DiagStream;

    fn make_writer(&'a self) -> Self::Writer {
        match self.target.for_write() {
            Some(file) => DiagStream::File(file),
            None => DiagStream::Stderr(io::stderr()),
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// Must be called exactly once, before any tracing macros are used.
///
/// # Formats
///
/// * `"json"` - Machine-parseable JSON lines
/// * `"pretty"` - Single-line human-readable output (no ANSI colors,
///   since events may be written into the log file itself)
pub fn init_tracing(config: &GeneralConfig, target: DiagTarget) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let writer = DiagWriter::new(target);

    match config.log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
                .try_init()
                .map_err(|e| {
                    anyhow::anyhow!("failed to initialize JSON tracing subscriber: {}", e)
                })?;
        }
        "pretty" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .try_init()
                .map_err(|e| {
                    anyhow::anyhow!("failed to initialize tracing subscriber: {}", e)
                })?;
        }
        other => {
            return Err(anyhow::anyhow!(
                "unknown log format '{}' (expected \"json\" or \"pretty\")",
                other
            ));
        }
    }

    Ok(())
}
