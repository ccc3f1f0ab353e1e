use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub fn init_logging(
    logfile: Option<&Path>,
    to_stderr: bool,
    verbose: bool,
    broadcaster: &LogBroadcaster,
) -> WorkerGuard {
    let file_appender = match logfile {
        Some(path) => {
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            let name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "daemon.log".into());
            let _ = std::fs::create_dir_all(dir);
            tracing_appender::rolling::never(dir, name)
        }
        None => {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            let log_dir = Path::new(&home).join(".jscope/logs");
            let _ = std::fs::create_dir_all(&log_dir);
            // Roll daily, creating files like daemon.2024-01-21
            tracing_appender::rolling::daily(&log_dir, "daemon")
        }
    };
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let default_filter = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // File layer: no ANSI colors, output to file
    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_filter(filter);

    // Connected log clients see up to debug; their own verbosity narrows it
    let registry = tracing_subscriber::registry()
        .with(broadcaster.layer().with_filter(LevelFilter::DEBUG))
        .with(file_layer);

    if to_stderr {
        let stderr_level = if verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        };
        let stderr_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(false)
            .with_filter(stderr_level);
        registry.with(stderr_layer).init();
    } else {
        registry.init();
    }

    guard
}

/// Fans formatted log lines out to subscribed connections. Sinks that fall
/// away (client hung up) are pruned on the next broadcast.
#[derive(Clone, Default)]
pub struct LogBroadcaster {
    sinks: Arc<Mutex<Vec<LogSink>>>,
    next_id: Arc<AtomicU64>,
}

struct LogSink {
    id: u64,
    max_level: Level,
    tx: mpsc::UnboundedSender<String>,
}

impl LogBroadcaster {
    pub fn new() -> LogBroadcaster {
        LogBroadcaster::default()
    }

    /// Register a sink and return its handle for later removal. Verbose
    /// sinks receive debug lines as well.
    pub fn add_sink(&self, verbose: bool, tx: mpsc::UnboundedSender<String>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let max_level = if verbose { Level::DEBUG } else { Level::INFO };
        if let Ok(mut sinks) = self.sinks.lock() {
            sinks.push(LogSink { id, max_level, tx });
        }
        id
    }

    pub fn remove_sink(&self, id: u64) {
        if let Ok(mut sinks) = self.sinks.lock() {
            sinks.retain(|sink| sink.id != id);
        }
    }

    pub fn layer(&self) -> BroadcastLayer {
        BroadcastLayer {
            broadcaster: self.clone(),
        }
    }

    fn broadcast(&self, level: Level, line: &str) {
        let Ok(mut sinks) = self.sinks.lock() else {
            return;
        };
        sinks.retain(|sink| {
            if level > sink.max_level {
                return true;
            }
            sink.tx.send(line.to_string()).is_ok()
        });
    }

    fn is_idle(&self) -> bool {
        self.sinks.lock().map(|sinks| sinks.is_empty()).unwrap_or(true)
    }

    #[cfg(test)]
    fn sink_count(&self) -> usize {
        self.sinks.lock().map(|sinks| sinks.len()).unwrap_or(0)
    }
}

pub struct BroadcastLayer {
    broadcaster: LogBroadcaster,
}

impl<S: Subscriber> tracing_subscriber::Layer<S> for BroadcastLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if self.broadcaster.is_idle() {
            return;
        }
        let mut text = String::new();
        event.record(&mut MessageVisitor(&mut text));
        let meta = event.metadata();
        let line = format!("{} {}", meta.level(), text);
        self.broadcaster.broadcast(*meta.level(), &line);
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        use std::fmt::Write;
        if field.name() == "message" {
            let _ = write!(self.0, "{value:?}");
        } else {
            if !self.0.is_empty() {
                self.0.push(' ');
            }
            let _ = write!(self.0, "{}={:?}", field.name(), value);
        }
    }
}
