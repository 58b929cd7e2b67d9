use std::io;
use std::sync::Arc;

use tracing::{Level, Metadata};
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "native")]
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let use_json = std::env::var("SWAPVERSE_LOG_JSON")
        .map(|value| value == "1")
        .unwrap_or(false);

    if use_json {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .json()
            .with_writer(std::io::stderr)
            .try_init();
    } else {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    }
}

/// Route `tracing` output into a line sink such as the browser console.
/// Installing twice is a no-op.
pub fn init_line_logging<F>(sink: F)
where
    F: Fn(Level, &str) + Send + Sync + 'static,
{
    let _ = tracing::subscriber::set_global_default(line_subscriber(LineSink::new(sink)));
}

/// Compact, untimed formatter over a [`LineSink`]. No wall clock is read,
/// so it also runs on `wasm32-unknown-unknown`.
pub fn line_subscriber<F>(sink: LineSink<F>) -> impl tracing::Subscriber + Send + Sync + 'static
where
    F: Fn(Level, &str) + Send + Sync + 'static,
{
    fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::new("info"))
        .compact()
        .with_ansi(false)
        .without_time()
        .with_target(false)
        .with_writer(sink)
        .finish()
}

/// Hands each formatted event to `sink` as one line, tagged with its level.
pub struct LineSink<F> {
    sink: Arc<F>,
}

impl<F> LineSink<F> {
    pub fn new(sink: F) -> Self {
        Self { sink: Arc::new(sink) }
    }
}

pub struct LineWriter<F: Fn(Level, &str)> {
    sink: Arc<F>,
    level: Level,
    buf: Vec<u8>,
}

impl<F: Fn(Level, &str)> io::Write for LineWriter<F> {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<F: Fn(Level, &str)> Drop for LineWriter<F> {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(&self.buf);
        (self.sink)(self.level, line.trim_end());
    }
}

impl<'a, F> MakeWriter<'a> for LineSink<F>
where
    F: Fn(Level, &str) + 'a,
{
    type Writer = LineWriter<F>;

    fn make_writer(&'a self) -> Self::Writer {
        LineWriter { sink: self.sink.clone(), level: Level::INFO, buf: Vec::new() }
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        LineWriter { sink: self.sink.clone(), level: *meta.level(), buf: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn events_reach_the_sink_one_line_each() {
        let lines: Arc<Mutex<Vec<(Level, String)>>> = Arc::default();
        let captured = lines.clone();
        let sink = LineSink::new(move |level, line: &str| {
            captured.lock().unwrap().push((level, line.to_string()));
        });

        tracing::subscriber::with_default(line_subscriber(sink), || {
            tracing::warn!(code = 4100, "unclassified provider error");
            tracing::info!(wallet = "MetaMask", "wallet connected");
            tracing::debug!("below the default filter");
        });

        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].0, Level::WARN);
        assert!(lines[0].1.contains("unclassified provider error"));
        assert!(lines[0].1.contains("code=4100"));
        assert!(!lines[0].1.contains('\n'));
        assert_eq!(lines[1].0, Level::INFO);
        assert!(lines[1].1.contains("wallet connected"));
    }
}
