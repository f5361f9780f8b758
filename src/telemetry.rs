//! Telemetry initialization (tracing/tracing-subscriber).
//!
//! Behavior:
//! - LOG_LEVEL controls the filter (e.g. "debug" or detailed directives like
//!   "info,exercise=debug,exercise_backend=debug,tower_http=info,axum=info").
//! - LOG_FORMAT selects "pretty" (default) or "json" structured logs.
//!
//! Notes:
//! - We include targets in the output to disambiguate sources.
//! - Tower HTTP TraceLayer still adds per-request spans; this complements it.
//! - Generated exercises and source text are never logged; spans carry lengths and counts.

use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "info,exercise=debug,exercise_backend=debug,tower_http=info,axum=info";

pub fn init_tracing() {
    // Build a single fmt subscriber builder and attach the EnvFilter directly.
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    // Choose JSON vs pretty; don't try to store different layer types.
    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => {
            builder.json().init();
        }
        _ => {
            builder.init();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing::subscriber::DefaultGuard;

    /// In-memory log sink, installed as the thread's default subscriber for one test.
    #[derive(Clone, Default)]
    pub(crate) struct LogCapture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if let Ok(mut out) = self.0.lock() {
                out.extend_from_slice(buf);
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogCapture {
        pub(crate) fn install(&self) -> DefaultGuard {
            let writer = self.clone();
            let subscriber = tracing_subscriber::fmt()
                .with_max_level(tracing::Level::DEBUG)
                .with_ansi(false)
                .with_writer(move || writer.clone())
                .finish();
            tracing::subscriber::set_default(subscriber)
        }

        pub(crate) fn contents(&self) -> String {
            self.0
                .lock()
                .map(|buf| String::from_utf8_lossy(&buf).into_owned())
                .unwrap_or_default()
        }
    }

    #[test]
    fn capture_collects_events() {
        let capture = LogCapture::default();
        let _guard = capture.install();
        tracing::info!(target: "exercise", count = 3, "captured");
        let logs = capture.contents();
        assert!(logs.contains("captured"));
        assert!(logs.contains("count=3"));
    }
}
