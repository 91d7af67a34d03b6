// src/telemetry.rs
use std::net::SocketAddr;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "quake_bridge=info,warn";

/// Install the stdout subscriber. `LOG_FORMAT=json` switches to JSON lines;
/// `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    // A subscriber may already be set (tests, embedding); keep it.
    let _ = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stdout))
            .try_init()
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stdout))
            .try_init()
    };
}

/// Report panics through tracing instead of the default stderr hook.
pub fn route_panics_to_tracing() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();
        tracing::error!(%location, "panic: {}", panic_message(info.payload()));
    }));
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

/// One-time metrics registration (so series show up on the scrape endpoint).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "bridge_cycles_total",
            "Poll cycles completed, labelled by outcome."
        );
        describe_counter!(
            "bridge_fetch_errors_total",
            "Feed fetch failures, labelled by reason."
        );
        describe_counter!(
            "bridge_publish_errors_total",
            "Publish failures, labelled by reason."
        );
        describe_counter!(
            "bridge_events_published_total",
            "Normalized events accepted by the event hub."
        );
        describe_counter!(
            "bridge_batches_sent_total",
            "HTTP sub-batches accepted by the event hub."
        );
        describe_histogram!("bridge_cycle_ms", "Cycle duration in milliseconds.");
        describe_gauge!(
            "bridge_last_success_ts",
            "Unix ts of the last cycle that fetched and published (or found nothing)."
        );
    });
}

/// Serve Prometheus metrics on `addr`. Must be called inside the tokio runtime.
pub fn install_prometheus(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("prometheus exporter on {addr}: {e}"))?;
    ensure_metrics_described();
    tracing::info!(%addr, "metrics endpoint listening");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Buf(Arc<Mutex<Vec<u8>>>);

    impl Write for Buf {
        fn write(&mut self, bytes: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(bytes);
            Ok(bytes.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn panics_are_logged_as_errors() {
        let buf = Buf::default();
        let sink = buf.clone();
        let subscriber = fmt()
            .with_ansi(false)
            .with_writer(move || sink.clone())
            .finish();

        let previous = std::panic::take_hook();
        route_panics_to_tracing();
        let caught = tracing::subscriber::with_default(subscriber, || {
            std::panic::catch_unwind(|| panic!("feature parse exploded"))
        });
        std::panic::set_hook(previous);

        assert!(caught.is_err());
        let out = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert!(out.contains("ERROR"), "{out}");
        assert!(out.contains("panic: feature parse exploded"), "{out}");
        assert!(out.contains("telemetry.rs"), "{out}");
    }

    #[test]
    fn panic_message_handles_both_string_kinds() {
        let a: Box<dyn std::any::Any + Send> = Box::new("boom");
        let b: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        let c: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(a.as_ref()), "boom");
        assert_eq!(panic_message(b.as_ref()), "bang");
        assert!(panic_message(c.as_ref()).contains("non-string"));
    }
}
