//! Logging setup.
//!
//! The tracker itself only emits `tracing` events; installing a subscriber is left to
//! the embedding application, or to [`tracer::init_tracer`] with the `trace` feature.

#[cfg(feature = "trace")]
pub mod tracer {
    use tracing::level_filters::LevelFilter;
    use tracing_subscriber::{layer::SubscriberExt, Layer, Registry};

    /// Installs a global subscriber.
    ///
    /// `RUST_LOG` refines the filter. `EPISUB_LOG_FORMAT=json` switches to JSON output
    /// and `EPISUB_DISABLE_LOGS` turns logging off entirely.
    pub fn init_tracer(level: Option<LevelFilter>) -> anyhow::Result<()> {
        if std::env::var("EPISUB_DISABLE_LOGS").is_ok() {
            return Ok(());
        }

        let default_filter = if cfg!(any(test, debug_assertions)) {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        };
        let filter_layer = tracing_subscriber::EnvFilter::builder()
            .with_default_directive(level.unwrap_or(default_filter).into())
            .from_env_lossy();

        let use_json = std::env::var("EPISUB_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let fmt_layer = if use_json {
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .json()
                .boxed()
        } else if cfg!(any(test, debug_assertions)) {
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .pretty()
                .with_file(true)
                .with_line_number(true)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer().with_level(true).boxed()
        };

        let subscriber = Registry::default().with(fmt_layer.with_filter(filter_layer));
        tracing::subscriber::set_global_default(subscriber)?;
        Ok(())
    }
}
