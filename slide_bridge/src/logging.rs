use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer as _,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt as _,
};

use crate::config::{BridgeConfig, LogFormat};

/// Keep the returned guard alive for as long as logs should be flushed.
pub fn init(config: &BridgeConfig) -> WorkerGuard {
    let (writer, guard) = match &config.log_dir {
        Some(dir) => tracing_appender::non_blocking(tracing_appender::rolling::daily(
            dir,
            "slide_bridge.log",
        )),
        None => tracing_appender::non_blocking(std::io::stdout()),
    };

    let format = match config.log_format {
        LogFormat::Text => fmt::Layer::new()
            .with_writer(writer)
            .with_ansi(config.log_dir.is_none())
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
        LogFormat::Json => fmt::Layer::new()
            .json()
            .with_writer(writer)
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(format).with(filter);

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set global subscriber");

    guard
}
