use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install a `tracing` subscriber suitable for a library embedded in a long-running service.
/// No HTTP server or signal handling lives here — this crate has neither.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,eos_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}
