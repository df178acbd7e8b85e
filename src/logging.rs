use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter; provider clients log degradations at `warn`, the runner at `info`.
pub fn init() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "tokensleuth=info,tower_http=warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
