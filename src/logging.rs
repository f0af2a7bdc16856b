use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "intent_relay=info";

/// Install the global `fmt` subscriber, writing to stderr. `RUST_LOG` wins
/// over `verbose`. A second call is a no-op.
pub fn init(verbose: bool) {
    let fallback = if verbose {
        "intent_relay=debug"
    } else {
        DEFAULT_FILTER
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
