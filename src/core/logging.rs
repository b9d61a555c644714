use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber.
///
/// `level` comes from configuration; `RUST_LOG` still overrides it.
pub fn init_logging(level: &str) {
    let default = format!("{level},mlb_pitchers={level},reqwest=warn,hyper=warn");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // A second init (e.g. from tests) is harmless, so the error is dropped.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}
