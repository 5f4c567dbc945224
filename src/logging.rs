use tracing_subscriber::EnvFilter;

/// Installs the stderr subscriber for a binary. `RUST_LOG` wins when set;
/// otherwise everything logs at `info`. Safe to call twice.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
