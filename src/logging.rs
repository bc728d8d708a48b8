use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Initialize tracing for the binary.
///
/// `RUST_LOG` wins when set; otherwise `verbose` selects debug over info.
/// Everything goes to stderr so standings printed on stdout stay clean.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "race_timer=debug" } else { "race_timer=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .init();

    debug!("logging initialised (verbose: {})", verbose);
}
