use std::process;

use tracing_subscriber::EnvFilter;

/// Exits the program with an error message
pub fn exit_with_error(message: &str) -> ! {
    eprintln!("Error: {}", message);
    process::exit(1);
}

/// Installs a formatting subscriber for `tracing` events.
///
/// `RUST_LOG` takes precedence; otherwise the level is `debug` when `verbose` is set and
/// `info` when it is not. Calling this twice is harmless.
pub fn setup_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
