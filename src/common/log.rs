//! Logger initialisation
//!
//! `RUST_LOG` takes precedence over the configured level when set.

/// Initialise the global logger
///
/// # Parameters
///
/// * `level` - Fallback log level used when `RUST_LOG` is unset
pub fn init_logger(level: &str) {
    let env = env_logger::Env::default()
        .filter_or("RUST_LOG", level);

    // A second initialisation (tests, embedding) is not an error for us
    let _ = env_logger::Builder::from_env(env)
        .format_target(false)
        .try_init();
}
