// logger.rs

use env_logger::{Builder, Env};
use log::LevelFilter;

/// Targets that are too chatty below info.
const QUIET_TARGETS: [&str; 4] = ["reqwest", "hyper", "hyper_util", "rustls"];

/// Level used when `RUST_LOG` is unset.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

/// Installs the global logger. `RUST_LOG` takes precedence over `verbose`.
pub fn setup_logger(verbose: bool) {
    let mut builder = Builder::from_env(Env::default().default_filter_or(default_filter(verbose)));
    for target in QUIET_TARGETS {
        builder.filter_module(target, LevelFilter::Info);
    }
    builder.format_timestamp_secs();
    // A logger may already be installed (tests, embedding).
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter(false), "info");
        assert_eq!(default_filter(true), "debug");
    }

    #[test]
    fn should_allow_repeated_setup() {
        setup_logger(false);
        setup_logger(true);
    }
}
