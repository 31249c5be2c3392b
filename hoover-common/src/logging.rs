//! Tracing subscriber setup for the harness binaries.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Output options for [`init_logging`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoggingOptions {
    /// Default to `debug` instead of `info` when `RUST_LOG` is unset.
    pub verbose: bool,
    /// Emit one JSON object per event instead of human-readable lines.
    pub json: bool,
}

/// Builds the filter: `RUST_LOG` when set and valid, else `debug`/`info`.
pub fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    })
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init_logging(options: LoggingOptions) -> Result<(), TryInitError> {
    let human = (!options.json).then(|| fmt::layer().with_target(false));
    let json = options.json.then(|| {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
    });

    tracing_subscriber::registry()
        .with(human)
        .with(json)
        .with(env_filter(options.verbose))
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected() {
        // Another test may already own the global subscriber; either way the
        // second call cannot install one.
        let _ = init_logging(LoggingOptions::default());
        assert!(
            init_logging(LoggingOptions {
                verbose: true,
                json: true
            })
            .is_err()
        );
    }
}
