//! JSON test logging.
//!
//! Integration test binaries install it once from a constructor:
//!
//! ```ignore
//! #[ctor::ctor]
//! fn setup() {
//!     hoover_common::testing::init_test_logging();
//! }
//! ```

use std::sync::Once;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static INIT: Once = Once::new();

/// Routes tracing output through the test harness writer as JSON lines.
///
/// Safe to call multiple times. The filter comes from `RUST_LOG`, defaulting
/// to `debug`.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

        let _ = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .json(),
            )
            .with(filter)
            .try_init();
    });
}
