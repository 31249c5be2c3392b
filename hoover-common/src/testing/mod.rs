//! Test support shared by unit and integration tests.

mod log;

pub use log::init_test_logging;
