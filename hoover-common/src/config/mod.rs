//! Configuration for the harness.
//!
//! - Environment variable parsing with type safety
//! - Source tracking for debugging
//! - [`HarnessConfig`], the per-worker settings the lifecycle consumes

pub mod env;
pub mod harness;
pub mod source;

pub use env::{EnvError, EnvParser};
pub use harness::{HarnessConfig, ServerManagement};
pub use source::{ConfigSource, Sourced};
