//! Readiness synchronization through the filesystem.
//!
//! The server under test signals readiness indirectly: its log file appears
//! and later contains a marker line. Each waiter here is bounded by a
//! [`TimeoutPolicy`](crate::timeout::TimeoutPolicy).

pub mod content;
pub mod file;
pub mod marker;

pub use content::wait_for_log_to_contain;
pub use file::wait_for_file_to_exist;
pub use marker::delete_file_if_existed;
