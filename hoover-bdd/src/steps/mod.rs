//! Step definitions, registered with cucumber at link time.

pub mod request;
pub mod response;
pub mod server;
