//! Request handler module
//!
//! Responsible for request routing dispatch: forwarding `/signin` and `/graphql`
//! upstream and serving every other path from the static root.

pub mod listing;
pub mod proxy;
pub mod router;
pub mod static_files;

// Re-export main entry point
pub use router::handle_request;
