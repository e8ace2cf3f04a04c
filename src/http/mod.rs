//! HTTP protocol layer module
//!
//! Provides HTTP protocol-related base functionality shared by the static
//! responder and the upstream forwarder, decoupled from specific business logic.

pub mod cache;
pub mod mime;
pub mod range;
pub mod response;

// Re-export commonly used types
pub use range::{parse_range_header, RangeOutcome};
pub use response::{
    build_403_response, build_404_response, build_405_response, build_options_response,
    build_redirect_response, build_text_response, ResponseBody,
};
