//! Gemini protocol engine
//!
//! - [`request`] - request line validation
//! - [`hosts`] - virtual host table
//! - [`server`] - TLS listener and per-connection handling
//! - [`status`] - response status codes

pub mod hosts;
pub mod request;
pub mod server;
pub mod status;

pub use hosts::VirtualHostTable;
pub use request::{parse_request, GeminiRequest, Outcome};
pub use server::{GeminiServer, ServerContext};
pub use status::Status;

use std::time::Duration;

/// Port implied by a request URL without one
pub const DEFAULT_PORT: u16 = 1965;

/// Longest request line accepted, excluding CRLF
pub const MAX_REQUEST_LEN: usize = 1024;

/// Size of the single request read
pub const READ_BUFFER_LEN: usize = 2048;

/// Deadline for the TLS handshake and request read together
pub const READ_TIMEOUT: Duration = Duration::from_secs(30);
