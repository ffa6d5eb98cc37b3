//! Outbound HTTP for the portal: the transport seam, the reqwest-backed
//! transport, and the authenticated request wrapper every view goes through.

mod transport;
mod client;
mod ratelimit;

pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, ReqwestTransport, TransportError};
pub use client::ApiClient;
pub use ratelimit::{RateLimitStatus, LOW_REMAINING_THRESHOLD};
