//! Payment gateway adapters.
//!
//! - `RazorpayGateway` - REST client for the hosted checkout provider
//! - `InMemoryGateway` - Fake for tests and local development

mod in_memory;
mod razorpay;

pub use in_memory::InMemoryGateway;
pub use razorpay::{GatewayClientConfig, RazorpayGateway, DEFAULT_API_BASE_URL};
