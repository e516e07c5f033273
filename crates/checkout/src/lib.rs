pub mod error;
pub mod service;

pub use error::{CheckoutError, Result};
pub use service::{CheckoutService, PromoQuote};
