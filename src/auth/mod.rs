//! Caller authentication
//!
//! - [`signature`] - wallet ownership proof (EIP-191 `personal_sign`)
//! - [`callback`] - HMAC-SHA256 check on ad-network reward callbacks

pub mod callback;
pub mod signature;

pub use callback::CallbackValidator;
pub use signature::{EthSignatureVerifier, SignatureVerifier};
