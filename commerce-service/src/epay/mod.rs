//! epay payment gateway integration.

pub mod client;
pub mod encryption;
pub mod error;
pub mod http;
pub mod token;
pub mod types;

pub use client::PaymentGatewayClient;
pub use encryption::{CardDataEncryptor, EncryptionError};
pub use error::GatewayError;
pub use types::{CreateInvoiceRequest, Cryptogram, InvoiceContext, InvoiceResponse, Token};
