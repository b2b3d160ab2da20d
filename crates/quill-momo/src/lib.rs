//! Client for the MoMo e-wallet payment gateway (API v2).
//!
//! Covers the three pieces a merchant backend needs: creating a capture
//! session, querying an order's status, and verifying the IPN callback
//! MoMo posts once the user has paid.

pub mod client;
pub mod signature;
pub mod types;

pub use client::{MomoClient, MomoConfig, MomoError, PaymentOrder};
pub use types::{GatewayResult, IpnPayload};
