//! Payment gateway plumbing: HMAC-SHA256 signature checks for the checkout
//! callback and the server-to-server webhook. No outbound calls — order
//! creation happens on the gateway side.

pub mod signature;
pub mod webhook;
