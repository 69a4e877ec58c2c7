//! Provisioning and lifecycle control for a vpnlink tunnel pair.
//!
//! A host is provisioned once as either the exit node (VPN server behind a
//! TLS tunnel listener) or the relay node (TLS tunnel client forwarding
//! local VPN traffic to the exit node). After that, every run opens the
//! role's lifecycle menu.

pub mod certs;
pub mod cmd;
pub mod config;
pub mod error;
pub mod escalate;
pub mod host;
pub mod lifecycle;
pub mod menu;
pub mod os;
pub mod prompt;
pub mod provision;
pub mod state;
pub mod status;
pub mod templates;
pub mod transfer;

#[cfg(test)]
mod provision_tests;
#[cfg(test)]
pub(crate) mod testing;
