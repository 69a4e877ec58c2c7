//! Adapters over the host's system tools.
//!
//! Each external tool sits behind a narrow trait so provisioning and the
//! lifecycle controller can run against test doubles.

pub mod compose;
pub mod firewall;
pub mod installer;
pub mod packages;

pub use compose::{Compose, ProcessOrchestrator};
pub use firewall::{Firewall, PortRule, Ufw};
pub use installer::{ScriptInstaller, VpnInstaller};
pub use packages::{Apt, PackageInstaller};
