use std::fmt;

use crate::cmd::run_cmd;
use crate::error::SetupError;

/// An inbound TCP allow rule, displayed in `port/tcp` form. Both tunnel
/// legs run over TCP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRule {
    pub port: u16,
}

impl PortRule {
    pub const fn tcp(port: u16) -> Self {
        Self { port }
    }
}

impl fmt::Display for PortRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/tcp", self.port)
    }
}

/// Opens ports on the local firewall.
pub trait Firewall {
    fn allow(&self, rule: PortRule) -> Result<(), SetupError>;
}

/// `ufw` backed firewall.
#[derive(Debug, Default)]
pub struct Ufw;

impl Firewall for Ufw {
    fn allow(&self, rule: PortRule) -> Result<(), SetupError> {
        let rule_text = rule.to_string();
        run_cmd(&format!("allowing {rule_text} in ufw"), "ufw", &["allow", &rule_text]).map_err(|e| {
            SetupError::Firewall {
                rule: rule_text.clone(),
                reason: format!("{e:#}"),
            }
        })
    }
}
