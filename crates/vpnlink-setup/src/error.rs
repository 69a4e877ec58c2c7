use std::path::PathBuf;

use crate::config::Role;
use crate::transfer::TransferError;

/// Errors surfaced by provisioning and lifecycle operations.
///
/// Provisioning treats every variant as fatal except [`SetupError::Transfer`],
/// which downgrades to a manual-placement pause. Lifecycle operations report
/// the error and return to the menu.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("dependency installation failed: {0}")]
    DependencyInstall(String),

    #[error("VPN installer failed: {0}")]
    Installer(String),

    #[error("certificate generation failed: {0}")]
    CertGeneration(String),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("failed to write {}: {source}", path.display())]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{operation} failed: {reason}")]
    Lifecycle {
        operation: &'static str,
        reason: String,
    },

    #[error("firewall rule {rule} failed: {reason}")]
    Firewall { rule: String, reason: String },

    #[error("unknown role in marker file: {0:?}")]
    UnknownRole(String),

    #[error("role already committed as {0}; uninstall before provisioning again")]
    AlreadyCommitted(Role),

    #[error("role marker {} is not accessible: {source}", path.display())]
    State {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid selection: {0:?}")]
    InvalidSelection(String),

    #[error("invalid {field}: {value:?}")]
    InvalidInput { field: &'static str, value: String },

    #[error("prompt failed: {0}")]
    Prompt(String),
}

impl SetupError {
    pub(crate) fn lifecycle(operation: &'static str, err: &anyhow::Error) -> Self {
        Self::Lifecycle {
            operation,
            reason: format!("{err:#}"),
        }
    }
}
