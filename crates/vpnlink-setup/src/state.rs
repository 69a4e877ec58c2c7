//! Role marker persistence.
//!
//! The marker is the single persisted fact about which role a host has
//! committed to. Its presence separates first run from steady state.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::Role;
use crate::error::SetupError;

/// Provisioning state, loaded once at startup and passed explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningState {
    Unconfigured,
    Provisioned(Role),
}

/// Reads and writes the role marker file.
#[derive(Debug, Clone)]
pub struct RoleStore {
    path: PathBuf,
}

impl RoleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The committed role, or `None` before first-run provisioning.
    pub fn read(&self) -> Result<Option<Role>, SetupError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => content.parse().map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SetupError::State {
                path: self.path.clone(),
                source,
            }),
        }
    }

    pub fn load_state(&self) -> Result<ProvisioningState, SetupError> {
        Ok(self
            .read()?
            .map_or(ProvisioningState::Unconfigured, ProvisioningState::Provisioned))
    }

    /// Staging file the marker content is written to before it is linked in.
    fn staging_path(&self) -> PathBuf {
        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        PathBuf::from(staging)
    }

    /// Write the marker. Fails with [`SetupError::AlreadyCommitted`] if a
    /// marker already exists.
    ///
    /// The content is fully written to a staging file first and then
    /// hard-linked into place, so the marker is either absent or complete.
    pub fn commit(&self, role: Role) -> Result<(), SetupError> {
        let state_err = |source: std::io::Error| SetupError::State {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(state_err)?;
        }

        let staging = self.staging_path();
        fs::write(&staging, format!("{role}\n")).map_err(state_err)?;
        let linked = fs::hard_link(&staging, &self.path);
        if let Err(e) = fs::remove_file(&staging) {
            tracing::debug!(path = %staging.display(), "failed to remove staging file: {e}");
        }

        match linked {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), %role, "role committed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let existing = self.read()?.unwrap_or(role);
                Err(SetupError::AlreadyCommitted(existing))
            }
            Err(e) => Err(state_err(e)),
        }
    }

    /// Remove the marker. A missing marker is not an error.
    pub fn clear(&self) -> Result<(), SetupError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SetupError::State {
                path: self.path.clone(),
                source,
            }),
        }
    }
}
