//! Start, stop, health and teardown of a provisioned environment.
//!
//! Exit and relay share one controller; the role only changes which files
//! belong to the environment and what a health check reports.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use vpnlink_crypto::inspect_certificate;

use crate::config::{Layout, Role};
use crate::error::SetupError;
use crate::host::ProcessOrchestrator;
use crate::state::RoleStore;

/// Result of a read-only health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthReport {
    /// Exit node certificate validity.
    Certificate {
        common_name: Option<String>,
        not_after: String,
        days_remaining: i64,
        expired: bool,
    },
    /// Exit node without a certificate on disk.
    CertificateMissing(PathBuf),
    /// Relay node process status.
    Processes {
        status: Option<String>,
        bundle_present: bool,
    },
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Certificate {
                common_name,
                not_after,
                days_remaining,
                expired,
            } => {
                let subject = common_name.as_deref().unwrap_or("<no common name>");
                if *expired {
                    write!(f, "certificate for {subject} expired on {not_after}")
                } else {
                    write!(
                        f,
                        "certificate for {subject} valid until {not_after} ({days_remaining} days left)"
                    )
                }
            }
            Self::CertificateMissing(path) => {
                write!(f, "certificate not found at {}", path.display())
            }
            Self::Processes {
                status,
                bundle_present,
            } => {
                match status {
                    Some(s) if !s.is_empty() => writeln!(f, "{s}")?,
                    Some(_) => writeln!(f, "no tunnel processes running")?,
                    None => writeln!(f, "orchestration descriptor missing")?,
                }
                if *bundle_present {
                    write!(f, "trust bundle present")
                } else {
                    write!(f, "trust bundle missing; copy it from the exit node")
                }
            }
        }
    }
}

/// Drives one role's runtime processes through the orchestrator.
pub struct LifecycleController<'a> {
    role: Role,
    layout: Layout,
    store: RoleStore,
    orchestrator: &'a dyn ProcessOrchestrator,
}

impl<'a> LifecycleController<'a> {
    pub fn new(role: Role, layout: Layout, orchestrator: &'a dyn ProcessOrchestrator) -> Self {
        let store = RoleStore::new(layout.marker());
        Self {
            role,
            layout,
            store,
            orchestrator,
        }
    }

    pub const fn role(&self) -> Role {
        self.role
    }

    pub const fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Bring the tunnel up. Running services are left running.
    pub fn start(&self) -> Result<(), SetupError> {
        let descriptor = self.layout.descriptor();
        if !descriptor.exists() {
            return Err(SetupError::Lifecycle {
                operation: "start",
                reason: format!("descriptor {} not found", descriptor.display()),
            });
        }
        tracing::debug!(role = %self.role, descriptor = %descriptor.display(), "start");
        self.orchestrator.up(&descriptor)
    }

    /// Bring the tunnel down. Without a descriptor there is nothing to stop.
    pub fn stop(&self) -> Result<(), SetupError> {
        let descriptor = self.layout.descriptor();
        if !descriptor.exists() {
            tracing::debug!("no descriptor at {}, nothing to stop", descriptor.display());
            return Ok(());
        }
        tracing::debug!(role = %self.role, descriptor = %descriptor.display(), "stop");
        self.orchestrator.down(&descriptor)
    }

    pub fn health_check(&self, now: SystemTime) -> Result<HealthReport, SetupError> {
        match self.role {
            Role::Exit => self.certificate_health(now),
            Role::Relay => self.process_health(),
        }
    }

    fn certificate_health(&self, now: SystemTime) -> Result<HealthReport, SetupError> {
        let path = self.layout.exit_cert();
        let pem = match fs::read(&path) {
            Ok(pem) => pem,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(HealthReport::CertificateMissing(path));
            }
            Err(e) => {
                return Err(SetupError::Lifecycle {
                    operation: "health check",
                    reason: format!("failed to read {}: {e}", path.display()),
                });
            }
        };
        let info = inspect_certificate(&pem).map_err(|e| SetupError::Lifecycle {
            operation: "health check",
            reason: format!("{}: {e}", path.display()),
        })?;
        Ok(HealthReport::Certificate {
            not_after: info.not_after_display(),
            days_remaining: info.days_remaining(now),
            expired: info.is_expired(now),
            common_name: info.common_name,
        })
    }

    fn process_health(&self) -> Result<HealthReport, SetupError> {
        let descriptor = self.layout.descriptor();
        let status = if descriptor.exists() {
            Some(self.orchestrator.ps(&descriptor)?)
        } else {
            None
        };
        Ok(HealthReport::Processes {
            status,
            bundle_present: self.layout.bundle(self.role).exists(),
        })
    }

    /// Tear the environment down and clear the role marker.
    ///
    /// Stop and container removal failures are logged and skipped. A file
    /// that cannot be deleted aborts before the marker is cleared, so the
    /// host stays provisioned and uninstall can be retried.
    pub fn uninstall(&self) -> Result<(), SetupError> {
        if let Err(e) = self.stop() {
            tracing::warn!("stop during uninstall failed: {e}");
        }
        if let Err(e) = self.orchestrator.remove(self.role.service_name()) {
            tracing::warn!("container removal during uninstall failed: {e}");
        }

        for path in self.owned_files() {
            remove_path(&path)?;
        }

        self.store.clear()?;
        tracing::info!(role = %self.role, "environment removed");
        Ok(())
    }

    /// Files and directories that belong to this role's environment.
    fn owned_files(&self) -> Vec<PathBuf> {
        let mut paths = vec![
            self.layout.daemon_config(self.role),
            self.layout.descriptor(),
        ];
        match self.role {
            Role::Exit => paths.push(self.layout.certs_dir()),
            Role::Relay => paths.push(self.layout.bundle(self.role)),
        }
        paths
    }
}

fn remove_path(path: &Path) -> Result<(), SetupError> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => {
            tracing::debug!("removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SetupError::Lifecycle {
            operation: "uninstall",
            reason: format!("failed to remove {}: {e}", path.display()),
        }),
    }
}
