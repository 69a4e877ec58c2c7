use std::fs;
use std::path::{Path, PathBuf};

use crate::cmd::{run_cmd, run_interactive};
use crate::config::InstallerSettings;
use crate::error::SetupError;

/// The external VPN server installer. Once started it owns the terminal,
/// including its own first-client enrollment.
pub trait VpnInstaller {
    /// Make sure the installer script is on disk and return its path.
    fn ensure_present(&self) -> Result<PathBuf, SetupError>;

    /// Run the installer interactively.
    fn run(&self, script: &Path) -> Result<(), SetupError>;
}

/// Where the installer script comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallerSource {
    /// Already at the target path.
    Existing,
    /// Copied from a pre-supplied local file.
    LocalCopy,
    /// Downloaded from the upstream URL.
    Download,
}

/// Installer script kept at a fixed path on the host.
#[derive(Debug, Clone)]
pub struct ScriptInstaller {
    target: PathBuf,
    local_copy: PathBuf,
    upstream_url: String,
}

impl ScriptInstaller {
    pub fn new(settings: &InstallerSettings) -> Self {
        Self {
            target: settings.path.clone(),
            local_copy: settings.local_copy.clone(),
            upstream_url: settings.upstream_url.clone(),
        }
    }

    pub fn source(&self) -> InstallerSource {
        if self.target.exists() {
            InstallerSource::Existing
        } else if self.local_copy.exists() {
            InstallerSource::LocalCopy
        } else {
            InstallerSource::Download
        }
    }
}

fn make_executable(path: &Path) -> Result<(), SetupError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|e| {
            SetupError::Installer(format!("failed to chmod {}: {e}", path.display()))
        })?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

impl VpnInstaller for ScriptInstaller {
    fn ensure_present(&self) -> Result<PathBuf, SetupError> {
        let target = &self.target;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SetupError::Installer(format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        match self.source() {
            InstallerSource::Existing => {
                tracing::info!("using existing VPN installer at {}", target.display());
                return Ok(target.clone());
            }
            InstallerSource::LocalCopy => {
                tracing::info!(
                    "copying local VPN installer {} -> {}",
                    self.local_copy.display(),
                    target.display()
                );
                fs::copy(&self.local_copy, target).map_err(|e| {
                    SetupError::Installer(format!(
                        "failed to copy {}: {e}",
                        self.local_copy.display()
                    ))
                })?;
            }
            InstallerSource::Download => {
                let dest = target.to_string_lossy();
                run_cmd(
                    &format!("downloading VPN installer from {}", self.upstream_url),
                    "curl",
                    &["-fsSL", "--max-time", "120", "-o", &dest, &self.upstream_url],
                )
                .map_err(|e| SetupError::Installer(format!("{e:#}")))?;
            }
        }

        make_executable(target)?;
        Ok(target.clone())
    }

    fn run(&self, script: &Path) -> Result<(), SetupError> {
        let program = script.to_string_lossy();
        run_interactive("running VPN installer", &program, &[])
            .map_err(|e| SetupError::Installer(format!("{e:#}")))
    }
}
