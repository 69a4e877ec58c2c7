use crate::cmd::run_cmd;
use crate::error::SetupError;

/// Installs OS packages. Non-interactive, no retries.
pub trait PackageInstaller {
    fn install(&self, packages: &[String]) -> Result<(), SetupError>;
}

/// `apt-get` based installer.
#[derive(Debug, Default)]
pub struct Apt;

/// Arguments for `apt-get install`.
fn install_args(packages: &[String]) -> Vec<&str> {
    let mut args = vec!["install", "-y", "--no-install-recommends"];
    args.extend(packages.iter().map(String::as_str));
    args
}

impl PackageInstaller for Apt {
    fn install(&self, packages: &[String]) -> Result<(), SetupError> {
        if packages.is_empty() {
            return Ok(());
        }
        let fail = |e: anyhow::Error| SetupError::DependencyInstall(format!("{e:#}"));

        run_cmd("updating package index", "apt-get", &["update"]).map_err(fail)?;
        run_cmd(
            &format!("installing {}", packages.join(", ")),
            "apt-get",
            &install_args(packages),
        )
        .map_err(fail)
    }
}
