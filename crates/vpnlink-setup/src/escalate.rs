use std::env;
use std::ffi::OsString;
use std::path::Path;
use std::process::Command;

use anyhow::{Result, bail};
use dialoguer::Confirm;
use nix::unistd::geteuid;

/// Variables that must survive the sudo re-exec so settings resolve the
/// same way as in the unprivileged invocation.
const PRESERVED_ENV: &[&str] = &[
    "VPNLINK_SETTINGS",
    "VPNLINK_CONFIG_ROOT",
    "VPNLINK_HOST_KEY_POLICY",
    "VPNLINK_SSH_TIMEOUT_SECS",
    "RUST_LOG",
    "EDITOR",
];

/// Check if the current process is running as root.
pub fn is_root() -> bool {
    geteuid().is_root()
}

/// Arguments for `sudo` to re-run `exe` with `args`.
fn sudo_args(exe: &Path, args: &[OsString]) -> Vec<OsString> {
    let mut out = vec![OsString::from(format!(
        "--preserve-env={}",
        PRESERVED_ENV.join(",")
    ))];
    out.push(exe.as_os_str().to_owned());
    out.extend(args.iter().cloned());
    out
}

/// If not root, ask the operator and re-exec via sudo.
/// Does not return on success; the process exits with sudo's status.
pub fn escalate_if_needed() -> Result<()> {
    if is_root() {
        return Ok(());
    }

    let confirmed = Confirm::new()
        .with_prompt("vpnlink manages containers, firewall rules and /etc. Re-run with sudo?")
        .default(true)
        .interact()?;
    if !confirmed {
        bail!("root privileges declined; re-run manually with sudo");
    }

    let exe = env::current_exe()?;
    let args: Vec<OsString> = env::args_os().skip(1).collect();
    let sudo = sudo_args(&exe, &args);

    tracing::info!("re-executing with sudo");
    tracing::debug!("exec: sudo {sudo:?}");

    let status = Command::new("sudo").args(&sudo).status()?;
    std::process::exit(status.code().unwrap_or(1));
}
