use std::collections::HashMap;
use std::fs;

use anyhow::{Context, Result, bail};

/// Parse `/etc/os-release` content into key-value pairs.
fn parse_os_release(content: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim_matches('"');
            map.insert(key.to_string(), value.to_string());
        }
    }
    map
}

/// Whether the release belongs to the Debian family (apt-based).
fn is_apt_based(release: &HashMap<String, String>) -> bool {
    let id = release.get("ID").map_or("", String::as_str);
    let like = release.get("ID_LIKE").map_or("", String::as_str);
    matches!(id, "debian" | "ubuntu")
        || like
            .split_whitespace()
            .any(|l| l == "debian" || l == "ubuntu")
}

/// Ensure the current OS is apt-based. First-run provisioning installs its
/// dependencies with apt-get.
pub fn ensure_apt_based() -> Result<()> {
    let content =
        fs::read_to_string("/etc/os-release").context("failed to read /etc/os-release")?;
    let release = parse_os_release(&content);
    let id = release.get("ID").map_or("unknown", String::as_str);
    if !is_apt_based(&release) {
        bail!("vpnlink requires a Debian or Ubuntu host (detected OS: {id})");
    }
    let version = release.get("VERSION_ID").map_or("unknown", String::as_str);
    tracing::info!("detected {id} ({version})");
    Ok(())
}
