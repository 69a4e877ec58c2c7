use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::error::SetupError;

/// Default root of the provisioned environment.
pub const DEFAULT_CONFIG_ROOT: &str = "/etc/vpnlink";
/// Default settings file location.
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/vpnlink/settings.toml";

/// Public TLS tunnel port on the exit node.
pub const TUNNEL_PORT: u16 = 443;
/// VPN port: local VPN endpoint on the exit node, local listener on the relay.
pub const VPN_PORT: u16 = 1194;

/// Role a host commits to during first-run provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Terminates the VPN and exposes it publicly wrapped in TLS.
    Exit,
    /// Forwards local VPN traffic through the TLS tunnel to the exit node.
    Relay,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exit => "exit",
            Self::Relay => "relay",
        }
    }

    /// Service and container name in the orchestration descriptor.
    pub const fn service_name(self) -> &'static str {
        match self {
            Self::Exit => "tunnel-exit",
            Self::Relay => "tunnel-relay",
        }
    }

    /// File name of the tunnel-daemon config inside the config root.
    pub const fn daemon_config_file(self) -> &'static str {
        match self {
            Self::Exit => "tunnel_server.conf",
            Self::Relay => "tunnel_client.conf",
        }
    }

    /// Location of the trust bundle relative to the config root.
    pub const fn bundle_relative_path(self) -> &'static str {
        match self {
            Self::Exit => "certs/tunnel.pem",
            Self::Relay => "tunnel.pem",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = SetupError;

    /// Accepts the current marker values and the legacy `non-ir` / `ir` ones.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "exit" | "non-ir" => Ok(Self::Exit),
            "relay" | "ir" => Ok(Self::Relay),
            other => Err(SetupError::UnknownRole(other.to_string())),
        }
    }
}

/// How the transfer client treats the exit node's SSH host key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    /// Accept and record a host key seen for the first time. A key that
    /// contradicts a recorded one is rejected. The first contact itself is
    /// unauthenticated.
    #[default]
    TrustOnFirstUse,
    /// Require a matching known-hosts entry.
    Strict,
}

impl FromStr for HostKeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trust-on-first-use" | "tofu" => Ok(Self::TrustOnFirstUse),
            "strict" => Ok(Self::Strict),
            other => Err(format!(
                "unknown host key policy: {other} (expected 'trust-on-first-use' or 'strict')"
            )),
        }
    }
}

impl fmt::Display for HostKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TrustOnFirstUse => write!(f, "trust-on-first-use"),
            Self::Strict => write!(f, "strict"),
        }
    }
}

/// Tool settings, read from an optional TOML file and environment overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub config_root: PathBuf,
    pub log_level: String,
    /// OS packages installed on first run.
    pub packages: Vec<String>,
    pub installer: InstallerSettings,
    pub tunnel: TunnelSettings,
    pub ssh: SshSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerSettings {
    /// Where the VPN installer script is kept on this host.
    pub path: PathBuf,
    /// A pre-supplied copy, preferred over downloading.
    pub local_copy: PathBuf,
    pub upstream_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelSettings {
    /// Container image running the TLS tunnel daemon.
    pub image: String,
    /// DNS resolvers pinned in the relay descriptor.
    pub relay_dns: Vec<String>,
    /// Compose invocation override, e.g. `["docker", "compose"]`. Detected
    /// when empty.
    pub compose_command: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshSettings {
    pub connect_timeout_secs: u64,
    pub host_key_policy: HostKeyPolicy,
    /// Defaults to `~/.ssh/known_hosts`.
    pub known_hosts: Option<PathBuf>,
    /// Bundle location on the exit node.
    pub remote_bundle_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_root: PathBuf::from(DEFAULT_CONFIG_ROOT),
            log_level: "warn".to_string(),
            packages: ["curl", "docker.io", "docker-compose", "ufw", "nano"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            installer: InstallerSettings::default(),
            tunnel: TunnelSettings::default(),
            ssh: SshSettings::default(),
        }
    }
}

impl Default for InstallerSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/root/openvpn-install.sh"),
            local_copy: PathBuf::from("./openvpn-install.sh"),
            upstream_url:
                "https://raw.githubusercontent.com/0xamirreza/openvpn-stunnel/master/openvpn-install.sh"
                    .to_string(),
        }
    }
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            image: "chainguard/stunnel:latest".to_string(),
            relay_dns: vec!["1.1.1.1".to_string(), "1.0.0.1".to_string()],
            compose_command: Vec::new(),
        }
    }
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            host_key_policy: HostKeyPolicy::default(),
            known_hosts: None,
            remote_bundle_path: Path::new(DEFAULT_CONFIG_ROOT).join(Role::Exit.bundle_relative_path()),
        }
    }
}

impl Settings {
    /// Load settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content)
                .with_context(|| format!("invalid settings file {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("no settings file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("failed to read settings file {}", path.display()))),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `VPNLINK_*` overrides. `lookup` is `std::env::var` in production.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(root) = lookup("VPNLINK_CONFIG_ROOT") {
            self.config_root = PathBuf::from(root);
        }
        if let Some(policy) = lookup("VPNLINK_HOST_KEY_POLICY") {
            self.ssh.host_key_policy = policy.parse().map_err(anyhow::Error::msg)?;
        }
        if let Some(secs) = lookup("VPNLINK_SSH_TIMEOUT_SECS") {
            self.ssh.connect_timeout_secs = secs
                .parse()
                .with_context(|| format!("VPNLINK_SSH_TIMEOUT_SECS is not a number: {secs}"))?;
        }
        Ok(())
    }

    /// Validate the settings. Returns an error on invalid values.
    pub fn validate(&self) -> Result<()> {
        if self.config_root.as_os_str().is_empty() {
            bail!("config_root must not be empty");
        }
        if self.ssh.connect_timeout_secs == 0 {
            bail!("ssh.connect_timeout_secs must be greater than zero");
        }
        if self.tunnel.image.trim().is_empty() {
            bail!("tunnel.image must not be empty");
        }
        if !self.installer.upstream_url.starts_with("https://") {
            bail!(
                "installer.upstream_url must be an https URL (got {})",
                self.installer.upstream_url
            );
        }
        Ok(())
    }

    pub const fn ssh_timeout(&self) -> Duration {
        Duration::from_secs(self.ssh.connect_timeout_secs)
    }
}

/// Paths of the provisioned environment, all derived from the config root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The role marker (`RoleRecord`).
    pub fn marker(&self) -> PathBuf {
        self.root.join("role.marker")
    }

    pub fn certs_dir(&self) -> PathBuf {
        self.root.join("certs")
    }

    /// Exit node certificate, used for expiry checks.
    pub fn exit_cert(&self) -> PathBuf {
        self.certs_dir().join("tunnel.crt")
    }

    pub fn bundle(&self, role: Role) -> PathBuf {
        self.root.join(role.bundle_relative_path())
    }

    pub fn daemon_config(&self, role: Role) -> PathBuf {
        self.root.join(role.daemon_config_file())
    }

    /// Process-orchestration descriptor.
    pub fn descriptor(&self) -> PathBuf {
        self.root.join("orchestration.yaml")
    }
}
