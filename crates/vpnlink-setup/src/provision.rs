//! First-run provisioning.
//!
//! Asks for the role, then drives package installation, the trust bundle,
//! config materialization, the firewall and the first start in order. The
//! role marker is written last, so any failure leaves the host unconfigured
//! and the next run starts over.

use std::fs;
use std::path::PathBuf;

use crate::certs::{CertAuthority, provision_trust_bundle};
use crate::config::{Layout, Role, Settings, TUNNEL_PORT, VPN_PORT};
use crate::error::SetupError;
use crate::host::{Firewall, PackageInstaller, PortRule, ProcessOrchestrator, VpnInstaller};
use crate::lifecycle::LifecycleController;
use crate::prompt::OperatorPrompt;
use crate::state::{ProvisioningState, RoleStore};
use crate::status;
use crate::templates::{Materializer, TunnelConfig, materialize};
use crate::transfer::{BundleFetcher, Credentials, TransferRequest};

const ROLE_QUESTION: &str = "Select server type:\n  \
     1) Exit node (runs the VPN server, outside)\n  \
     2) Relay node (inside, tunnels VPN traffic to the exit node)\n\
     Enter choice [1-2]";

const DEFAULT_SSH_USER: &str = "root";
const DEFAULT_SSH_PORT: &str = "22";
const DEFAULT_SSH_KEY: &str = "~/.ssh/id_rsa";

/// Map the first-run role answer to a role.
pub fn parse_role_choice(choice: &str) -> Result<Role, SetupError> {
    match choice.trim() {
        "1" => Ok(Role::Exit),
        "2" => Ok(Role::Relay),
        other => Err(SetupError::InvalidSelection(other.to_string())),
    }
}

fn parse_port(value: &str) -> Result<u16, SetupError> {
    value
        .trim()
        .parse::<u16>()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| SetupError::InvalidInput {
            field: "SSH port",
            value: value.to_string(),
        })
}

/// Expand a leading `~/` to the operator's home directory.
fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

fn require_non_empty(field: &'static str, value: String) -> Result<String, SetupError> {
    if value.trim().is_empty() {
        return Err(SetupError::InvalidInput { field, value });
    }
    Ok(value.trim().to_string())
}

/// The host tools provisioning drives.
pub struct Capabilities<'a> {
    pub prompt: &'a mut dyn OperatorPrompt,
    pub packages: &'a dyn PackageInstaller,
    pub installer: &'a dyn VpnInstaller,
    pub authority: &'a dyn CertAuthority,
    pub fetcher: &'a dyn BundleFetcher,
    pub orchestrator: &'a dyn ProcessOrchestrator,
    pub firewall: &'a dyn Firewall,
}

pub struct Provisioner<'a> {
    settings: &'a Settings,
    layout: Layout,
    materializer: Materializer,
    caps: Capabilities<'a>,
}

impl<'a> Provisioner<'a> {
    pub fn new(settings: &'a Settings, caps: Capabilities<'a>) -> Self {
        Self {
            layout: Layout::new(settings.config_root.clone()),
            materializer: Materializer::from_settings(&settings.tunnel),
            settings,
            caps,
        }
    }

    /// Provision the host if needed and return its role. A provisioned host
    /// returns its stored role without asking anything.
    pub fn run(&mut self, state: ProvisioningState) -> Result<Role, SetupError> {
        if let ProvisioningState::Provisioned(role) = state {
            tracing::debug!(%role, "already provisioned");
            return Ok(role);
        }

        status::warn("First setup required");
        let choice = self.caps.prompt.ask(ROLE_QUESTION, None)?;
        let role = parse_role_choice(&choice)?;
        tracing::info!(%role, "provisioning");

        match role {
            Role::Exit => self.provision_exit()?,
            Role::Relay => self.provision_relay()?,
        }

        RoleStore::new(self.layout.marker()).commit(role)?;
        status::success(format!("{role} node provisioned"));
        Ok(role)
    }

    fn install_dependencies(&self) -> Result<(), SetupError> {
        status::info("Installing dependencies (first run only)...");
        self.caps.packages.install(&self.settings.packages)?;
        status::success("Dependencies installed");
        Ok(())
    }

    fn provision_exit(&mut self) -> Result<(), SetupError> {
        status::info("Exit node first run setup");
        self.install_dependencies()?;

        let script = self.caps.installer.ensure_present()?;
        status::success(format!("VPN installer ready at {}", script.display()));

        let common_name = self.caps.prompt.ask(
            "Enter your domain for the certificate CN (e.g. vpn.example.com)",
            None,
        )?;
        let common_name = require_non_empty("common name", common_name)?;
        let paths =
            provision_trust_bundle(self.caps.authority, &self.layout.certs_dir(), &common_name)?;
        status::success(format!("Certificate generated at {}", paths.bundle.display()));

        status::warn("Running the VPN installer now. Configure your first client interactively.");
        self.caps.installer.run(&script)?;

        let config = self.materializer.render_exit(
            VPN_PORT,
            TUNNEL_PORT,
            Role::Exit.bundle_relative_path(),
        );
        self.finish(&config, &[PortRule::tcp(TUNNEL_PORT), PortRule::tcp(VPN_PORT)])
    }

    fn provision_relay(&mut self) -> Result<(), SetupError> {
        status::info("Relay node first run setup");
        self.install_dependencies()?;

        let peer = self
            .caps
            .prompt
            .ask("Enter the exit node domain (e.g. vpn.example.com)", None)?;
        let peer = require_non_empty("exit node domain", peer)?;

        status::info("To download the trust bundle, SSH access to the exit node is needed");
        let request = self.transfer_request(&peer)?;

        fs::create_dir_all(self.layout.root()).map_err(|source| SetupError::ConfigWrite {
            path: self.layout.root().to_path_buf(),
            source,
        })?;
        let dest = self.layout.bundle(Role::Relay);

        status::info(format!("Connecting to {peer} to download the trust bundle..."));
        match self.caps.fetcher.fetch(&request, &dest) {
            Ok(()) => status::success(format!("Downloaded trust bundle to {}", dest.display())),
            Err(e) => {
                tracing::warn!("bundle transfer failed: {e}");
                status::warn(format!("Failed to download the trust bundle: {e}"));
                status::warn(format!(
                    "Copy {} from the exit node to {} manually",
                    self.settings.ssh.remote_bundle_path.display(),
                    dest.display()
                ));
                self.caps
                    .prompt
                    .acknowledge("Press Enter after you've copied the trust bundle")?;
            }
        }

        let config = self.materializer.render_relay(
            &peer,
            TUNNEL_PORT,
            VPN_PORT,
            Role::Relay.bundle_relative_path(),
        );
        self.finish(&config, &[PortRule::tcp(VPN_PORT)])
    }

    /// Collect SSH details for the bundle transfer. An unrecognized auth
    /// method leaves the request without credentials, which the fetcher
    /// rejects and provisioning falls back to manual placement.
    fn transfer_request(&mut self, peer: &str) -> Result<TransferRequest, SetupError> {
        let prompt = &mut *self.caps.prompt;
        let user = prompt.ask("SSH username on the exit node", Some(DEFAULT_SSH_USER))?;
        let port = prompt.ask("SSH port", Some(DEFAULT_SSH_PORT))?;
        let port = parse_port(&port)?;

        let method = prompt.ask(
            "Authentication method:\n  1) Password\n  2) SSH key\nChoose [1-2]",
            None,
        )?;
        let credentials = match method.trim() {
            "1" => Some(Credentials::Password(prompt.ask_secret("SSH password")?)),
            "2" => {
                let key = prompt.ask("Path to SSH private key", Some(DEFAULT_SSH_KEY))?;
                Some(Credentials::KeyFile(expand_home(&key)))
            }
            other => {
                status::warn(format!("Invalid authentication method: {other:?}"));
                None
            }
        };

        Ok(TransferRequest {
            host: peer.to_string(),
            port,
            user,
            credentials,
            remote_path: self.settings.ssh.remote_bundle_path.clone(),
        })
    }

    /// Shared tail of both branches: write configs, open ports, start.
    fn finish(&self, config: &TunnelConfig, rules: &[PortRule]) -> Result<(), SetupError> {
        materialize(&self.layout, config)?;
        status::success(format!(
            "Wrote {} and {}",
            self.layout.daemon_config(config.role).display(),
            self.layout.descriptor().display()
        ));

        for rule in rules {
            self.caps.firewall.allow(*rule)?;
        }
        status::success(format!(
            "Firewall allows {}",
            rules.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
        ));

        status::info(format!("Starting {}...", config.role.service_name()));
        LifecycleController::new(config.role, self.layout.clone(), self.caps.orchestrator)
            .start()?;
        status::success(format!("{} started", config.role.service_name()));
        Ok(())
    }
}
