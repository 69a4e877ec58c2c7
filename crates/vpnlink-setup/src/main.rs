use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use vpnlink_setup::certs::SelfSignedAuthority;
use vpnlink_setup::config::{DEFAULT_SETTINGS_PATH, Layout, Settings};
use vpnlink_setup::host::{Apt, Compose, ScriptInstaller, Ufw};
use vpnlink_setup::lifecycle::LifecycleController;
use vpnlink_setup::menu::{ExternalEditor, Menu};
use vpnlink_setup::prompt::TerminalPrompt;
use vpnlink_setup::provision::{Capabilities, Provisioner};
use vpnlink_setup::state::{ProvisioningState, RoleStore};
use vpnlink_setup::transfer::ScpFetcher;
use vpnlink_setup::{escalate, os, status};

/// Provision and manage an exit/relay VPN tunnel pair.
#[derive(Debug, Parser)]
#[command(name = "vpnlink", version, about)]
struct Cli {
    /// Settings file; missing file means defaults
    #[arg(long, env = "VPNLINK_SETTINGS", default_value = DEFAULT_SETTINGS_PATH)]
    settings: PathBuf,

    /// Directory holding the role marker, certificates and tunnel configs
    #[arg(long)]
    config_root: Option<PathBuf>,

    /// Log filter for diagnostics on stderr (overridden by `RUST_LOG`)
    #[arg(long)]
    log_level: Option<String>,
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load(&cli.settings)?;
    settings.apply_env(|key| std::env::var(key).ok())?;
    if let Some(root) = &cli.config_root {
        settings.config_root.clone_from(root);
    }
    if let Some(level) = &cli.log_level {
        settings.log_level.clone_from(level);
    }
    settings.validate()?;
    Ok(settings)
}

fn run(settings: &Settings) -> Result<()> {
    escalate::escalate_if_needed()?;

    let layout = Layout::new(settings.config_root.clone());
    let store = RoleStore::new(layout.marker());
    let state = store.load_state()?;
    tracing::debug!(marker = %store.path().display(), ?state, "provisioning state loaded");
    if state == ProvisioningState::Unconfigured {
        os::ensure_apt_based()?;
    }

    let mut prompt = TerminalPrompt;
    let orchestrator = Compose::new(settings.tunnel.compose_command.clone());
    let fetcher = ScpFetcher::new(
        settings.ssh_timeout(),
        settings.ssh.host_key_policy,
        settings.ssh.known_hosts.clone(),
    );
    let installer = ScriptInstaller::new(&settings.installer);
    let authority = SelfSignedAuthority::default();

    let role = Provisioner::new(
        settings,
        Capabilities {
            prompt: &mut prompt,
            packages: &Apt,
            installer: &installer,
            authority: &authority,
            fetcher: &fetcher,
            orchestrator: &orchestrator,
            firewall: &Ufw,
        },
    )
    .run(state)?;

    let editor = ExternalEditor::from_env();
    let menu = Menu::new(LifecycleController::new(role, layout, &orchestrator), &editor);
    let outcome = menu.run(&mut prompt)?;
    tracing::debug!(?outcome, "menu closed");
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load_settings(&cli) {
        Ok(s) => s,
        Err(e) => {
            status::warn(format!("{e:#}"));
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            status::warn(format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}
