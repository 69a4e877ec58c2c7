use std::path::Path;

use anyhow::{Result, bail};

use crate::cmd::{command_exists, run_cmd, run_cmd_output};
use crate::error::SetupError;

/// The process orchestration layer. The descriptor is opaque to callers.
pub trait ProcessOrchestrator {
    /// Bring the descriptor's services up in the background. Refreshes
    /// services that are already running.
    fn up(&self, descriptor: &Path) -> Result<(), SetupError>;

    /// Bring the descriptor's services down.
    fn down(&self, descriptor: &Path) -> Result<(), SetupError>;

    /// Human-readable status of the descriptor's services.
    fn ps(&self, descriptor: &Path) -> Result<String, SetupError>;

    /// Force-remove a container by name.
    fn remove(&self, container: &str) -> Result<(), SetupError>;
}

/// Compose commands tried when none is pinned, in preference order.
const COMPOSE_CANDIDATES: &[&[&str]] = &[
    &["docker", "compose"],
    &["docker-compose"],
    &["podman", "compose"],
];

/// Whether `candidate` is installed and answers `version`.
fn compose_available(candidate: &[&str]) -> bool {
    let Some((program, rest)) = candidate.split_first() else {
        return false;
    };
    if !command_exists(program) {
        return false;
    }
    let mut args = rest.to_vec();
    args.push("version");
    run_cmd_output(program, &args).is_ok()
}

/// First candidate `available` accepts.
fn select_compose(available: impl Fn(&[&str]) -> bool) -> Result<Vec<String>> {
    let Some(found) = COMPOSE_CANDIDATES.iter().find(|c| available(c)) else {
        bail!("no compose command found; install docker with the compose plugin or podman-compose");
    };
    tracing::debug!(command = %found.join(" "), "compose command selected");
    Ok(found.iter().map(ToString::to_string).collect())
}

/// Container engine binary that goes with a compose command.
fn engine_for(compose: &[String]) -> &str {
    match compose.first().map(String::as_str) {
        Some("docker-compose") | None => "docker",
        Some(other) => other,
    }
}

/// Full argument vector for a compose subcommand against `descriptor`.
fn compose_args<'a>(compose: &'a [String], descriptor: &'a str, sub: &[&'a str]) -> Vec<&'a str> {
    let mut args: Vec<&str> = compose.iter().skip(1).map(String::as_str).collect();
    args.extend(["-f", descriptor]);
    args.extend_from_slice(sub);
    args
}

/// Compose-based orchestrator. The command is detected on each call unless
/// pinned, since first-run provisioning installs the engine mid-run.
#[derive(Debug, Clone, Default)]
pub struct Compose {
    pinned: Vec<String>,
}

impl Compose {
    /// An empty `pinned` command means detect.
    pub const fn new(pinned: Vec<String>) -> Self {
        Self { pinned }
    }

    fn command(&self) -> Result<Vec<String>> {
        if self.pinned.is_empty() {
            select_compose(compose_available)
        } else {
            Ok(self.pinned.clone())
        }
    }

    fn run(&self, description: &str, descriptor: &Path, sub: &[&str]) -> Result<()> {
        let compose = self.command()?;
        let descriptor = descriptor.to_string_lossy();
        let args = compose_args(&compose, &descriptor, sub);
        run_cmd(description, &compose[0], &args)
    }
}

impl ProcessOrchestrator for Compose {
    fn up(&self, descriptor: &Path) -> Result<(), SetupError> {
        self.run("starting tunnel services", descriptor, &["up", "-d"])
            .map_err(|e| SetupError::lifecycle("start", &e))
    }

    fn down(&self, descriptor: &Path) -> Result<(), SetupError> {
        self.run("stopping tunnel services", descriptor, &["down"])
            .map_err(|e| SetupError::lifecycle("stop", &e))
    }

    fn ps(&self, descriptor: &Path) -> Result<String, SetupError> {
        let status = || -> Result<String> {
            let compose = self.command()?;
            let descriptor = descriptor.to_string_lossy();
            run_cmd_output(&compose[0], &compose_args(&compose, &descriptor, &["ps"]))
        };
        status().map_err(|e| SetupError::lifecycle("health check", &e))
    }

    fn remove(&self, container: &str) -> Result<(), SetupError> {
        let compose = self
            .command()
            .map_err(|e| SetupError::lifecycle("remove", &e))?;
        run_cmd(
            &format!("removing container {container}"),
            engine_for(&compose),
            &["rm", "-f", container],
        )
        .map_err(|e| SetupError::lifecycle("remove", &e))
    }
}
