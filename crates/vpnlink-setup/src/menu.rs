//! Steady-state role menus.
//!
//! Lifecycle failures are reported and the menu keeps running; only prompt
//! failures end the loop with an error.

use std::env;
use std::path::Path;
use std::time::SystemTime;

use crate::cmd::run_interactive;
use crate::config::Role;
use crate::error::SetupError;
use crate::lifecycle::LifecycleController;
use crate::prompt::OperatorPrompt;
use crate::status;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    Health,
    EditDaemonConfig,
    EditDescriptor,
    Start,
    Stop,
    Uninstall,
    Quit,
}

const EXIT_ITEMS: &[(&str, &str, MenuAction)] = &[
    ("1", "Check certificate time left", MenuAction::Health),
    ("2", "Edit tunnel_server.conf", MenuAction::EditDaemonConfig),
    ("3", "Start tunnel server", MenuAction::Start),
    ("4", "Stop tunnel server", MenuAction::Stop),
    ("5", "Uninstall exit node", MenuAction::Uninstall),
    ("0", "Exit", MenuAction::Quit),
];

const RELAY_ITEMS: &[(&str, &str, MenuAction)] = &[
    ("1", "Check health", MenuAction::Health),
    ("2", "Edit tunnel_client.conf", MenuAction::EditDaemonConfig),
    ("3", "Edit DNS in orchestration.yaml", MenuAction::EditDescriptor),
    ("4", "Start tunnel client", MenuAction::Start),
    ("5", "Stop tunnel client", MenuAction::Stop),
    ("6", "Uninstall relay node", MenuAction::Uninstall),
    ("0", "Exit", MenuAction::Quit),
];

/// Menu entries for a role as `(key, label, action)`.
pub const fn menu_items(role: Role) -> &'static [(&'static str, &'static str, MenuAction)] {
    match role {
        Role::Exit => EXIT_ITEMS,
        Role::Relay => RELAY_ITEMS,
    }
}

pub fn parse_menu_choice(role: Role, choice: &str) -> Result<MenuAction, SetupError> {
    let choice = choice.trim();
    menu_items(role)
        .iter()
        .find(|(key, _, _)| *key == choice)
        .map(|(_, _, action)| *action)
        .ok_or_else(|| SetupError::InvalidSelection(choice.to_string()))
}

/// Menu text for a role, without the trailing choice prompt.
pub fn render_menu(role: Role) -> String {
    let title = match role {
        Role::Exit => "Exit Node Menu",
        Role::Relay => "Relay Node Menu",
    };
    let mut out = format!("\n=== {title} ===\n");
    for (key, label, _) in menu_items(role) {
        out.push_str(&format!("{key}) {label}\n"));
    }
    out
}

/// Hands a file to the operator for editing.
pub trait FileEditor {
    fn edit(&self, path: &Path) -> Result<(), SetupError>;
}

/// `$EDITOR`, falling back to `nano`.
#[derive(Debug, Clone)]
pub struct ExternalEditor {
    program: String,
}

impl ExternalEditor {
    pub fn from_env() -> Self {
        let program = env::var("EDITOR")
            .ok()
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| "nano".to_string());
        Self { program }
    }
}

impl FileEditor for ExternalEditor {
    fn edit(&self, path: &Path) -> Result<(), SetupError> {
        let target = path.to_string_lossy();
        run_interactive(&format!("editing {target}"), &self.program, &[&target])
            .map_err(|e| SetupError::lifecycle("edit", &e))
    }
}

/// How the menu loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuOutcome {
    Quit,
    Uninstalled,
}

pub struct Menu<'a> {
    controller: LifecycleController<'a>,
    editor: &'a dyn FileEditor,
}

#[allow(clippy::print_stdout)]
fn print_menu(role: Role) {
    print!("{}", render_menu(role));
}

impl<'a> Menu<'a> {
    pub const fn new(controller: LifecycleController<'a>, editor: &'a dyn FileEditor) -> Self {
        Self { controller, editor }
    }

    pub fn run(&self, prompt: &mut dyn OperatorPrompt) -> Result<MenuOutcome, SetupError> {
        let role = self.controller.role();
        let last_key = menu_items(role)
            .iter()
            .map(|(key, _, _)| *key)
            .max()
            .unwrap_or("0");

        loop {
            print_menu(role);
            let choice = prompt.ask(&format!("Enter choice [0-{last_key}]"), None)?;
            let action = match parse_menu_choice(role, &choice) {
                Ok(action) => action,
                Err(_) => {
                    status::warn("Invalid choice");
                    continue;
                }
            };

            match self.perform(action) {
                Ok(Some(outcome)) => return Ok(outcome),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(?action, "menu action failed: {e}");
                    status::warn(e);
                }
            }
        }
    }

    fn perform(&self, action: MenuAction) -> Result<Option<MenuOutcome>, SetupError> {
        let role = self.controller.role();
        let layout = self.controller.layout();
        let service = role.service_name();
        match action {
            MenuAction::Health => {
                let report = self.controller.health_check(SystemTime::now())?;
                status::info(report);
            }
            MenuAction::EditDaemonConfig => self.editor.edit(&layout.daemon_config(role))?,
            MenuAction::EditDescriptor => self.editor.edit(&layout.descriptor())?,
            MenuAction::Start => {
                status::info(format!("Starting {service}..."));
                self.controller.start()?;
                status::success(format!("{service} started"));
            }
            MenuAction::Stop => {
                status::info(format!("Stopping {service}..."));
                self.controller.stop()?;
                status::success(format!("{service} stopped"));
            }
            MenuAction::Uninstall => {
                status::warn(format!("Uninstalling {role} node..."));
                self.controller.uninstall()?;
                status::success(format!("{role} node uninstalled"));
                return Ok(Some(MenuOutcome::Uninstalled));
            }
            MenuAction::Quit => return Ok(Some(MenuOutcome::Quit)),
        }
        Ok(None)
    }
}
