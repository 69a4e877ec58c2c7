//! Test doubles for the capability traits.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use vpnlink_crypto::TrustBundle;

use crate::certs::CertAuthority;
use crate::error::SetupError;
use crate::host::{Firewall, PackageInstaller, PortRule, ProcessOrchestrator, VpnInstaller};
use crate::prompt::OperatorPrompt;
use crate::transfer::{BundleFetcher, TransferError, TransferRequest};

/// Answers questions from a fixed script. An empty scripted answer takes
/// the question's default. Running out of answers is a prompt error, which
/// makes an unexpected question fail the test.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: VecDeque<String>,
    pub asked: Vec<String>,
    pub acknowledged: Vec<String>,
}

impl ScriptedPrompt {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    pub fn remaining(&self) -> usize {
        self.answers.len()
    }

    fn next(&mut self, question: &str) -> Result<String, SetupError> {
        self.asked.push(question.to_string());
        self.answers
            .pop_front()
            .ok_or_else(|| SetupError::Prompt(format!("no scripted answer for {question:?}")))
    }
}

impl OperatorPrompt for ScriptedPrompt {
    fn ask(&mut self, question: &str, default: Option<&str>) -> Result<String, SetupError> {
        let answer = self.next(question)?;
        match default {
            Some(d) if answer.is_empty() => Ok(d.to_string()),
            _ => Ok(answer),
        }
    }

    fn ask_secret(&mut self, question: &str) -> Result<String, SetupError> {
        self.next(question)
    }

    fn acknowledge(&mut self, message: &str) -> Result<(), SetupError> {
        self.acknowledged.push(message.to_string());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingPackages {
    pub installed: RefCell<Vec<String>>,
    pub fail: bool,
}

impl PackageInstaller for RecordingPackages {
    fn install(&self, packages: &[String]) -> Result<(), SetupError> {
        if self.fail {
            return Err(SetupError::DependencyInstall("apt-get exited with 100".into()));
        }
        self.installed.borrow_mut().extend_from_slice(packages);
        Ok(())
    }
}

/// Installer that is always present and never touches the host.
#[derive(Debug, Default)]
pub struct FakeInstaller {
    pub ran: Cell<bool>,
    pub fail: bool,
}

impl VpnInstaller for FakeInstaller {
    fn ensure_present(&self) -> Result<PathBuf, SetupError> {
        Ok(PathBuf::from("/root/openvpn-install.sh"))
    }

    fn run(&self, _script: &Path) -> Result<(), SetupError> {
        if self.fail {
            return Err(SetupError::Installer("installer exited with 1".into()));
        }
        self.ran.set(true);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FailingAuthority;

impl CertAuthority for FailingAuthority {
    fn generate(&self, _common_name: &str) -> Result<TrustBundle, SetupError> {
        Err(SetupError::CertGeneration("key generation unavailable".into()))
    }
}

/// Fetcher that either writes fixed content to the destination or fails.
#[derive(Debug, Default)]
pub struct FakeFetcher {
    content: Option<String>,
    pub requests: RefCell<Vec<TransferRequest>>,
}

impl FakeFetcher {
    pub fn serving(content: &str) -> Self {
        Self {
            content: Some(content.to_string()),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }
}

impl BundleFetcher for FakeFetcher {
    fn fetch(&self, request: &TransferRequest, dest: &Path) -> Result<(), TransferError> {
        self.requests.borrow_mut().push(request.clone());
        let Some(content) = &self.content else {
            return Err(TransferError::Connect {
                addr: format!("{}:{}", request.host, request.port),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            });
        };
        fs::write(dest, content)?;
        Ok(())
    }
}

/// Orchestrator that tracks whether the services would be running.
#[derive(Debug, Default)]
pub struct FakeOrchestrator {
    unreachable: bool,
    running: Cell<bool>,
    ups: Cell<usize>,
    downs: Cell<usize>,
    removed: RefCell<Vec<String>>,
}

impl FakeOrchestrator {
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    pub fn up_calls(&self) -> usize {
        self.ups.get()
    }

    pub fn down_calls(&self) -> usize {
        self.downs.get()
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.borrow().clone()
    }

    fn reach(&self, operation: &'static str) -> Result<(), SetupError> {
        if self.unreachable {
            return Err(SetupError::Lifecycle {
                operation,
                reason: "cannot connect to the container engine".into(),
            });
        }
        Ok(())
    }
}

impl ProcessOrchestrator for FakeOrchestrator {
    fn up(&self, _descriptor: &Path) -> Result<(), SetupError> {
        self.ups.set(self.ups.get() + 1);
        self.reach("start")?;
        self.running.set(true);
        Ok(())
    }

    fn down(&self, _descriptor: &Path) -> Result<(), SetupError> {
        self.downs.set(self.downs.get() + 1);
        self.reach("stop")?;
        self.running.set(false);
        Ok(())
    }

    fn ps(&self, _descriptor: &Path) -> Result<String, SetupError> {
        self.reach("health check")?;
        Ok(if self.running.get() { "running".into() } else { String::new() })
    }

    fn remove(&self, container: &str) -> Result<(), SetupError> {
        self.reach("remove")?;
        self.running.set(false);
        self.removed.borrow_mut().push(container.to_string());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingFirewall {
    pub rules: RefCell<Vec<PortRule>>,
}

impl Firewall for RecordingFirewall {
    fn allow(&self, rule: PortRule) -> Result<(), SetupError> {
        self.rules.borrow_mut().push(rule);
        Ok(())
    }
}
