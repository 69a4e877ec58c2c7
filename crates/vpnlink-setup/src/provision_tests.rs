//! End-to-end provisioning runs against test doubles.

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::fs;
    use std::path::Path;

    use vpnlink_crypto::pem_block_labels;

    use crate::certs::{CertAuthority, SelfSignedAuthority};
    use crate::config::{Layout, Role, Settings};
    use crate::error::SetupError;
    use crate::host::PortRule;
    use crate::provision::{Capabilities, Provisioner};
    use crate::state::{ProvisioningState, RoleStore};
    use crate::testing::{
        FailingAuthority, FakeFetcher, FakeInstaller, FakeOrchestrator, RecordingFirewall,
        RecordingPackages, ScriptedPrompt,
    };
    use crate::transfer::Credentials;

    #[derive(Default)]
    struct Host {
        packages: RecordingPackages,
        installer: FakeInstaller,
        fetcher: FakeFetcher,
        orchestrator: FakeOrchestrator,
        firewall: RecordingFirewall,
    }

    impl Host {
        fn with_fetcher(fetcher: FakeFetcher) -> Self {
            Self {
                fetcher,
                ..Self::default()
            }
        }

        fn provision(
            &self,
            settings: &Settings,
            authority: &dyn CertAuthority,
            prompt: &mut ScriptedPrompt,
            state: ProvisioningState,
        ) -> Result<Role, SetupError> {
            let caps = Capabilities {
                prompt,
                packages: &self.packages,
                installer: &self.installer,
                authority,
                fetcher: &self.fetcher,
                orchestrator: &self.orchestrator,
                firewall: &self.firewall,
            };
            Provisioner::new(settings, caps).run(state)
        }

        fn rules(&self) -> Vec<PortRule> {
            self.firewall.rules.borrow().clone()
        }
    }

    fn settings_in(root: &Path) -> Settings {
        Settings {
            config_root: root.to_path_buf(),
            ..Settings::default()
        }
    }

    fn stored_role(root: &Path) -> Option<Role> {
        RoleStore::new(Layout::new(root).marker()).read().unwrap()
    }

    #[test]
    fn exit_provisioning_writes_bundle_config_and_marker() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        let host = Host::default();
        let mut prompt = ScriptedPrompt::new(&["1", "vpn.example.com"]);

        let role = host
            .provision(
                &settings,
                &SelfSignedAuthority::default(),
                &mut prompt,
                ProvisioningState::Unconfigured,
            )
            .unwrap();

        assert_eq!(role, Role::Exit);
        assert_eq!(stored_role(dir.path()), Some(Role::Exit));
        assert_eq!(prompt.remaining(), 0);

        let bundle = fs::read(dir.path().join("certs/tunnel.pem")).unwrap();
        assert_eq!(pem_block_labels(&bundle), vec!["PRIVATE KEY", "CERTIFICATE"]);

        let conf = fs::read_to_string(dir.path().join("tunnel_server.conf")).unwrap();
        assert!(conf.contains("accept = 0.0.0.0:443"));
        assert!(conf.contains("connect = 127.0.0.1:1194"));
        assert!(!conf.contains("verifyChain"));

        let descriptor = fs::read_to_string(dir.path().join("orchestration.yaml")).unwrap();
        assert!(descriptor.contains("container_name: tunnel-exit"));

        assert_eq!(host.rules(), vec![PortRule::tcp(443), PortRule::tcp(1194)]);
        assert_eq!(*host.packages.installed.borrow(), settings.packages);
        assert!(host.installer.ran.get());
        assert!(host.orchestrator.is_running());
    }

    #[test]
    fn relay_provisioning_falls_back_to_manual_placement() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        let host = Host::with_fetcher(FakeFetcher::failing());
        // domain, default user, default port, key auth, default key path
        let mut prompt = ScriptedPrompt::new(&["2", "vpn.example.com", "", "", "2", ""]);

        let role = host
            .provision(
                &settings,
                &FailingAuthority,
                &mut prompt,
                ProvisioningState::Unconfigured,
            )
            .unwrap();

        assert_eq!(role, Role::Relay);
        assert_eq!(stored_role(dir.path()), Some(Role::Relay));
        assert_eq!(prompt.acknowledged.len(), 1);

        let requests = host.fetcher.requests.borrow();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].host, "vpn.example.com");
        assert_eq!(requests[0].user, "root");
        assert_eq!(requests[0].port, 22);
        match &requests[0].credentials {
            Some(Credentials::KeyFile(path)) => assert!(path.ends_with(".ssh/id_rsa")),
            other => panic!("expected key file credentials, got {other:?}"),
        }

        let conf = fs::read_to_string(dir.path().join("tunnel_client.conf")).unwrap();
        assert!(conf.contains("client = yes"));
        assert!(conf.contains("connect = vpn.example.com:443"));
        assert!(conf.contains("verifyChain = no"));
        assert!(conf.contains("TIMEOUTclose = 0"));

        let descriptor = fs::read_to_string(dir.path().join("orchestration.yaml")).unwrap();
        assert!(descriptor.contains("- 1.1.1.1"));

        assert_eq!(host.rules(), vec![PortRule::tcp(1194)]);
        assert!(host.orchestrator.is_running());
    }

    #[test]
    fn relay_provisioning_imports_transferred_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        let host = Host::with_fetcher(FakeFetcher::serving("KEY\nCERT\n"));
        let mut prompt =
            ScriptedPrompt::new(&["2", "vpn.example.com", "admin", "2222", "1", "hunter2"]);

        host.provision(
            &settings,
            &FailingAuthority,
            &mut prompt,
            ProvisioningState::Unconfigured,
        )
        .unwrap();

        assert!(prompt.acknowledged.is_empty());
        assert_eq!(
            fs::read_to_string(dir.path().join("tunnel.pem")).unwrap(),
            "KEY\nCERT\n"
        );
        let requests = host.fetcher.requests.borrow();
        assert_eq!(requests[0].user, "admin");
        assert_eq!(requests[0].port, 2222);
        assert_eq!(
            requests[0].credentials,
            Some(Credentials::Password("hunter2".into()))
        );
        assert_eq!(requests[0].remote_path, settings.ssh.remote_bundle_path);
    }

    #[test]
    fn unknown_auth_method_still_reaches_commit() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        let host = Host::with_fetcher(FakeFetcher::failing());
        let mut prompt = ScriptedPrompt::new(&["2", "vpn.example.com", "", "", "3"]);

        host.provision(
            &settings,
            &FailingAuthority,
            &mut prompt,
            ProvisioningState::Unconfigured,
        )
        .unwrap();

        assert_eq!(host.fetcher.requests.borrow()[0].credentials, None);
        assert_eq!(prompt.acknowledged.len(), 1);
        assert_eq!(stored_role(dir.path()), Some(Role::Relay));
    }

    #[test]
    fn invalid_role_selection_leaves_host_unconfigured() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        let host = Host::default();
        let mut prompt = ScriptedPrompt::new(&["9"]);

        let err = host
            .provision(
                &settings,
                &SelfSignedAuthority::default(),
                &mut prompt,
                ProvisioningState::Unconfigured,
            )
            .unwrap_err();

        assert!(matches!(err, SetupError::InvalidSelection(ref v) if v == "9"));
        assert_eq!(stored_role(dir.path()), None);
        assert!(host.packages.installed.borrow().is_empty());
    }

    #[test]
    fn failed_step_does_not_commit_role() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        let host = Host::default();
        let mut prompt = ScriptedPrompt::new(&["1", "vpn.example.com"]);

        let err = host
            .provision(
                &settings,
                &FailingAuthority,
                &mut prompt,
                ProvisioningState::Unconfigured,
            )
            .unwrap_err();

        assert!(matches!(err, SetupError::CertGeneration(_)));
        assert_eq!(stored_role(dir.path()), None);
        assert!(host.rules().is_empty());
        assert!(!host.installer.ran.get());
        assert!(!host.orchestrator.is_running());
    }

    #[test]
    fn failed_dependency_install_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        let host = Host {
            packages: RecordingPackages {
                fail: true,
                ..RecordingPackages::default()
            },
            ..Host::default()
        };
        let mut prompt = ScriptedPrompt::new(&["2"]);

        let err = host
            .provision(
                &settings,
                &FailingAuthority,
                &mut prompt,
                ProvisioningState::Unconfigured,
            )
            .unwrap_err();

        assert!(matches!(err, SetupError::DependencyInstall(_)));
        assert_eq!(stored_role(dir.path()), None);
    }

    #[test]
    fn failed_installer_run_leaves_host_unconfigured() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        let host = Host {
            installer: FakeInstaller {
                fail: true,
                ..FakeInstaller::default()
            },
            ..Host::default()
        };
        let mut prompt = ScriptedPrompt::new(&["1", "vpn.example.com"]);

        let err = host
            .provision(
                &settings,
                &SelfSignedAuthority::default(),
                &mut prompt,
                ProvisioningState::Unconfigured,
            )
            .unwrap_err();

        assert!(matches!(err, SetupError::Installer(_)));
        assert_eq!(stored_role(dir.path()), None);
        assert!(!dir.path().join("tunnel_server.conf").exists());
        assert!(host.rules().is_empty());
        assert!(!host.orchestrator.is_running());
    }

    #[test]
    fn unwritable_relay_config_leaves_host_unconfigured() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        fs::create_dir(dir.path().join("tunnel_client.conf")).unwrap();
        let host = Host::with_fetcher(FakeFetcher::failing());
        let mut prompt = ScriptedPrompt::new(&["2", "vpn.example.com", "", "", "2", ""]);

        let err = host
            .provision(
                &settings,
                &FailingAuthority,
                &mut prompt,
                ProvisioningState::Unconfigured,
            )
            .unwrap_err();

        match err {
            SetupError::ConfigWrite { path, .. } => {
                assert_eq!(path, dir.path().join("tunnel_client.conf"));
            }
            other => panic!("expected a config write error, got {other:?}"),
        }
        assert_eq!(stored_role(dir.path()), None);
        assert!(host.rules().is_empty());
        assert_eq!(host.orchestrator.up_calls(), 0);
    }

    #[test]
    fn failed_first_start_leaves_host_unconfigured() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        let host = Host {
            orchestrator: FakeOrchestrator::unreachable(),
            ..Host::default()
        };
        let mut prompt = ScriptedPrompt::new(&["1", "vpn.example.com"]);

        let err = host
            .provision(
                &settings,
                &SelfSignedAuthority::default(),
                &mut prompt,
                ProvisioningState::Unconfigured,
            )
            .unwrap_err();

        assert!(matches!(err, SetupError::Lifecycle { operation: "start", .. }));
        assert_eq!(stored_role(dir.path()), None);
        assert_eq!(host.orchestrator.up_calls(), 1);
        assert!(dir.path().join("tunnel_server.conf").exists());
    }

    #[test]
    fn provisioned_host_returns_role_without_prompting() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        let host = Host::default();
        let mut first = ScriptedPrompt::new(&["1", "vpn.example.com"]);
        host.provision(
            &settings,
            &SelfSignedAuthority::default(),
            &mut first,
            ProvisioningState::Unconfigured,
        )
        .unwrap();

        let state = RoleStore::new(Layout::new(dir.path()).marker())
            .load_state()
            .unwrap();
        assert_eq!(state, ProvisioningState::Provisioned(Role::Exit));

        let mut second = ScriptedPrompt::new(&[]);
        let role = host
            .provision(&settings, &FailingAuthority, &mut second, state)
            .unwrap();

        assert_eq!(role, Role::Exit);
        assert!(second.asked.is_empty());
    }
}
