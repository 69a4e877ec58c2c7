//! Role-specific runtime configuration.
//!
//! Rendering is pure: the same inputs always produce byte-identical text.
//! [`materialize`] is the only function here that touches the filesystem.

use std::fs;
use std::path::Path;

use crate::config::{Layout, Role, TunnelSettings};
use crate::error::SetupError;

/// Where the descriptor mounts the daemon config inside the container.
const CONTAINER_CONFIG_DIR: &str = "/etc/stunnel";
/// Where the descriptor mounts the trust bundle inside the container.
const CONTAINER_BUNDLE_PATH: &str = "/certs/tunnel.pem";

/// Rendered tunnel-daemon config and orchestration descriptor for one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelConfig {
    pub role: Role,
    pub daemon_config: String,
    pub descriptor: String,
}

/// Renders [`TunnelConfig`]s. Image and DNS pins come from settings; the
/// tunnel policy (chain verification, close timeout, `TCP_NODELAY`) is fixed.
#[derive(Debug, Clone)]
pub struct Materializer {
    image: String,
    relay_dns: Vec<String>,
}

impl Materializer {
    pub fn new(image: impl Into<String>, relay_dns: Vec<String>) -> Self {
        Self {
            image: image.into(),
            relay_dns,
        }
    }

    pub fn from_settings(settings: &TunnelSettings) -> Self {
        Self::new(settings.image.clone(), settings.relay_dns.clone())
    }

    /// Exit node: public TLS listener on `tunnel_port` forwarding decrypted
    /// traffic to the local VPN on `vpn_port`. `bundle_path` is relative to
    /// the config root.
    pub fn render_exit(&self, vpn_port: u16, tunnel_port: u16, bundle_path: &str) -> TunnelConfig {
        let role = Role::Exit;
        let daemon_config = format!(
            r"pid =
foreground = yes
debug = 5

[openvpn]
accept = 0.0.0.0:{tunnel_port}
connect = 127.0.0.1:{vpn_port}
cert = {CONTAINER_BUNDLE_PATH}
"
        );
        TunnelConfig {
            role,
            descriptor: self.descriptor(role, bundle_path, ""),
            daemon_config,
        }
    }

    /// Relay node: local listener on `local_vpn_port` forwarding into the
    /// TLS channel toward `peer_address:peer_port`.
    pub fn render_relay(
        &self,
        peer_address: &str,
        peer_port: u16,
        local_vpn_port: u16,
        bundle_path: &str,
    ) -> TunnelConfig {
        let role = Role::Relay;
        let daemon_config = format!(
            r"client = yes
foreground = yes

[openvpn]
accept = 0.0.0.0:{local_vpn_port}
connect = {peer_address}:{peer_port}
cert = {CONTAINER_BUNDLE_PATH}
verifyChain = no
TIMEOUTclose = 0
socket = l:TCP_NODELAY=1
socket = r:TCP_NODELAY=1
"
        );
        let dns = if self.relay_dns.is_empty() {
            String::new()
        } else {
            let mut block = String::from("    dns:\n");
            for server in &self.relay_dns {
                block.push_str("      - ");
                block.push_str(server);
                block.push('\n');
            }
            block
        };
        TunnelConfig {
            role,
            descriptor: self.descriptor(role, bundle_path, &dns),
            daemon_config,
        }
    }

    fn descriptor(&self, role: Role, bundle_path: &str, extra: &str) -> String {
        let service = role.service_name();
        let conf = role.daemon_config_file();
        let image = &self.image;
        format!(
            r#"services:
  {service}:
    image: {image}
    container_name: {service}
    restart: unless-stopped
    user: root
    network_mode: host
    volumes:
      - ./{conf}:{CONTAINER_CONFIG_DIR}/{conf}:ro
      - ./{bundle_path}:{CONTAINER_BUNDLE_PATH}:ro
    command: ["{CONTAINER_CONFIG_DIR}/{conf}"]
{extra}"#
        )
    }
}

/// Write a rendered config to the layout's fixed paths, overwriting any
/// previous version.
pub fn materialize(layout: &Layout, config: &TunnelConfig) -> Result<(), SetupError> {
    fs::create_dir_all(layout.root()).map_err(|source| SetupError::ConfigWrite {
        path: layout.root().to_path_buf(),
        source,
    })?;
    write_config(&layout.daemon_config(config.role), &config.daemon_config)?;
    write_config(&layout.descriptor(), &config.descriptor)?;
    Ok(())
}

fn write_config(path: &Path, content: &str) -> Result<(), SetupError> {
    tracing::info!("writing {}", path.display());
    fs::write(path, content).map_err(|source| SetupError::ConfigWrite {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::{TUNNEL_PORT, VPN_PORT};

    fn materializer() -> Materializer {
        Materializer::from_settings(&TunnelSettings::default())
    }

    #[test]
    fn exit_config_forwards_public_tls_to_local_vpn() {
        let config = materializer().render_exit(VPN_PORT, TUNNEL_PORT, "certs/tunnel.pem");
        assert!(config.daemon_config.contains("accept = 0.0.0.0:443\n"));
        assert!(config.daemon_config.contains("connect = 127.0.0.1:1194\n"));
        assert!(config.daemon_config.contains("cert = /certs/tunnel.pem\n"));
        assert!(!config.daemon_config.contains("verifyChain"));
        assert!(!config.daemon_config.contains("client = yes"));
    }

    #[test]
    fn relay_config_applies_fixed_policy() {
        let config =
            materializer().render_relay("vpn.example.com", TUNNEL_PORT, VPN_PORT, "tunnel.pem");
        let conf = &config.daemon_config;
        assert!(conf.starts_with("client = yes\n"));
        assert!(conf.contains("accept = 0.0.0.0:1194\n"));
        assert!(conf.contains("connect = vpn.example.com:443\n"));
        assert!(conf.contains("verifyChain = no\n"));
        assert!(conf.contains("TIMEOUTclose = 0\n"));
        assert!(conf.contains("socket = l:TCP_NODELAY=1\n"));
        assert!(conf.contains("socket = r:TCP_NODELAY=1\n"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let m = materializer();
        assert_eq!(
            m.render_exit(VPN_PORT, TUNNEL_PORT, "certs/tunnel.pem"),
            m.render_exit(VPN_PORT, TUNNEL_PORT, "certs/tunnel.pem")
        );
        assert_eq!(
            m.render_relay("peer.example.com", 8443, 1194, "tunnel.pem"),
            m.render_relay("peer.example.com", 8443, 1194, "tunnel.pem")
        );
    }

    #[test]
    fn exit_descriptor_mounts_config_and_bundle() {
        let config = materializer().render_exit(VPN_PORT, TUNNEL_PORT, "certs/tunnel.pem");
        let d = &config.descriptor;
        assert!(d.contains("  tunnel-exit:\n"));
        assert!(d.contains("container_name: tunnel-exit\n"));
        assert!(d.contains("restart: unless-stopped\n"));
        assert!(d.contains("network_mode: host\n"));
        assert!(d.contains("- ./tunnel_server.conf:/etc/stunnel/tunnel_server.conf:ro\n"));
        assert!(d.contains("- ./certs/tunnel.pem:/certs/tunnel.pem:ro\n"));
        assert!(d.contains(r#"command: ["/etc/stunnel/tunnel_server.conf"]"#));
        assert!(!d.contains("dns:"));
    }

    #[test]
    fn relay_descriptor_pins_dns() {
        let config =
            materializer().render_relay("vpn.example.com", TUNNEL_PORT, VPN_PORT, "tunnel.pem");
        let d = &config.descriptor;
        assert!(d.contains("container_name: tunnel-relay\n"));
        assert!(d.contains("- ./tunnel.pem:/certs/tunnel.pem:ro\n"));
        assert!(d.contains("    dns:\n      - 1.1.1.1\n      - 1.0.0.1\n"));
    }

    #[test]
    fn relay_descriptor_without_dns_has_no_dns_block() {
        let m = Materializer::new("img:latest", Vec::new());
        let config = m.render_relay("vpn.example.com", 443, 1194, "tunnel.pem");
        assert!(!config.descriptor.contains("dns:"));
        assert!(config.descriptor.contains("image: img:latest\n"));
    }

    #[test]
    fn materialize_writes_both_documents() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path().join("root"));
        let config = materializer().render_exit(VPN_PORT, TUNNEL_PORT, "certs/tunnel.pem");

        materialize(&layout, &config).unwrap();

        assert_eq!(
            fs::read_to_string(layout.daemon_config(Role::Exit)).unwrap(),
            config.daemon_config
        );
        assert_eq!(
            fs::read_to_string(layout.descriptor()).unwrap(),
            config.descriptor
        );
    }

    #[test]
    fn materialize_into_unwritable_root_is_config_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("root");
        fs::write(&blocker, "file, not a directory").unwrap();
        let layout = Layout::new(&blocker);
        let config = materializer().render_exit(VPN_PORT, TUNNEL_PORT, "certs/tunnel.pem");

        let err = materialize(&layout, &config).unwrap_err();
        assert!(matches!(err, SetupError::ConfigWrite { .. }));
    }
}
