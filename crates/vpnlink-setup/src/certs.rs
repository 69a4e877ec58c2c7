//! Trust bundle provisioning on the exit node.
//!
//! Generates the key and self-signed certificate, then writes three files to
//! the certs directory: `tunnel.key`, `tunnel.crt` and `tunnel.pem` (key
//! followed by certificate). Existing files are overwritten.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use vpnlink_crypto::{DEFAULT_VALIDITY_DAYS, TrustBundle};

use crate::error::SetupError;

const KEY_FILENAME: &str = "tunnel.key";
const CERT_FILENAME: &str = "tunnel.crt";
const BUNDLE_FILENAME: &str = "tunnel.pem";

/// Produces a trust bundle for a common name.
pub trait CertAuthority {
    fn generate(&self, common_name: &str) -> Result<TrustBundle, SetupError>;
}

/// Self-signed generation via `vpnlink-crypto`.
#[derive(Debug, Clone, Copy)]
pub struct SelfSignedAuthority {
    pub validity_days: i64,
}

impl Default for SelfSignedAuthority {
    fn default() -> Self {
        Self {
            validity_days: DEFAULT_VALIDITY_DAYS,
        }
    }
}

impl CertAuthority for SelfSignedAuthority {
    fn generate(&self, common_name: &str) -> Result<TrustBundle, SetupError> {
        vpnlink_crypto::certs::generate_self_signed(common_name, self.validity_days)
            .map_err(|e| SetupError::CertGeneration(e.to_string()))
    }
}

/// Paths to the written certificate files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundlePaths {
    pub key: PathBuf,
    pub cert: PathBuf,
    pub bundle: PathBuf,
}

/// Return the standard paths for a certs directory, without checking existence.
pub fn bundle_paths_in(certs_dir: &Path) -> BundlePaths {
    BundlePaths {
        key: certs_dir.join(KEY_FILENAME),
        cert: certs_dir.join(CERT_FILENAME),
        bundle: certs_dir.join(BUNDLE_FILENAME),
    }
}

/// Generate a bundle for `common_name` and write it to `certs_dir`.
pub fn provision_trust_bundle(
    authority: &dyn CertAuthority,
    certs_dir: &Path,
    common_name: &str,
) -> Result<BundlePaths, SetupError> {
    fs::create_dir_all(certs_dir).map_err(|e| {
        SetupError::CertGeneration(format!(
            "failed to create certs directory {}: {e}",
            certs_dir.display()
        ))
    })?;

    tracing::info!(
        common_name = %common_name,
        certs_dir = %certs_dir.display(),
        "generating trust bundle"
    );

    let bundle = authority.generate(common_name)?;
    let paths = bundle_paths_in(certs_dir);

    write_pem_file(&paths.key, &bundle.key_pem, "private key", true)?;
    write_pem_file(&paths.cert, &bundle.cert_pem, "certificate", false)?;
    write_pem_file(&paths.bundle, &bundle.to_pem(), "trust bundle", true)?;

    tracing::info!(bundle = %paths.bundle.display(), "trust bundle written");
    Ok(paths)
}

fn write_pem_file(
    path: &Path,
    content: &str,
    description: &str,
    private: bool,
) -> Result<(), SetupError> {
    let written = if private {
        write_private_file(path, content.as_bytes())
    } else {
        fs::write(path, content)
    };
    written.map_err(|e| {
        SetupError::CertGeneration(format!("failed to write {description} {}: {e}", path.display()))
    })
}

/// Write `content` to a file readable only by its owner (0600 on unix).
/// An existing file is narrowed to 0600 before it is truncated.
pub(crate) fn write_private_file(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(false);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    file.set_len(0)?;
    file.write_all(content)
}
