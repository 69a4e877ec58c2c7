//! Self-signed trust bundle generation.

use std::fmt;

use rcgen::{CertificateParams, DnType, KeyPair};
use time::{Duration, OffsetDateTime};

use crate::error::CertError;

/// Validity window of a generated certificate.
pub const DEFAULT_VALIDITY_DAYS: i64 = 365;

/// Fixed subject fields applied to every generated certificate. Only the
/// common name varies between hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubjectTemplate {
    pub country: &'static str,
    pub state: &'static str,
    pub locality: &'static str,
    pub organization: &'static str,
    pub organizational_unit: &'static str,
}

pub const SUBJECT_TEMPLATE: SubjectTemplate = SubjectTemplate {
    country: "US",
    state: "Delaware",
    locality: "Wilmington",
    organization: "vpnlink",
    organizational_unit: "tunnel",
};

/// PEM-encoded private key and self-signed certificate.
#[derive(Clone)]
pub struct TrustBundle {
    /// PEM-encoded private key (`BEGIN PRIVATE KEY`).
    pub key_pem: String,
    /// PEM-encoded certificate (`BEGIN CERTIFICATE`).
    pub cert_pem: String,
}

impl TrustBundle {
    /// The bundle artifact: key bytes immediately followed by certificate
    /// bytes, with no transformation of either.
    pub fn to_pem(&self) -> String {
        let mut out = String::with_capacity(self.key_pem.len() + self.cert_pem.len());
        out.push_str(&self.key_pem);
        out.push_str(&self.cert_pem);
        out
    }
}

impl fmt::Debug for TrustBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustBundle")
            .field("key_pem", &"<redacted>")
            .field("cert_pem_len", &self.cert_pem.len())
            .finish()
    }
}

/// Generate a fresh key pair and a certificate self-signed by it.
///
/// The subject is [`SUBJECT_TEMPLATE`] plus `common_name`. The certificate
/// is valid from now for `validity_days`.
pub fn generate_self_signed(
    common_name: &str,
    validity_days: i64,
) -> Result<TrustBundle, CertError> {
    let common_name = common_name.trim();
    if common_name.is_empty() {
        return Err(CertError::EmptyCommonName);
    }

    let mut params = CertificateParams::default();
    let template = SUBJECT_TEMPLATE;
    params
        .distinguished_name
        .push(DnType::CountryName, template.country);
    params
        .distinguished_name
        .push(DnType::StateOrProvinceName, template.state);
    params
        .distinguished_name
        .push(DnType::LocalityName, template.locality);
    params
        .distinguished_name
        .push(DnType::OrganizationName, template.organization);
    params
        .distinguished_name
        .push(DnType::OrganizationalUnitName, template.organizational_unit);
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);

    let now = OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + Duration::days(validity_days);

    let key_pair = KeyPair::generate().map_err(|e| CertError::Generation(e.to_string()))?;
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| CertError::Generation(e.to_string()))?;

    Ok(TrustBundle {
        key_pem: key_pair.serialize_pem(),
        cert_pem: cert.pem(),
    })
}
