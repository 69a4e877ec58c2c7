//! Validity inspection of PEM certificates.

use std::time::{SystemTime, UNIX_EPOCH};

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use x509_parser::pem::Pem;

use crate::error::CertError;

const SECS_PER_DAY: i64 = 86_400;

/// Subject and validity window of a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub common_name: Option<String>,
    /// Unix timestamp (seconds).
    pub not_before: i64,
    /// Unix timestamp (seconds).
    pub not_after: i64,
}

impl CertificateInfo {
    /// Seconds until `not_after`, negative once expired.
    pub fn seconds_remaining(&self, now: SystemTime) -> i64 {
        self.not_after - unix_secs(now)
    }

    /// Whole days until expiry, rounded down. Negative once expired.
    pub fn days_remaining(&self, now: SystemTime) -> i64 {
        self.seconds_remaining(now).div_euclid(SECS_PER_DAY)
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.seconds_remaining(now) <= 0
    }

    /// `not_after` as an RFC 3339 string, or the raw timestamp if it cannot
    /// be represented.
    pub fn not_after_display(&self) -> String {
        OffsetDateTime::from_unix_timestamp(self.not_after)
            .ok()
            .and_then(|t| t.format(&Rfc3339).ok())
            .unwrap_or_else(|| self.not_after.to_string())
    }
}

fn unix_secs(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

/// Labels of every PEM block in `data`, in order (e.g. `PRIVATE KEY`,
/// `CERTIFICATE`). Malformed blocks are skipped.
pub fn pem_block_labels(data: &[u8]) -> Vec<String> {
    Pem::iter_from_buffer(data)
        .filter_map(Result::ok)
        .map(|pem| pem.label)
        .collect()
}

/// Parse the first `CERTIFICATE` block in `data`.
///
/// Works on a bare certificate file as well as on a trust bundle where the
/// key block comes first.
pub fn inspect_certificate(data: &[u8]) -> Result<CertificateInfo, CertError> {
    for pem in Pem::iter_from_buffer(data) {
        let pem = pem.map_err(|e| CertError::Parse(e.to_string()))?;
        if pem.label != "CERTIFICATE" {
            continue;
        }
        let cert = pem
            .parse_x509()
            .map_err(|e| CertError::Parse(e.to_string()))?;
        let validity = cert.validity();
        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(ToString::to_string);
        return Ok(CertificateInfo {
            common_name,
            not_before: validity.not_before.timestamp(),
            not_after: validity.not_after.timestamp(),
        });
    }
    Err(CertError::NoCertificate)
}
