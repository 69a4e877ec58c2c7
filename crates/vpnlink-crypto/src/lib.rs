//! Certificate material for vpnlink tunnel pairs.
//!
//! Both ends of a tunnel pair load the same trust bundle: a private key
//! followed by a self-signed certificate in one PEM file. There is no CA
//! chain; possession of the bundle is the trust model.
//!
//! - [`certs`]: bundle generation (`rcgen`)
//! - [`inspect`]: validity inspection of an existing certificate (`x509-parser`)

pub mod certs;
pub mod error;
pub mod inspect;

pub use certs::{DEFAULT_VALIDITY_DAYS, SUBJECT_TEMPLATE, SubjectTemplate, TrustBundle};
pub use error::CertError;
pub use inspect::{CertificateInfo, inspect_certificate, pem_block_labels};
